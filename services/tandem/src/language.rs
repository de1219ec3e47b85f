//! Built-in practice languages.

use std::{fmt, str::FromStr};

const GERMAN_INSTRUCTION: &str = include_str!("../prompts/german.md");
const ENGLISH_INSTRUCTION: &str = include_str!("../prompts/english.md");

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Language {
    German,
    English,
}

impl Language {
    pub fn tutor(self) -> &'static str {
        match self {
            Language::German => "Frau Müller",
            Language::English => "Mr. Williams",
        }
    }

    /// Prebuilt service voice that fits the tutor.
    pub fn voice(self) -> &'static str {
        match self {
            Language::German => "Kore",
            Language::English => "Puck",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Language::German => GERMAN_INSTRUCTION,
            Language::English => ENGLISH_INSTRUCTION,
        }
    }

    pub fn greeting(self) -> &'static str {
        match self {
            Language::German => "Sprich einfach los, Frau Müller hört zu.",
            Language::English => "Just start talking, Mr. Williams is listening.",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::German => write!(f, "german"),
            Language::English => write!(f, "english"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "german" | "de" | "deutsch" => Ok(Language::German),
            "english" | "en" => Ok(Language::English),
            other => Err(format!("'{other}' is not a supported language")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(Language::German.voice(), "Kore");
        assert_eq!(Language::English.voice(), "Puck");
        assert!(Language::German.instruction().contains("Frau Müller"));
        assert!(Language::English.instruction().contains("Mr. Williams"));
    }

    #[test]
    fn test_parse() {
        assert_eq!("German".parse::<Language>(), Ok(Language::German));
        assert_eq!(" en ".parse::<Language>(), Ok(Language::English));
        assert!("klingon".parse::<Language>().is_err());
        assert_eq!(Language::English.to_string(), "english");
    }
}
