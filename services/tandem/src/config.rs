use crate::language::Language;
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};
use tandem_core::{
    SessionConfig,
    config::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT},
};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub gemini_api_key: SecretString,
    pub gemini_model: String,
    pub language: Language,
    /// Overrides the language's default voice.
    pub voice_name: Option<String>,
    /// File whose contents replace the language's persona instruction.
    pub instruction_path: Option<PathBuf>,
    pub log_level: Level,
    pub handshake_timeout: Duration,
    pub close_timeout: Duration,
}

fn parse_secs(var: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    var.to_string(),
                    format!("'{value}' is not a positive number of seconds"),
                )
            }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let gemini_model = std::env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| gemini_realtime::DEFAULT_MODEL.to_string());

        let language = match std::env::var("PRACTICE_LANGUAGE") {
            Ok(value) => value
                .parse::<Language>()
                .map_err(|e| ConfigError::InvalidValue("PRACTICE_LANGUAGE".to_string(), e))?,
            Err(_) => Language::German,
        };

        let voice_name = std::env::var("VOICE_NAME").ok();
        let instruction_path = std::env::var("INSTRUCTION_PATH").ok().map(PathBuf::from);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let handshake_timeout = parse_secs("HANDSHAKE_TIMEOUT_SECS", DEFAULT_HANDSHAKE_TIMEOUT)?;
        let close_timeout = parse_secs("CLOSE_TIMEOUT_SECS", DEFAULT_CLOSE_TIMEOUT)?;

        Ok(Self {
            gemini_api_key,
            gemini_model,
            language,
            voice_name,
            instruction_path,
            log_level,
            handshake_timeout,
            close_timeout,
        })
    }

    /// Builds the per-session settings, reading the instruction file if one
    /// is configured.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let instruction = match &self.instruction_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidValue(
                    "INSTRUCTION_PATH".to_string(),
                    format!("cannot read {}: {e}", path.display()),
                )
            })?,
            None => self.language.instruction().to_string(),
        };
        let voice = self
            .voice_name
            .clone()
            .unwrap_or_else(|| self.language.voice().to_string());

        Ok(SessionConfig::new(instruction, voice)
            .with_handshake_timeout(self.handshake_timeout)
            .with_close_timeout(self.close_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::{env, io::Write};

    fn clear_env_vars() {
        unsafe {
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("GEMINI_MODEL");
            env::remove_var("PRACTICE_LANGUAGE");
            env::remove_var("VOICE_NAME");
            env::remove_var("INSTRUCTION_PATH");
            env::remove_var("RUST_LOG");
            env::remove_var("HANDSHAKE_TIMEOUT_SECS");
            env::remove_var("CLOSE_TIMEOUT_SECS");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.gemini_api_key.expose_secret(), "test-gemini-key");
        assert_eq!(config.gemini_model, gemini_realtime::DEFAULT_MODEL);
        assert_eq!(config.language, Language::German);
        assert_eq!(config.voice_name, None);
        assert_eq!(config.instruction_path, None);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(config.close_timeout, DEFAULT_CLOSE_TIMEOUT);

        let session = config.session_config().unwrap();
        assert_eq!(session.voice, "Kore");
        assert!(session.instruction.contains("Frau Müller"));
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("GEMINI_MODEL", "models/custom");
            env::set_var("PRACTICE_LANGUAGE", "english");
            env::set_var("VOICE_NAME", "Charon");
            env::set_var("RUST_LOG", "debug");
            env::set_var("HANDSHAKE_TIMEOUT_SECS", "5");
            env::set_var("CLOSE_TIMEOUT_SECS", "0.5");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.gemini_model, "models/custom");
        assert_eq!(config.language, Language::English);
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.close_timeout, Duration::from_millis(500));

        let session = config.session_config().unwrap();
        assert_eq!(session.voice, "Charon");
        assert!(session.instruction.contains("Mr. Williams"));
        assert_eq!(session.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "GEMINI_API_KEY"),
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_language() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("PRACTICE_LANGUAGE", "klingon");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "PRACTICE_LANGUAGE"),
            _ => panic!("Expected InvalidValue for PRACTICE_LANGUAGE"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_timeout() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("CLOSE_TIMEOUT_SECS", "-1");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CLOSE_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for CLOSE_TIMEOUT_SECS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_instruction_file_overrides_persona() {
        clear_env_vars();
        set_minimal_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Talk only about football.").unwrap();
        unsafe {
            env::set_var("INSTRUCTION_PATH", file.path());
        }

        let config = Config::from_env().unwrap();
        let session = config.session_config().unwrap();
        assert_eq!(session.instruction, "Talk only about football.\n");
        assert_eq!(session.voice, "Kore");
    }

    #[test]
    #[serial]
    fn test_missing_instruction_file() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("INSTRUCTION_PATH", "/nonexistent/persona.md");
        }

        let config = Config::from_env().unwrap();
        match config.session_config().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "INSTRUCTION_PATH"),
            _ => panic!("Expected InvalidValue for INSTRUCTION_PATH"),
        }
    }
}
