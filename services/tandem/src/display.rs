//! Terminal rendering of a live session.

use crossterm::{
    cursor::MoveToColumn,
    queue,
    terminal::{Clear, ClearType},
};
use std::{
    io::Write,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tandem_core::{SessionObserver, SessionState, Speaker, TranscriptLog, TranscriptionItem};

struct Screen<W> {
    out: W,
    log: TranscriptLog,
    /// A provisional line is on screen without its newline.
    line_open: bool,
}

/// Prints provisional transcript lines in place and final lines
/// permanently, and keeps the merged transcript for the end of the session.
pub struct TerminalDisplay<W> {
    tutor: String,
    screen: Mutex<Screen<W>>,
}

impl<W: Write + Send> TerminalDisplay<W> {
    pub fn new(tutor: impl Into<String>, out: W) -> Self {
        Self {
            tutor: tutor.into(),
            screen: Mutex::new(Screen {
                out,
                log: TranscriptLog::new(),
                line_open: false,
            }),
        }
    }

    fn screen(&self) -> MutexGuard<'_, Screen<W>> {
        self.screen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn label(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::User => "You",
            Speaker::Assistant => &self.tutor,
        }
    }

    /// Writes a line of status text, closing any provisional line first.
    pub fn notice(&self, text: &str) {
        let mut screen = self.screen();
        let open = std::mem::take(&mut screen.line_open);
        let _ = if open {
            writeln!(screen.out, "\n{text}")
        } else {
            writeln!(screen.out, "{text}")
        };
        let _ = screen.out.flush();
    }

    pub fn transcript(&self) -> Vec<TranscriptionItem> {
        self.screen().log.items().to_vec()
    }

    /// Prints every final line of the conversation.
    pub fn print_transcript(&self) {
        let items = self.transcript();
        let mut screen = self.screen();
        screen.line_open = false;
        let _ = writeln!(screen.out, "\n--- Transcript ---");
        for item in items.iter().filter(|item| item.is_complete) {
            let _ = writeln!(
                screen.out,
                "[{}] {}: {}",
                item.timestamp.format("%H:%M:%S"),
                self.label(item.speaker),
                item.text.trim()
            );
        }
        let _ = screen.out.flush();
    }

    pub fn into_inner(self) -> W {
        self.screen
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }
}

impl<W: Write + Send> SessionObserver for TerminalDisplay<W> {
    fn on_state_change(&self, state: SessionState) {
        let text = match state {
            SessionState::Idle => return,
            SessionState::Connecting => "Connecting...",
            SessionState::Streaming => "Connected. Speak whenever you are ready.",
            SessionState::Error => "The session ended with an error.",
            SessionState::Closed => "Session closed.",
        };
        self.notice(text);
    }

    fn on_transcription(&self, item: &TranscriptionItem) {
        let label = self.label(item.speaker).to_string();
        let mut screen = self.screen();
        let last = screen.log.last();
        if last.is_some_and(|last| last.is_complete && last.same_content(item)) {
            return;
        }
        let continues = last.is_some_and(|last| last.speaker == item.speaker && !last.is_complete);
        screen.log.apply(item.clone());

        let Screen { out, line_open, .. } = &mut *screen;
        if *line_open && !continues {
            let _ = writeln!(out);
        }
        let _ = queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine));
        let _ = write!(out, "{label}: {}", item.text.trim_start());
        if item.is_complete {
            let _ = writeln!(out);
            *line_open = false;
        } else {
            *line_open = true;
        }
        let _ = out.flush();
    }

    fn on_audio_level(&self, level: f32, source: Speaker) {
        tracing::trace!(level, %source, "Audio level.");
    }
}
