use std::time::Duration;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-session settings supplied by the caller at connect time.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Persona instruction text for the assistant.
    pub instruction: String,
    /// Voice identifier understood by the remote service.
    pub voice: String,
    /// Upper bound on waiting for the service to acknowledge the session.
    pub handshake_timeout: Duration,
    /// Upper bound on waiting for the close handshake during disconnect.
    pub close_timeout: Duration,
}

impl SessionConfig {
    pub fn new(instruction: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            voice: voice.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
