use crate::config::ConfigError;

/// Error type for the fallible edges of the crate (config, input decoding, CLI).
///
/// The transcoder and session never return this: their failure paths degrade
/// to less output instead of an error.
#[derive(Debug, thiserror::Error)]
pub enum XmlifyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category, used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Usage,
    Input,
    Internal,
}

impl XmlifyError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            XmlifyError::Config(_) => ErrorCategory::Usage,
            XmlifyError::Io(_) | XmlifyError::Decode(_) => ErrorCategory::Input,
            XmlifyError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Exit code reported by the CLI for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Usage => 2,
            ErrorCategory::Input => 65,
            ErrorCategory::Internal => 70,
        }
    }
}

impl From<ConfigError> for XmlifyError {
    fn from(err: ConfigError) -> Self {
        XmlifyError::Config(err.to_string())
    }
}
