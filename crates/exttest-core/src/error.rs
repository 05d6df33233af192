//! Error types for the external-test harness

use thiserror::Error;

/// Errors that can occur while preparing or running an external test
#[derive(Error, Debug)]
pub enum ExtTestError {
    /// Preset name is not part of the catalogue
    #[error("invalid preset: {0}")]
    InvalidPreset(String),

    /// Test or compiler configuration is malformed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Required external tool is not on PATH
    #[error("{0} not found")]
    ToolNotFound(String),

    /// Project file the runner depends on is absent
    #[error("{0} not found")]
    MissingProjectFile(String),

    /// Compiler binary is not of the expected type
    #[error("wrong binary type: {0}")]
    WrongBinaryType(String),

    /// Fetching the project revision failed
    #[error("clone failed for {reference} of {url}: {reason}")]
    CloneFailed {
        url: String,
        reference: String,
        reason: String,
    },

    /// External command exited unsuccessfully
    #[error("command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// External command exceeded the caller-imposed timeout
    #[error("command `{command}` timed out after {secs} seconds")]
    CommandTimedOut { command: String, secs: u64 },

    /// Compiler version could not be extracted
    #[error("solc version could not be found in: {0}")]
    VersionParse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory traversal error
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Regex compilation error
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl ExtTestError {
    /// Whether this error stems from bad input rather than from running something.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ExtTestError::InvalidPreset(_)
                | ExtTestError::InvalidConfig(_)
                | ExtTestError::WrongBinaryType(_)
        )
    }
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, ExtTestError>;
