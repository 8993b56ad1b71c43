//! # Error Definitions
//!
//! The failures a dispatched command can surface to its caller.
//!
//! These are plain data: they serialize across the worker boundary and come
//! back out as the same variant, so a caller cannot tell from the error alone
//! whether the command ran locally or in a worker context.

use serde::Deserialize;
use serde::Serialize;

/// A failure reported by the underlying engine while running a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    /// Engine exit code, when the engine ran to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn exited(code: i32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: Some(code),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} (exit code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Error {
    /// The name is not one of the registered commands.
    InvalidCommand { name: String },
    /// The argument tuple does not match the command's parameters.
    InvalidArguments { name: String, reason: String },
    /// The command ran and failed. Passed through unchanged.
    CommandFailure(Failure),
    /// The execution context failed, closed, or could not be constructed.
    ChannelFault { reason: String },
    /// No response arrived within the configured request timeout.
    Timeout { name: String, after_ms: u64 },
}

impl Error {
    pub fn channel_fault(reason: impl Into<String>) -> Self {
        Self::ChannelFault {
            reason: reason.into(),
        }
    }

    /// Short name of the variant, as carried in the `kind` field on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCommand { .. } => "InvalidCommand",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::CommandFailure(_) => "CommandFailure",
            Self::ChannelFault { .. } => "ChannelFault",
            Self::Timeout { .. } => "Timeout",
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCommand { name } => write!(f, "Invalid command: '{}'", name),
            Self::InvalidArguments { name, reason } => {
                write!(f, "Invalid arguments for '{}': {}", name, reason)
            }
            Self::CommandFailure(failure) => write!(f, "Command failed: {}", failure),
            Self::ChannelFault { reason } => write!(f, "Execution context fault: {}", reason),
            Self::Timeout { name, after_ms } => {
                write!(f, "Command '{}' timed out after {}ms", name, after_ms)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Self::CommandFailure(failure)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
