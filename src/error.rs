//! Exit codes and structured errors for the `blobtier` binary.

use serde::Serialize;

/// Exit codes for the blobtier CLI.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: Cache miss (`get` found nothing for the locator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The command completed.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The requested locator is not cached.
    Miss = 2,
}

impl ExitCode {
    /// Numeric process exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "BT000",
            Self::GeneralError => "BT001",
            Self::Miss => "BT002",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "BT001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
        }
    }
}
