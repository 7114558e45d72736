//! Process exit codes
//!
//! Codes are stable so scripts and schedulers can branch on them.

use shift_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments or configuration
    UsageError = 2,
    NetworkError = 3,
    AuthError = 4,
    NotFound = 5,
    Conflict = 6,
    /// Stopped by Ctrl-C
    Interrupted = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Config(_) | Error::TomlParse(_) | Error::Json(_) => ExitCode::UsageError,
            Error::Network(_) => ExitCode::NetworkError,
            Error::Auth(_) => ExitCode::AuthError,
            Error::NotFound(_) => ExitCode::NotFound,
            Error::Conflict(_) => ExitCode::Conflict,
            Error::Integrity(_) | Error::Export(_) | Error::Io(_) | Error::General(_) => {
                ExitCode::GeneralError
            }
        }
    }

    /// Exit code for an error chain, using the innermost shift-core error if any
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        error
            .chain()
            .find_map(|cause| cause.downcast_ref::<Error>())
            .map_or(ExitCode::GeneralError, Self::from_error)
    }
}
