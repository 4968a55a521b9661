//! Process exit codes

use st_core::{ConfigError, ProfileError};

/// Session attached and ended normally
pub const SUCCESS: i32 = 0;
/// Any error not covered below
pub const FAILURE: i32 = 1;
/// Every transport candidate failed
pub const EXHAUSTED: i32 = 2;
/// A non-retryable transport failure stopped the run
pub const ABORTED: i32 = 3;
pub const PROFILE_NOT_FOUND: i32 = 4;
pub const PROFILE_INVALID: i32 = 5;
/// Interrupted by Ctrl+C or SIGTERM
pub const CANCELLED: i32 = 130;

/// Exit code for an error that reached `main`
///
/// Looks through the whole context chain so errors wrapped with
/// `anyhow::Context` keep their code.
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ProfileError>() {
            return match e {
                ProfileError::NotFound(_) => PROFILE_NOT_FOUND,
                ProfileError::Invalid { .. } => PROFILE_INVALID,
                ProfileError::AlreadyExists(_) => FAILURE,
            };
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return match e {
                ConfigError::Invalid(_) | ConfigError::Parse(_) => PROFILE_INVALID,
                _ => FAILURE,
            };
        }
    }
    FAILURE
}
