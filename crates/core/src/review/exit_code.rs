//! Pure functions for mapping review errors to process exit codes.

use super::ReviewError;

/// `EX_DATAERR`: the input was well-formed but not acceptable.
pub const EXIT_DATA_ERROR: u8 = 65;
/// `EX_NOINPUT`: the named learner, item or session does not exist.
pub const EXIT_NOT_FOUND: u8 = 66;
/// `EX_TEMPFAIL`: repeating the same command later may succeed.
pub const EXIT_TEMPORARY: u8 = 75;

/// Maps a [`ReviewError`] to a sysexits-style exit code.
///
/// - retryable errors (`VersionConflict`, `StoreUnavailable`) -> 75
/// - `NotFound` -> 66
/// - `InvalidGrade` and `SessionFinished` -> 65
///
/// # Examples
///
/// ```
/// use recall_core::review::{review_error_to_exit_code, ReviewError};
///
/// let error = ReviewError::NotFound("learner/item".to_string());
/// assert_eq!(review_error_to_exit_code(&error), 66);
/// ```
pub fn review_error_to_exit_code(error: &ReviewError) -> u8 {
    if error.is_retryable() {
        return EXIT_TEMPORARY;
    }
    match error {
        ReviewError::NotFound(_) => EXIT_NOT_FOUND,
        _ => EXIT_DATA_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SchedulerError;

    #[test]
    fn test_invalid_grade_is_data_error() {
        let error = ReviewError::InvalidGrade(SchedulerError::InvalidGrade(-1));
        assert_eq!(review_error_to_exit_code(&error), EXIT_DATA_ERROR);
    }

    #[test]
    fn test_finished_session_is_data_error() {
        let error = ReviewError::SessionFinished("s".to_string());
        assert_eq!(review_error_to_exit_code(&error), EXIT_DATA_ERROR);
    }

    #[test]
    fn test_not_found_maps_to_noinput() {
        let error = ReviewError::NotFound("a/b".to_string());
        assert_eq!(review_error_to_exit_code(&error), EXIT_NOT_FOUND);
    }

    #[test]
    fn test_retryable_errors_are_temporary() {
        for error in [
            ReviewError::VersionConflict("a/b".to_string()),
            ReviewError::StoreUnavailable("timeout".to_string()),
        ] {
            assert_eq!(review_error_to_exit_code(&error), EXIT_TEMPORARY);
        }
    }
}
