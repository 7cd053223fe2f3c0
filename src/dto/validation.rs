//! Validation helpers for DTOs.

use validator::ValidationError;

/// Minimum length of a poll name after trimming surrounding whitespace.
const MIN_POLL_NAME_LEN: usize = 3;

/// Validates that a poll name has at least 3 characters once trimmed.
///
/// # Examples
///
/// ```ignore
/// validate_poll_name("Lunch Pick") // Ok
/// validate_poll_name("  ab  ")     // Err - too short after trim
/// validate_poll_name("")           // Err - empty
/// ```
pub fn validate_poll_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < MIN_POLL_NAME_LEN {
        let mut err = ValidationError::new("poll_name_length");
        err.message = Some("Poll name must be at least 3 characters.".into());
        return Err(err);
    }

    Ok(())
}
