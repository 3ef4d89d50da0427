//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_HANDLE_LEN: usize = 64;

/// Validates that a handle can be written inside a mention token.
///
/// Handles are 1 to 64 ASCII letters, digits or underscores, the same alphabet the
/// token scanner accepts after `@`.
///
/// ```ignore
/// validate_handle("shroud")     // Ok
/// validate_handle("Team_Liquid") // Ok
/// validate_handle("tsm!")       // Err - punctuation
/// ```
pub fn validate_handle(handle: &str) -> Result<(), ValidationError> {
    if handle.is_empty() || handle.len() > MAX_HANDLE_LEN {
        let mut err = ValidationError::new("handle_length");
        err.message = Some(
            format!(
                "Handle must be between 1 and {MAX_HANDLE_LEN} characters (got {})",
                handle.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        let mut err = ValidationError::new("handle_format");
        err.message = Some("Handle may only contain letters, digits and underscores".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_handle_valid() {
        assert!(validate_handle("shroud").is_ok());
        assert!(validate_handle("Team_Liquid").is_ok());
        assert!(validate_handle("s1mple").is_ok());
        assert!(validate_handle(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_handle_invalid_length() {
        assert!(validate_handle("").is_err());
        assert!(validate_handle(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_handle_invalid_format() {
        assert!(validate_handle("tsm!").is_err());
        assert!(validate_handle("team liquid").is_err());
        assert!(validate_handle("team:tsm").is_err());
        assert!(validate_handle("élodie").is_err());
    }
}
