//! Validation helpers for player identity fields.

use uuid::Uuid;
use validator::ValidationError;

/// Validates that an account id has the canonical hyphenated UUID shape.
///
/// # Examples
///
/// ```ignore
/// validate_auth_id("8f1c2b1e-5a57-4a7e-9a61-0d9c3d7a2f10") // Ok
/// validate_auth_id("8f1c2b1e5a574a7e9a610d9c3d7a2f10")     // Err - not hyphenated
/// validate_auth_id("guest")                                // Err
/// ```
pub fn validate_auth_id(id: &str) -> Result<(), ValidationError> {
    if id.len() != 36 {
        let mut err = ValidationError::new("auth_id_length");
        err.message = Some(format!("auth id must be 36 characters (got {})", id.len()).into());
        return Err(err);
    }

    if Uuid::try_parse(id).is_err() {
        let mut err = ValidationError::new("auth_id_format");
        err.message = Some("auth id must be a hyphenated UUID".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a display id is a strictly positive integer.
pub fn validate_player_id(id: i64) -> Result<(), ValidationError> {
    if id <= 0 {
        let mut err = ValidationError::new("player_id_range");
        err.message = Some(format!("player id must be positive (got {id})").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_auth_id_valid() {
        assert!(validate_auth_id("8f1c2b1e-5a57-4a7e-9a61-0d9c3d7a2f10").is_ok());
        assert!(validate_auth_id(&Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn test_validate_auth_id_invalid() {
        assert!(validate_auth_id("8f1c2b1e5a574a7e9a610d9c3d7a2f10").is_err()); // simple form
        assert!(validate_auth_id("8f1c2b1e-5a57-4a7e-9a61-0d9c3d7a2fzz").is_err()); // not hex
        assert!(validate_auth_id("").is_err());
    }

    #[test]
    fn test_validate_player_id() {
        assert!(validate_player_id(1).is_ok());
        assert!(validate_player_id(0).is_err());
        assert!(validate_player_id(-7).is_err());
    }
}
