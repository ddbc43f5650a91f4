//! Validation helpers for DTOs.

use rustrict::CensorStr;
use validator::ValidationError;

/// Length of a session join code.
pub const JOIN_CODE_LENGTH: usize = 6;
/// Characters join codes are generated from; look-alikes such as `0`/`O` and `1`/`I` are left out.
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Maximum length of a team name after trimming.
pub const TEAM_NAME_MAX_CHARS: usize = 30;

/// Validates that a join code is six ASCII letters or digits, in any case.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("K7QF2M") // Ok
/// validate_join_code("k7qf2m") // Ok - codes are case-insensitive
/// validate_join_code("K7QF2")  // Err - too short
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.chars().count() != JOIN_CODE_LENGTH {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "Join code must be exactly {JOIN_CODE_LENGTH} characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a team name: 1 to 30 characters once trimmed, and nothing inappropriate.
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    let length = name.chars().count();
    if length == 0 || length > TEAM_NAME_MAX_CHARS {
        let mut err = ValidationError::new("team_name_length");
        err.message = Some(
            format!("Team name must contain between 1 and {TEAM_NAME_MAX_CHARS} characters").into(),
        );
        return Err(err);
    }

    if name.is_inappropriate() {
        let mut err = ValidationError::new("team_name_inappropriate");
        err.message = Some("Team name is not allowed".into());
        return Err(err);
    }

    Ok(())
}
