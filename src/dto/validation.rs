//! Validation helpers for DTOs.

use validator::ValidationError;

/// Prefix identifying pack-activation codes.
pub const PACK_CODE_PREFIX: &str = "tkp_";
/// Prefix identifying card-identification codes.
pub const CARD_CODE_PREFIX: &str = "tkc_";

/// Validates that a pack-activation code is `tkp_` followed by a lowercase
/// alphanumeric body.
///
/// # Examples
///
/// ```ignore
/// validate_pack_code("tkp_0001")  // Ok
/// validate_pack_code("TKP_0001")  // Err - not normalized
/// validate_pack_code("tkp_")      // Err - empty body
/// ```
pub fn validate_pack_code(code: &str) -> Result<(), ValidationError> {
    validate_prefixed_code(code, PACK_CODE_PREFIX, "pack_code")
}

/// Validates that a card-identification code is `tkc_` followed by a
/// lowercase alphanumeric body.
pub fn validate_card_code(code: &str) -> Result<(), ValidationError> {
    validate_prefixed_code(code, CARD_CODE_PREFIX, "card_code")
}

fn validate_prefixed_code(
    code: &str,
    prefix: &'static str,
    field: &'static str,
) -> Result<(), ValidationError> {
    let Some(body) = code.strip_prefix(prefix) else {
        let mut err = ValidationError::new(field);
        err.message = Some(format!("code must start with `{prefix}`").into());
        return Err(err);
    };

    if body.is_empty() {
        let mut err = ValidationError::new(field);
        err.message = Some(format!("code body after `{prefix}` must not be empty").into());
        return Err(err);
    }

    if !body
        .chars()
        .all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase())
    {
        let mut err = ValidationError::new(field);
        err.message =
            Some("code body must contain only lowercase alphanumeric characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pack_code_valid() {
        assert!(validate_pack_code("tkp_0001").is_ok());
        assert!(validate_pack_code("tkp_ab12cd").is_ok());
    }

    #[test]
    fn test_validate_pack_code_invalid() {
        assert!(validate_pack_code("tkp_").is_err()); // empty body
        assert!(validate_pack_code("tkc_0001").is_err()); // wrong prefix
        assert!(validate_pack_code("TKP_0001").is_err()); // not normalized
        assert!(validate_pack_code("tkp_AB12").is_err()); // uppercase body
        assert!(validate_pack_code("tkp_ab 12").is_err()); // space
        assert!(validate_pack_code("").is_err()); // empty
    }

    #[test]
    fn test_validate_card_code() {
        assert!(validate_card_code("tkc_ab12").is_ok());
        assert!(validate_card_code("tkp_ab12").is_err());
        assert!(validate_card_code("tkc_").is_err());
    }
}
