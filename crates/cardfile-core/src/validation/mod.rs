//! Input validation and sanitization.
//!
//! All externally supplied identity fields pass through here before they
//! reach the credential store.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Validation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("input exceeds maximum length ({max} bytes, got {actual})")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Input is empty after trimming.
    #[error("input is empty")]
    Empty,

    /// Email address is structurally invalid.
    #[error("invalid email address")]
    InvalidEmail,
}

/// Size limits per input type.
pub mod limits {
    /// Maximum email address length (RFC 5321 path limit).
    pub const MAX_EMAIL_LENGTH: usize = 254;

    /// Maximum display-name length.
    pub const MAX_DISPLAY_NAME_LENGTH: usize = 64;
}

/// Normalize an email address: trim, lowercase, and check structure.
///
/// Uniqueness comparisons across the system operate on the normalized form,
/// so `Alice@X.com` and `alice@x.com` are the same account.
///
/// # Errors
///
/// Returns `ValidationError::InvalidEmail` if the address has no `@`, an
/// empty local part or domain, or embedded whitespace;
/// `ValidationError::TooLong` past [`limits::MAX_EMAIL_LENGTH`].
pub fn normalize_email(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.len() > limits::MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_EMAIL_LENGTH,
            actual: trimmed.len(),
        });
    }

    let Some((local, domain)) = trimmed.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ValidationError::InvalidEmail);
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(trimmed.to_lowercase())
}

/// Sanitize a user-supplied display name.
///
/// Performs:
/// 1. Length check (prevent memory exhaustion)
/// 2. Strip control characters
/// 3. Unicode normalization (NFKC - prevent homograph confusion)
///
/// # Errors
///
/// Returns `ValidationError::TooLong` past [`limits::MAX_DISPLAY_NAME_LENGTH`]
/// and `ValidationError::Empty` if nothing printable remains.
pub fn sanitize_display_name(input: &str) -> Result<String, ValidationError> {
    if input.len() > limits::MAX_DISPLAY_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_DISPLAY_NAME_LENGTH,
            actual: input.len(),
        });
    }

    let sanitized: String = input.chars().filter(|c| !c.is_control()).collect();
    let normalized: String = sanitized.nfkc().collect::<String>().trim().to_string();

    if normalized.is_empty() {
        return Err(ValidationError::Empty);
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_lowercased_and_trimmed() {
        assert_eq!(
            normalize_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn email_without_at_rejected() {
        assert_eq!(
            normalize_email("not-an-email"),
            Err(ValidationError::InvalidEmail)
        );
    }

    #[test]
    fn email_with_empty_parts_rejected() {
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("alice@").is_err());
        assert!(normalize_email("alice@nodot").is_err());
    }

    #[test]
    fn email_with_spaces_rejected() {
        assert!(normalize_email("al ice@example.com").is_err());
    }

    #[test]
    fn overlong_email_rejected() {
        let long = format!("{}@example.com", "a".repeat(300));
        assert!(matches!(
            normalize_email(&long),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn display_name_strips_control_chars() {
        assert_eq!(sanitize_display_name("ali\u{0000}ce\n").unwrap(), "alice");
    }

    #[test]
    fn empty_display_name_rejected() {
        assert_eq!(sanitize_display_name("  \t "), Err(ValidationError::Empty));
    }

    #[test]
    fn display_name_is_nfkc_normalized() {
        // Fullwidth letters fold to ASCII under NFKC.
        assert_eq!(sanitize_display_name("ｂｏｂ").unwrap(), "bob");
    }
}
