//! Registration form and its pre-submission validation.

use serde::Deserialize;
use thiserror::Error;

/// Minimum password length accepted by the sign-up form.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// A rule violated by a registration form before it is sent anywhere.
///
/// The `Display` text is shown to the user verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    /// Password and confirmation differ.
    #[error("Passwords do not match")]
    PasswordMismatch,
    /// Password shorter than [`MIN_PASSWORD_LENGTH`].
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
}

/// Sign-up form data as submitted by the browser.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub phone: String,
}

impl RegistrationForm {
    /// Run the pre-submission checks.
    ///
    /// The mismatch check runs first, so a form that violates both rules
    /// reports [`ValidationFailure::PasswordMismatch`]. Length is counted in
    /// characters, not bytes.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ValidationFailure> {
        if self.password != self.password_confirm {
            return Err(ValidationFailure::PasswordMismatch);
        }

        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ValidationFailure::PasswordTooShort);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(password: &str, confirm: &str) -> RegistrationForm {
        RegistrationForm {
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            password: password.to_string(),
            password_confirm: confirm.to_string(),
            phone: String::new(),
        }
    }

    #[test]
    fn test_valid_form() {
        assert_eq!(form("sabang1", "sabang1").validate(), Ok(()));
    }

    #[test]
    fn test_exactly_minimum_length() {
        assert_eq!(form("123456", "123456").validate(), Ok(()));
    }

    #[test]
    fn test_mismatch() {
        assert_eq!(
            form("sabang1", "sabang2").validate(),
            Err(ValidationFailure::PasswordMismatch)
        );
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            form("12345", "12345").validate(),
            Err(ValidationFailure::PasswordTooShort)
        );
    }

    #[test]
    fn test_mismatch_reported_before_length() {
        assert_eq!(
            form("abc", "abd").validate(),
            Err(ValidationFailure::PasswordMismatch)
        );
    }

    #[test]
    fn test_length_counts_characters() {
        // Six characters, more than six bytes.
        assert_eq!(form("sabáng", "sabáng").validate(), Ok(()));
        assert_eq!(
            form("wéh", "wéh").validate(),
            Err(ValidationFailure::PasswordTooShort)
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ValidationFailure::PasswordMismatch.to_string(),
            "Passwords do not match"
        );
        assert_eq!(
            ValidationFailure::PasswordTooShort.to_string(),
            "Password must be at least 6 characters"
        );
    }
}
