use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ValidationError, utilities::RequiredFieldExt};

/// A username/password pair as submitted by a login form or token request.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build credentials from optional form fields.
    pub fn from_form(
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let username = username.require_field("Username")?;
        let password = password.require_field("Password")?;
        Ok(Self::new(username, password))
    }

    /// The identifier protection state is keyed by.
    pub fn identifier(&self) -> &str {
        self.username.trim()
    }

    /// Reject empty usernames and passwords with the same generic error a wrong
    /// password gets.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(AuthError::InvalidCredentialsInput);
        }
        Ok(())
    }
}

/// Validate a bare identifier, as submitted to a forgot-password form.
pub fn validate_identifier(identifier: &str) -> Result<&str, AuthError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(AuthError::InvalidCredentialsInput);
    }
    Ok(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_fields() {
        assert!(Credentials::new("alice@example.com", "hunter2").validate().is_ok());
        assert!(matches!(
            Credentials::new("   ", "hunter2").validate(),
            Err(AuthError::InvalidCredentialsInput)
        ));
        assert!(matches!(
            Credentials::new("alice@example.com", "").validate(),
            Err(AuthError::InvalidCredentialsInput)
        ));
    }

    #[test]
    fn test_from_form_requires_both_fields() {
        let creds = Credentials::from_form(Some(" alice@example.com "), Some("pw")).unwrap();
        assert_eq!(creds.identifier(), "alice@example.com");

        match Credentials::from_form(None, Some("pw")).unwrap_err() {
            ValidationError::MissingField(msg) => assert_eq!(msg, "Username is required"),
            other => panic!("Expected missing field, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_validate_identifier() {
        assert_eq!(validate_identifier(" bob ").unwrap(), "bob");
        assert!(validate_identifier("  ").is_err());
    }
}
