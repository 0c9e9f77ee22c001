//! Account gate in front of the report search
//!
//! Only a signed-in identity with a verified email may search. Sessions live
//! in memory for the life of the process.

mod firebase;

pub use firebase::{FirebaseAuth, IDENTITY_TOOLKIT_URL};

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub verified: bool,
    pub id_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Firebase API key not configured. Set FIREBASE_API_KEY environment variable.")]
    MissingApiKey,
    #[error("email already registered")]
    EmailExists,
    #[error("invalid email or password")]
    InvalidCredentials,
    /// Signed in but unverified; a verification email was sent
    #[error("email {0} is not verified")]
    VerificationSent(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Identity API error: {0}")]
    Api(String),
}

impl AuthError {
    pub fn user_message(&self) -> String {
        match self {
            AuthError::MissingApiKey => "Sign-in is not configured.".to_string(),
            AuthError::EmailExists => "User already exists. Please sign in".to_string(),
            AuthError::InvalidCredentials => "Email or password is incorrect".to_string(),
            AuthError::VerificationSent(email) => format!(
                "We have sent a verification email to {}. Please verify it to unlock property insights.",
                email
            ),
            AuthError::Network(_) | AuthError::Api(_) => {
                "An error occurred during authentication".to_string()
            }
        }
    }
}

/// Source of the signed-in identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The current identity, if any
    fn current(&self) -> Option<Identity>;

    /// Create an account and send a verification email. Never leaves the
    /// new account signed in; returns the address the email went to.
    async fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError>;

    /// Sign in. Unverified accounts get a fresh verification email and
    /// [`AuthError::VerificationSent`].
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    fn sign_out(&self);

    /// True when a verified identity is present
    fn is_verified(&self) -> bool {
        self.current().map(|i| i.verified).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(AuthError::EmailExists.user_message(), "User already exists. Please sign in");
        assert_eq!(AuthError::InvalidCredentials.user_message(), "Email or password is incorrect");
        assert!(AuthError::VerificationSent("a@b.com".into())
            .user_message()
            .contains("a@b.com"));
    }
}
