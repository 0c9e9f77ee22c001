//! Firebase Identity Toolkit REST client

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AuthError, Identity, IdentityProvider};

pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

/// Map an Identity Toolkit error code (e.g. `EMAIL_EXISTS`) to an [`AuthError`]
pub fn map_error_code(message: &str) -> AuthError {
    // Codes may carry a suffix: "WEAK_PASSWORD : Password should be ..."
    let code = message.split(':').next().unwrap_or("").trim();
    match code {
        "EMAIL_EXISTS" => AuthError::EmailExists,
        "INVALID_LOGIN_CREDENTIALS" | "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_EMAIL" => {
            AuthError::InvalidCredentials
        }
        _ => AuthError::Api(message.to_string()),
    }
}

pub struct FirebaseAuth {
    http: Client,
    base_url: String,
    api_key: String,
    current: Mutex<Option<Identity>>,
}

impl FirebaseAuth {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AuthError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AuthError::MissingApiKey);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            current: Mutex::new(None),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
    ) -> Result<T, AuthError> {
        let url = format!("{}/accounts:{}?key={}", self.base_url, method, self.api_key);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|r| r.error.message)
                .unwrap_or(text);
            log::warn!("Identity: accounts:{} failed ({}): {}", method, status.as_u16(), message);
            return Err(map_error_code(&message));
        }

        serde_json::from_str(&text).map_err(|e| AuthError::Api(e.to_string()))
    }

    async fn send_verification(&self, id_token: &str) -> Result<(), AuthError> {
        let _: serde_json::Value = self
            .call(
                "sendOobCode",
                &json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token }),
            )
            .await?;
        Ok(())
    }

    fn set_current(&self, identity: Option<Identity>) {
        if let Ok(mut current) = self.current.lock() {
            *current = identity;
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn current(&self) -> Option<Identity> {
        self.current.lock().ok().and_then(|c| c.clone())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let token: TokenResponse = self
            .call(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;

        self.send_verification(&token.id_token).await?;
        self.set_current(None);

        let sent_to = if token.email.is_empty() {
            email.to_string()
        } else {
            token.email
        };
        log::info!("Identity: account created, verification sent to {}", sent_to);
        Ok(sent_to)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let token: TokenResponse = self
            .call(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;

        let lookup: LookupResponse = self
            .call("lookup", &json!({ "idToken": token.id_token }))
            .await?;
        let user = lookup
            .users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Api("account lookup returned no user".to_string()))?;

        let email = if user.email.is_empty() { token.email } else { user.email };

        if !user.email_verified {
            self.send_verification(&token.id_token).await?;
            self.set_current(None);
            log::info!("Identity: {} not verified, verification re-sent", email);
            return Err(AuthError::VerificationSent(email));
        }

        let identity = Identity {
            email,
            verified: true,
            id_token: token.id_token,
        };
        self.set_current(Some(identity.clone()));
        log::info!("Identity: signed in as {}", identity.email);
        Ok(identity)
    }

    fn sign_out(&self) {
        self.set_current(None);
        log::info!("Identity: signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(map_error_code("EMAIL_EXISTS"), AuthError::EmailExists);
        assert_eq!(map_error_code("INVALID_LOGIN_CREDENTIALS"), AuthError::InvalidCredentials);
        assert_eq!(map_error_code("EMAIL_NOT_FOUND"), AuthError::InvalidCredentials);
        assert_eq!(
            map_error_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            AuthError::Api("WEAK_PASSWORD : Password should be at least 6 characters".to_string())
        );
    }

    #[test]
    fn test_requires_key() {
        assert!(matches!(
            FirebaseAuth::new(IDENTITY_TOOLKIT_URL, ""),
            Err(AuthError::MissingApiKey)
        ));
    }

    #[test]
    fn test_starts_signed_out() {
        let auth = FirebaseAuth::new(IDENTITY_TOOLKIT_URL, "k").unwrap();
        assert!(auth.current().is_none());
        assert!(!auth.is_verified());
    }

    #[tokio::test]
    async fn test_network_failure() {
        let auth = FirebaseAuth::new("http://127.0.0.1:9/v1", "k").unwrap();
        let err = auth.sign_in("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
        assert!(auth.current().is_none());
    }
}
