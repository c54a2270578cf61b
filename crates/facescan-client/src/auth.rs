//! Login, signup and logout.

use crate::api::{LoginRequest, LoginResponse, SignupRequest, LOGIN_PATH, LOGOUT_PATH, SIGNUP_PATH};
use crate::remote::{round_trip, RemoteError};
use crate::session::{Credentials, SessionError, SessionStore};
use crate::transport::{ApiRequest, Transport};
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

const EMAIL_PATTERN: &str = r"\S+@\S+\.\S+";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Check login credentials locally, before anything is sent.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::InvalidInput("Email is required".into()));
    }
    let well_formed = Regex::new(EMAIL_PATTERN)
        .map(|re| re.is_match(email))
        .unwrap_or(false);
    if !well_formed {
        return Err(AuthError::InvalidInput("Please enter a valid email".into()));
    }
    if password.is_empty() {
        return Err(AuthError::InvalidInput("Password is required".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub struct AuthClient {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionStore>,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<dyn SessionStore>) -> Self {
        Self { transport, session }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.token().is_some()
    }

    pub fn email(&self) -> Option<String> {
        self.session.email()
    }

    /// Exchange credentials for a token and keep it in the session store.
    ///
    /// A 401 here is a failed login, not an expired session, so the session
    /// hook is not invoked.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        validate_credentials(email, password)?;
        let email = email.trim();
        let body = serde_json::to_value(LoginRequest { email, password })?;
        let resp = round_trip(
            self.transport.as_ref(),
            ApiRequest::post(LOGIN_PATH, body),
            "Login failed",
        )
        .await?;
        let LoginResponse { access_token } = resp.json()?;

        self.session.save(Credentials {
            access_token,
            email: email.to_string(),
        })?;
        tracing::info!(email, "logged in");
        Ok(())
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<(), AuthError> {
        let body = serde_json::to_value(request)?;
        round_trip(
            self.transport.as_ref(),
            ApiRequest::post(SIGNUP_PATH, body),
            "Signup failed",
        )
        .await?;
        tracing::info!(email = %request.email, "account created");
        Ok(())
    }

    /// Tell the server, then drop local state regardless of its answer.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let request =
            ApiRequest::post(LOGOUT_PATH, serde_json::json!({})).with_bearer(self.session.token());
        if let Err(e) = round_trip(self.transport.as_ref(), request, "Logout failed").await {
            tracing::warn!(error = %e, "logout request failed; clearing local state anyway");
        }
        self.session.clear()?;
        tracing::info!("logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::transport::{ApiResponse, TransportError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl Canned {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(ApiResponse::new(self.status, self.body))
        }
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let transport = Canned::new(200, r#"{"access_token":"jwt-123"}"#);
        let session = Arc::new(MemorySessionStore::new());
        let auth = AuthClient::new(transport.clone(), session.clone());

        auth.login("ann@example.com", "secret").await.unwrap();
        assert_eq!(session.token().as_deref(), Some("jwt-123"));
        assert_eq!(auth.email().as_deref(), Some("ann@example.com"));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].path, LOGIN_PATH);
        assert!(seen[0].bearer.is_none());
        assert_eq!(seen[0].body.as_ref().unwrap()["password"], "secret");
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let transport = Canned::new(401, r#"{"msg":"Invalid credentials"}"#);
        let session = Arc::new(MemorySessionStore::new());
        let auth = AuthClient::new(transport, session.clone());

        let err = auth.login("ann@example.com", "wrong-pw").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("ann@example.com", "secret").is_ok());
        assert!(validate_credentials(" ann@example.com ", "secret").is_ok());

        let cases = [
            ("", "secret", "Email is required"),
            ("   ", "secret", "Email is required"),
            ("ann", "secret", "Please enter a valid email"),
            ("ann@example", "secret", "Please enter a valid email"),
            ("ann@example.com", "", "Password is required"),
            ("ann@example.com", "12345", "Password must be at least 6 characters"),
        ];
        for (email, password, message) in cases {
            let err = validate_credentials(email, password).unwrap_err();
            assert!(matches!(err, AuthError::InvalidInput(_)));
            assert_eq!(err.to_string(), message, "{email:?} / {password:?}");
        }
    }

    #[tokio::test]
    async fn test_login_invalid_input_sends_nothing() {
        let transport = Canned::new(200, r#"{"access_token":"jwt-123"}"#);
        let session = Arc::new(MemorySessionStore::new());
        let auth = AuthClient::new(transport.clone(), session.clone());

        let err = auth.login("not-an-email", "secret").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
        let err = auth.login("ann@example.com", "123").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));

        assert!(transport.seen.lock().unwrap().is_empty());
        assert!(session.token().is_none());
    }

    #[tokio::test]
    async fn test_signup_conflict() {
        let transport = Canned::new(409, r#"{"msg":"Email already registered"}"#);
        let auth = AuthClient::new(transport, Arc::new(MemorySessionStore::new()));
        let request = SignupRequest {
            name: "Ann".into(),
            email: "ann@example.com".into(),
            password: "pw".into(),
            phone: Some("555-0100".into()),
        };

        let err = auth.signup(&request).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Remote(RemoteError::Validation { status: 409, .. })
        ));
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let transport = Canned::new(500, "");
        let session = Arc::new(MemorySessionStore::with_credentials("tok", "ann@example.com"));
        let auth = AuthClient::new(transport.clone(), session.clone());

        auth.logout().await.unwrap();
        assert!(session.token().is_none());
        assert_eq!(
            transport.seen.lock().unwrap()[0].bearer.as_deref(),
            Some("tok")
        );
    }
}
