//! GoTrue REST client.

use super::{pkce, AuthError, AuthService, Session, SignUpOutcome, SignUpRequest, User};
use crate::{
    config::AuthClientConfig,
    dashboard::{Connection, ProfileRecord, ProfileService},
    signal::{Clock, KeyValueStore, SystemClock},
    APP_USER_AGENT,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};

const REQUEST_TIMEOUT_SECONDS: u64 = 10;
// Refresh a little before the reported expiry.
const EXPIRY_MARGIN_SECONDS: u64 = 10;

/// Session as persisted in local storage.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct StoredSession {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<u64>,
    user: User,
}

impl StoredSession {
    fn into_session(self) -> Session {
        Session {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at: self.expires_at,
            user: self.user,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<u64>,
    #[serde(default)]
    expires_in: Option<u64>,
    user: User,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct GoTrueClient {
    http: Client,
    config: AuthClientConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl GoTrueClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: AuthClientConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            http,
            config,
            store,
            clock: Arc::new(SystemClock),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthClientConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.auth_endpoint(path))
            .header("apikey", self.config.anon_key().expose_secret())
    }

    /// Data API request on behalf of the signed-in user.
    async fn table_request(&self, table: &str) -> Result<RequestBuilder, AuthError> {
        let session = self.get_session().await?.ok_or(AuthError::MissingSession)?;

        Ok(self
            .http
            .get(self.config.rest_endpoint(table))
            .header("apikey", self.config.anon_key().expose_secret())
            .bearer_auth(session.access_token.expose_secret()))
    }

    async fn read_error(response: Response) -> AuthError {
        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body
            .msg
            .or(body.message)
            .or(body.error_description)
            .or(body.error)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

        AuthError::classify(status.as_u16(), body.error_code.as_deref(), &message)
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, AuthError> {
        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|err| AuthError::Decode(err.to_string()))
    }

    async fn send_empty(builder: RequestBuilder) -> Result<(), AuthError> {
        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        Ok(())
    }

    fn now_seconds(&self) -> u64 {
        self.clock.now_millis() / 1_000
    }

    fn stored_session(&self) -> Result<Option<StoredSession>, AuthError> {
        let Some(raw) = self.store.get(self.config.storage_key())? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!("Discarding unreadable stored session: {err}");
                self.store.remove(self.config.storage_key())?;
                Ok(None)
            }
        }
    }

    fn save_session(&self, session: &StoredSession) -> Result<(), AuthError> {
        let raw = serde_json::to_string(session).map_err(|err| AuthError::Decode(err.to_string()))?;
        self.store.set(self.config.storage_key(), &raw)?;
        Ok(())
    }

    fn clear_session(&self) -> Result<(), AuthError> {
        self.store.remove(self.config.storage_key())?;
        Ok(())
    }

    /// Persist a token response and hand it out as a [`Session`].
    fn accept_tokens(&self, tokens: TokenResponse) -> Result<Session, AuthError> {
        let expires_at = tokens
            .expires_at
            .or_else(|| {
                tokens
                    .expires_in
                    .map(|ttl| self.now_seconds().saturating_add(ttl))
            });

        let stored = StoredSession {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
            user: tokens.user,
        };
        self.save_session(&stored)?;

        Ok(stored.into_session())
    }

    fn is_expired(&self, session: &StoredSession) -> bool {
        session
            .expires_at
            .is_some_and(|at| at <= self.now_seconds() + EXPIRY_MARGIN_SECONDS)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, AuthError> {
        Self::send(
            self.request(Method::GET, "user")
                .bearer_auth(access_token),
        )
        .await
    }

    #[instrument(skip(self, session))]
    async fn refresh(&self, session: &StoredSession) -> Result<Option<Session>, AuthError> {
        let result: Result<TokenResponse, AuthError> = Self::send(
            self.request(Method::POST, "token")
                .query(&[("grant_type", "refresh_token")])
                .json(&json!({ "refresh_token": session.refresh_token })),
        )
        .await;

        match result {
            Ok(tokens) => self.accept_tokens(tokens).map(Some),
            Err(err) if err.is_service_failure() => Err(err),
            Err(err) => {
                debug!("Refresh rejected, dropping stored session: {err}");
                self.clear_session()?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl AuthService for GoTrueClient {
    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError> {
        let pair = pkce::generate();
        self.store.set(
            &self.config.verifier_storage_key(),
            pair.verifier.expose_secret(),
        )?;

        let body: Value = Self::send(
            self.request(Method::POST, "signup")
                .query(&[("redirect_to", self.config.email_redirect_to())])
                .json(&json!({
                    "email": request.email,
                    "password": request.password.expose_secret(),
                    "data": request.profile,
                    "code_challenge": pair.challenge,
                    "code_challenge_method": pkce::CHALLENGE_METHOD,
                })),
        )
        .await?;

        if body.get("access_token").is_some() {
            let tokens: TokenResponse =
                serde_json::from_value(body).map_err(|err| AuthError::Decode(err.to_string()))?;
            let session = self.accept_tokens(tokens)?;
            // Confirmation is off, the verifier is never needed.
            self.store.remove(&self.config.verifier_storage_key())?;

            return Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
                needs_email_confirmation: false,
            });
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let user: User =
            serde_json::from_value(user_value).map_err(|err| AuthError::Decode(err.to_string()))?;
        debug!("Sign-up for {} needs email confirmation", request.email);

        Ok(SignUpOutcome {
            user,
            session: None,
            needs_email_confirmation: true,
        })
    }

    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
        let tokens: TokenResponse = Self::send(
            self.request(Method::POST, "token")
                .query(&[("grant_type", "password")])
                .json(&json!({
                    "email": email,
                    "password": password.expose_secret(),
                })),
        )
        .await?;

        self.accept_tokens(tokens)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(session) = self.stored_session()? else {
            return Ok(());
        };

        let result = Self::send_empty(
            self.request(Method::POST, "logout")
                .bearer_auth(&session.access_token),
        )
        .await;

        self.clear_session()?;

        match result {
            // The token is already unusable remotely; local sign-out is enough.
            Err(AuthError::InvalidToken(_)) => Ok(()),
            other => other,
        }
    }

    #[instrument(skip(self))]
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.stored_session()? else {
            return Ok(None);
        };

        if self.is_expired(&session) {
            debug!("Stored session expired, refreshing");
            return self.refresh(&session).await;
        }

        Ok(Some(session.into_session()))
    }

    #[instrument(skip(self))]
    async fn get_user(&self) -> Result<Option<User>, AuthError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };

        match self.fetch_user(session.access_token.expose_secret()).await {
            Ok(user) => {
                if let Some(mut stored) = self.stored_session()? {
                    stored.user = user.clone();
                    self.save_session(&stored)?;
                }
                Ok(Some(user))
            }
            Err(AuthError::InvalidToken(reason)) => {
                debug!("Stored session rejected: {reason}");
                self.clear_session()?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all)]
    async fn set_session(
        &self,
        access_token: &SecretString,
        refresh_token: &SecretString,
    ) -> Result<Session, AuthError> {
        let user = self.fetch_user(access_token.expose_secret()).await?;

        let stored = StoredSession {
            access_token: access_token.expose_secret().to_string(),
            refresh_token: refresh_token.expose_secret().to_string(),
            expires_at: None,
            user,
        };
        self.save_session(&stored)?;

        Ok(stored.into_session())
    }

    #[instrument(skip_all)]
    async fn exchange_code_for_session(&self, code: &SecretString) -> Result<Session, AuthError> {
        let verifier_key = self.config.verifier_storage_key();
        let Some(verifier) = self.store.get(&verifier_key)? else {
            return Err(AuthError::VerifierMismatch(
                "no code verifier stored for this browser".to_string(),
            ));
        };

        let result: Result<TokenResponse, AuthError> = Self::send(
            self.request(Method::POST, "token")
                .query(&[("grant_type", "pkce")])
                .json(&json!({
                    "auth_code": code.expose_secret(),
                    "code_verifier": verifier,
                })),
        )
        .await;

        // Single use, whatever the outcome.
        if let Err(err) = self.store.remove(&verifier_key) {
            warn!("Failed to remove used code verifier: {err}");
        }

        self.accept_tokens(result?)
    }

    #[instrument(skip(self))]
    async fn resend_confirmation(&self, email: &str) -> Result<(), AuthError> {
        Self::send_empty(
            self.request(Method::POST, "resend")
                .query(&[("redirect_to", self.config.email_redirect_to())])
                .json(&json!({ "type": "signup", "email": email })),
        )
        .await
    }
}

#[async_trait]
impl ProfileService for GoTrueClient {
    #[instrument(skip(self))]
    async fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRecord>, AuthError> {
        let id = format!("eq.{user_id}");
        let rows: Vec<ProfileRecord> = Self::send(
            self.table_request("profiles")
                .await?
                .query(&[("select", "*"), ("id", id.as_str())]),
        )
        .await?;

        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn active_connections(&self, user_id: &str) -> Result<Vec<Connection>, AuthError> {
        let owner = format!("eq.{user_id}");
        Self::send(self.table_request("health_data_connections").await?.query(&[
            ("select", "*"),
            ("user_id", owner.as_str()),
            ("connection_status", "eq.active"),
        ]))
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{auth::Profile, signal::MemoryStore};
    use anyhow::Result;
    use std::net::TcpListener;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    /// Storage whose removals fail, as on a read-only disk.
    #[derive(Default)]
    struct StickyStore(MemoryStore);

    impl KeyValueStore for StickyStore {
        fn get(&self, key: &str) -> Result<Option<String>, crate::signal::StoreError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), crate::signal::StoreError> {
            self.0.set(key, value)
        }

        fn remove(&self, _key: &str) -> Result<(), crate::signal::StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    fn client(server: &MockServer, store: Arc<dyn KeyValueStore>) -> GoTrueClient {
        let config = AuthClientConfig::new(
            Url::parse(&server.uri()).unwrap(),
            SecretString::from("anon"),
            Url::parse("https://arx.health").unwrap(),
        );
        GoTrueClient::new(config, store).unwrap()
    }

    fn token_body(email: &str) -> Value {
        json!({
            "access_token": "access",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "user": {
                "id": "user-1",
                "email": email,
                "email_confirmed_at": "2026-10-16T10:00:00Z"
            }
        })
    }

    #[tokio::test]
    async fn sign_up_without_session_needs_confirmation() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(header("apikey", "anon"))
            .and(query_param(
                "redirect_to",
                "https://arx.health/email-confirmed",
            ))
            .and(body_partial_json(json!({
                "email": "ada@arx.health",
                "code_challenge_method": "s256",
                "data": {"first_name": "Ada", "marketing_emails": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-1",
                "email": "ada@arx.health",
                "email_confirmed_at": null
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let client = client(&server, store.clone());
        let outcome = client
            .sign_up(&SignUpRequest {
                email: "ada@arx.health".to_string(),
                password: SecretString::from("secret123"),
                profile: Profile {
                    first_name: Some("Ada".to_string()),
                    marketing_emails: true,
                    ..Profile::default()
                },
            })
            .await?;

        assert!(outcome.needs_email_confirmation);
        assert!(outcome.session.is_none());
        assert_eq!(outcome.user.email.as_deref(), Some("ada@arx.health"));
        assert!(store.get("arx-auth-token-code-verifier")?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_persists_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ada@arx.health")))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let client = client(&server, store.clone());
        let session = client
            .sign_in("ada@arx.health", &SecretString::from("secret123"))
            .await?;
        assert_eq!(session.email(), Some("ada@arx.health"));

        let restored = client.get_session().await?.unwrap();
        assert_eq!(restored.access_token.expose_secret(), "access");
        assert!(restored.expires_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_classifies_errors() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 400,
                "error_code": "email_not_confirmed",
                "msg": "Email not confirmed"
            })))
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(MemoryStore::new()));
        let err = client
            .sign_in("ada@arx.health", &SecretString::from("secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailNotConfirmed));
        Ok(())
    }

    #[tokio::test]
    async fn exchange_code_uses_and_removes_stored_verifier() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "pkce"))
            .and(body_partial_json(json!({
                "auth_code": "code-1",
                "code_verifier": "verifier-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ada@arx.health")))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.set("arx-auth-token-code-verifier", "verifier-1")?;
        let client = client(&server, store.clone());

        let session = client
            .exchange_code_for_session(&SecretString::from("code-1"))
            .await?;
        assert!(session.user.is_confirmed());
        assert!(store.get("arx-auth-token-code-verifier")?.is_none());
        assert!(store.get("arx-auth-token")?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn exchange_code_survives_verifier_cleanup_failure() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "pkce"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ada@arx.health")))
            .mount(&server)
            .await;

        let store = Arc::new(StickyStore::default());
        store.set("arx-auth-token-code-verifier", "verifier-1")?;
        let client = client(&server, store.clone());

        let session = client
            .exchange_code_for_session(&SecretString::from("code-1"))
            .await?;
        assert_eq!(session.email(), Some("ada@arx.health"));
        assert!(store.get("arx-auth-token")?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn huge_expires_in_saturates() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let mut body = token_body("ada@arx.health");
        body["expires_in"] = json!(u64::MAX);
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(MemoryStore::new()));
        let session = client
            .sign_in("ada@arx.health", &SecretString::from("secret123"))
            .await?;
        assert_eq!(session.expires_at, Some(u64::MAX));
        Ok(())
    }

    #[tokio::test]
    async fn exchange_code_without_verifier_is_a_mismatch() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let client = client(&server, Arc::new(MemoryStore::new()));

        let err = client
            .exchange_code_for_session(&SecretString::from("code-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::VerifierMismatch(_)));
        Ok(())
    }

    #[tokio::test]
    async fn set_session_validates_token_with_user_endpoint() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer fragment-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-1",
                "email": "ada@arx.health",
                "email_confirmed_at": "2026-10-16T10:00:00Z"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "msg": "invalid JWT: token is expired"
            })))
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(MemoryStore::new()));

        let session = client
            .set_session(
                &SecretString::from("fragment-access"),
                &SecretString::from("fragment-refresh"),
            )
            .await?;
        assert!(session.user.is_confirmed());

        let err = client
            .set_session(&SecretString::from("expired"), &SecretString::from(""))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        Ok(())
    }

    #[tokio::test]
    async fn get_user_without_session_is_none() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let client = client(&server, Arc::new(MemoryStore::new()));
        assert!(client.get_user().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_clears_local_session_even_when_remote_fails() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "msg": "database unavailable"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.set(
            "arx-auth-token",
            &json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "user": {"id": "user-1"}
            })
            .to_string(),
        )?;
        let client = client(&server, store.clone());

        let err = client.sign_out().await.unwrap_err();
        assert!(err.is_service_failure());
        assert!(store.get("arx-auth-token")?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn resend_posts_signup_type() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/resend"))
            .and(body_partial_json(json!({
                "type": "signup",
                "email": "ada@arx.health"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(MemoryStore::new()));
        client.resend_confirmation("ada@arx.health").await?;
        Ok(())
    }

    fn signed_in_store() -> Result<Arc<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        store.set(
            "arx-auth-token",
            &json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "user": {"id": "user-1"}
            })
            .to_string(),
        )?;
        Ok(store)
    }

    #[tokio::test]
    async fn profile_is_read_with_the_session_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.user-1"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "user-1",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "marketing_emails": false
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, signed_in_store()?);
        let profile = client.get_profile("user-1").await?.unwrap();
        assert_eq!(profile.greeting_name(), Some("Ada"));
        assert_eq!(profile.marketing_emails, Some(false));
        Ok(())
    }

    #[tokio::test]
    async fn missing_profile_row_is_none() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client(&server, signed_in_store()?);
        assert!(client.get_profile("user-1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn connections_are_filtered_to_active() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/health_data_connections"))
            .and(query_param("user_id", "eq.user-1"))
            .and(query_param("connection_status", "eq.active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "c1",
                "user_id": "user-1",
                "device_type": "apple-watch",
                "device_id": "AW-1",
                "connection_status": "active",
                "last_sync": "2026-10-16T09:00:00Z"
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, signed_in_store()?);
        let connections = client.active_connections("user-1").await?;
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].device_label(), "apple watch");
        assert_eq!(connections[0].last_sync.as_deref(), Some("2026-10-16T09:00:00Z"));
        Ok(())
    }

    #[tokio::test]
    async fn data_api_needs_a_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let client = client(&server, Arc::new(MemoryStore::new()));

        let err = client.get_profile("user-1").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingSession));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn gate_loads_the_dashboard_over_http() -> Result<()> {
        use crate::dashboard::{open, DashboardGate};

        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-1",
                "email": "ada@arx.health",
                "email_confirmed_at": "2026-10-16T10:00:00Z"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client(&server, signed_in_store()?);
        let gate = open(&client, &client).await?;
        assert!(matches!(gate, DashboardGate::Redirect("/signup")));
        Ok(())
    }
}
