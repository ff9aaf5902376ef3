//! BankID challenge and session handling.
//!
//! A run authenticates in two steps:
//!
//! 1. [`Authenticator::begin_challenge`] starts an OAuth2 + PKCE authorization
//!    and returns a [`Challenge`] whose QR payload is shown to the user.
//! 2. [`Authenticator::await_resolution`] polls the challenge at a fixed
//!    interval until the user signs in the BankID app, refuses, or the
//!    challenge expires, and then exchanges the code for a [`Session`].
//!
//! Neither the challenge nor the session outlives the run that created it.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::remote::{AuthApi, PollState};

/// An authenticated Kivra session.
#[derive(Clone)]
pub struct Session {
    access_token: String,
    actor_key: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session from its parts.
    pub fn new(
        access_token: impl Into<String>,
        actor_key: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            actor_key: actor_key.into(),
            expires_at,
        }
    }

    /// Bearer token for API calls.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The Kivra user id the session acts as.
    pub fn actor_key(&self) -> &str {
        &self.actor_key
    }

    /// When the token stops being accepted, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token is known to have expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("actor_key", &self.actor_key)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A pending BankID challenge.
pub struct Challenge {
    qr_payload: String,
    poll_url: String,
    auth_code: String,
    code_verifier: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    deadline: Instant,
}

impl Challenge {
    /// Payload to render as a QR code for the BankID app.
    pub fn qr_payload(&self) -> &str {
        &self.qr_payload
    }

    /// When the challenge was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the challenge stops being pollable.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the challenge has passed its expiry.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("poll_url", &self.poll_url)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// PKCE verifier and its S256 challenge.
struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdClaims {
    kivra_user_id: Option<String>,
    exp: Option<i64>,
}

fn decode_id_token(token: &str) -> Result<IdClaims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::Protocol("malformed id_token".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Protocol(format!("undecodable id_token: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Protocol(format!("invalid id_token: {e}")))
}

/// Drives one BankID sign-in.
#[derive(Debug)]
pub struct Authenticator<A> {
    api: Arc<A>,
    config: AuthConfig,
}

impl<A: AuthApi> Authenticator<A> {
    /// Create an authenticator over the given remote API.
    pub fn new(api: Arc<A>, config: AuthConfig) -> Self {
        Self { api, config }
    }

    /// Start a new challenge.
    pub async fn begin_challenge(&self) -> Result<Challenge> {
        let pkce = Pkce::generate();
        let start = self.api.authorize(&pkce.challenge).await?;

        if start.qr_code.is_empty() || start.next_poll_url.is_empty() {
            return Err(Error::Protocol(
                "authorization response is missing the QR code or poll URL".into(),
            ));
        }

        let created_at = Utc::now();
        let timeout = self.config.challenge_timeout;
        tracing::info!("BankID challenge created, valid for {:?}", timeout);

        Ok(Challenge {
            qr_payload: start.qr_code,
            poll_url: start.next_poll_url,
            auth_code: start.code,
            code_verifier: pkce.verifier,
            created_at,
            expires_at: created_at
                + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero()),
            deadline: Instant::now() + timeout,
        })
    }

    /// Wait for the user to resolve `challenge`, then open a session.
    ///
    /// Fails with [`Error::AuthExpired`] once the challenge deadline passes,
    /// [`Error::AuthDenied`] when the user or the identity provider refuses,
    /// and with the last poll error after `max_poll_retries` consecutive
    /// failed polls.
    pub async fn await_resolution(&self, challenge: Challenge) -> Result<Session> {
        let mut failures = 0u32;

        loop {
            let wake = (Instant::now() + self.config.poll_interval).min(challenge.deadline);
            tokio::time::sleep_until(wake).await;

            if challenge.is_expired() {
                tracing::warn!("BankID challenge expired");
                return Err(Error::AuthExpired);
            }

            match self.api.poll(&challenge.poll_url).await {
                Ok(PollState::Pending) => failures = 0,
                Ok(PollState::Complete) => break,
                Ok(PollState::Expired) => return Err(Error::AuthExpired),
                Ok(PollState::Failed(status)) => {
                    tracing::warn!("BankID authentication failed: {}", status);
                    return Err(Error::AuthDenied(status));
                }
                Err(e) if !e.is_fatal() && failures < self.config.max_poll_retries => {
                    failures += 1;
                    tracing::warn!(
                        "Challenge poll failed ({}/{}): {}",
                        failures,
                        self.config.max_poll_retries,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("BankID authentication successful");
        self.open_session(&challenge).await
    }

    async fn open_session(&self, challenge: &Challenge) -> Result<Session> {
        let grant = self
            .api
            .exchange(&challenge.auth_code, &challenge.code_verifier)
            .await?;
        let claims = decode_id_token(&grant.id_token)?;

        let actor_key = claims
            .kivra_user_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Protocol("id_token carries no kivra_user_id".into()))?;
        let expires_at = claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0));

        Ok(Session::new(grant.access_token, actor_key, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{AuthStart, TokenGrant};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn id_token(claims: &serde_json::Value) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    struct ScriptedApi {
        polls: Mutex<VecDeque<Result<PollState>>>,
        poll_count: AtomicU32,
        claims: serde_json::Value,
    }

    impl ScriptedApi {
        fn new(polls: Vec<Result<PollState>>) -> Arc<Self> {
            Arc::new(Self {
                polls: Mutex::new(polls.into()),
                poll_count: AtomicU32::new(0),
                claims: serde_json::json!({"kivra_user_id": "1234", "exp": 1_900_000_000}),
            })
        }
    }

    impl AuthApi for ScriptedApi {
        async fn authorize(&self, code_challenge: &str) -> Result<AuthStart> {
            assert_eq!(code_challenge.len(), 43);
            Ok(AuthStart {
                qr_code: "bankid.token.0.secret".into(),
                next_poll_url: "/v2/oauth2/authorize/abc".into(),
                code: "code-1".into(),
            })
        }

        async fn poll(&self, _poll_url: &str) -> Result<PollState> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PollState::Pending))
        }

        async fn exchange(&self, code: &str, code_verifier: &str) -> Result<TokenGrant> {
            assert_eq!(code, "code-1");
            assert!(!code_verifier.is_empty());
            Ok(TokenGrant {
                access_token: "access".into(),
                id_token: id_token(&self.claims),
            })
        }
    }

    fn config() -> AuthConfig {
        AuthConfig {
            poll_interval: Duration::from_secs(2),
            challenge_timeout: Duration::from_secs(20),
            max_poll_retries: 2,
        }
    }

    #[test]
    fn test_pkce_challenge_is_s256_of_verifier() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 43);
        assert_eq!(
            pkce.challenge,
            URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()))
        );
        assert_ne!(pkce.verifier, Pkce::generate().verifier);
    }

    #[test]
    fn test_decode_id_token() {
        let token = id_token(&serde_json::json!({"kivra_user_id": "42", "exp": 1_700_000_000}));
        let claims = decode_id_token(&token).unwrap();
        assert_eq!(claims.kivra_user_id.as_deref(), Some("42"));
        assert_eq!(claims.exp, Some(1_700_000_000));

        assert!(matches!(decode_id_token("nodots"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let session = Session::new("super-secret", "42", None);
        let out = format!("{session:?}");
        assert!(!out.contains("super-secret"));
        assert!(out.contains("42"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_after_pending_polls() {
        let api = ScriptedApi::new(vec![
            Ok(PollState::Pending),
            Ok(PollState::Pending),
            Ok(PollState::Complete),
        ]);
        let auth = Authenticator::new(Arc::clone(&api), config());

        let challenge = auth.begin_challenge().await.unwrap();
        assert_eq!(challenge.qr_payload(), "bankid.token.0.secret");
        assert!(!format!("{challenge:?}").contains("secret"));

        let session = auth.await_resolution(challenge).await.unwrap();
        assert_eq!(session.actor_key(), "1234");
        assert_eq!(session.access_token(), "access");
        assert!(session.expires_at().is_some());
        assert_eq!(api.poll_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_at_deadline() {
        let api = ScriptedApi::new(vec![]);
        let auth = Authenticator::new(Arc::clone(&api), config());

        let challenge = auth.begin_challenge().await.unwrap();
        let started = Instant::now();
        let err = auth.await_resolution(challenge).await.unwrap_err();

        assert!(matches!(err, Error::AuthExpired));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(21));
        assert!(api.poll_count.load(Ordering::SeqCst) <= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_expiry_and_denial() {
        let auth = Authenticator::new(ScriptedApi::new(vec![Ok(PollState::Expired)]), config());
        let challenge = auth.begin_challenge().await.unwrap();
        assert!(matches!(
            auth.await_resolution(challenge).await,
            Err(Error::AuthExpired)
        ));

        let auth = Authenticator::new(
            ScriptedApi::new(vec![Ok(PollState::Failed("user_cancel".into()))]),
            config(),
        );
        let challenge = auth.begin_challenge().await.unwrap();
        assert!(matches!(
            auth.await_resolution(challenge).await,
            Err(Error::AuthDenied(ref s)) if s == "user_cancel"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tolerates_bounded_poll_failures() {
        let api = ScriptedApi::new(vec![
            Err(Error::TransientNetwork("reset".into())),
            Err(Error::TransientNetwork("reset".into())),
            Ok(PollState::Complete),
        ]);
        let auth = Authenticator::new(api, config());
        let challenge = auth.begin_challenge().await.unwrap();
        assert!(auth.await_resolution(challenge).await.is_ok());

        let api = ScriptedApi::new(vec![
            Err(Error::TransientNetwork("one".into())),
            Err(Error::TransientNetwork("two".into())),
            Err(Error::TransientNetwork("three".into())),
        ]);
        let auth = Authenticator::new(api, config());
        let challenge = auth.begin_challenge().await.unwrap();
        assert!(matches!(
            auth.await_resolution(challenge).await,
            Err(Error::TransientNetwork(ref m)) if m == "three"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_user_id_is_protocol_error() {
        let api = Arc::new(ScriptedApi {
            polls: Mutex::new(vec![Ok(PollState::Complete)].into()),
            poll_count: AtomicU32::new(0),
            claims: serde_json::json!({"sub": "x"}),
        });
        let auth = Authenticator::new(api, config());
        let challenge = auth.begin_challenge().await.unwrap();
        assert!(matches!(
            auth.await_resolution(challenge).await,
            Err(Error::Protocol(_))
        ));
    }
}
