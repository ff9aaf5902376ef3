//! HTTP client for the Kivra API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::queries;
use super::types::{
    AuthStart, LetterContent, LetterListing, LetterPage, PollResponse, PollState, ReceiptListing,
    TokenGrant,
};
use super::{AuthApi, Mailbox};
use crate::auth::Session;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("kivra-sync/", env!("CARGO_PKG_VERSION"));

/// Where the Kivra service lives.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// REST API base, without trailing slash
    pub api_base: String,
    /// GraphQL endpoint
    pub graphql_url: String,
    /// Web origin presented to the GraphQL endpoint
    pub origin: String,
    /// OAuth2 client id of the web inbox
    pub client_id: String,
    /// OAuth2 redirect URI of the web inbox
    pub redirect_uri: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: "https://app.api.kivra.com".to_string(),
            graphql_url: "https://bff.kivra.com/graphql".to_string(),
            origin: "https://inbox.kivra.com".to_string(),
            client_id: "14085255171411300228f14dceae786da5a00285fe".to_string(),
            redirect_uri: "https://inbox.kivra.com/auth/kivra/return".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at a single base URL.
    #[must_use]
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: base.to_string(),
            graphql_url: format!("{base}/graphql"),
            origin: base.to_string(),
            ..Self::default()
        }
    }
}

/// Kivra API client.
///
/// Every document request is retried on transient failures according to the
/// [`RetryConfig`]. Challenge polls are not; the authenticator owns that policy.
#[derive(Debug, Clone)]
pub struct KivraClient {
    http: Client,
    endpoints: Endpoints,
    retry: RetryConfig,
}

impl KivraClient {
    /// Client for the production service.
    pub fn new(retry: RetryConfig) -> Result<Self> {
        Self::with_endpoints(Endpoints::default(), retry)
    }

    /// Client for a custom set of endpoints.
    pub fn with_endpoints(endpoints: Endpoints, retry: RetryConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoints,
            retry,
        })
    }

    /// The endpoints in use.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.api_base, path)
    }

    async fn send(context: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::from_transport(context, &e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} failed with status {}", context, status);
            return Err(Error::from_status(context, status));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(context: &str, request: RequestBuilder) -> Result<T> {
        Self::send(context, request)
            .await?
            .json()
            .await
            .map_err(|e| Error::from_transport(context, &e))
    }

    async fn send_bytes(context: &str, request: RequestBuilder) -> Result<Vec<u8>> {
        let bytes = Self::send(context, request)
            .await?
            .bytes()
            .await
            .map_err(|e| Error::from_transport(context, &e))?;
        Ok(bytes.to_vec())
    }

    fn token_get(&self, session: &Session, url: &str) -> RequestBuilder {
        self.http
            .get(url)
            .header("Authorization", format!("token {}", session.access_token()))
    }

    async fn graphql(
        &self,
        session: &Session,
        operation: &str,
        query: &str,
        variables: &Value,
    ) -> Result<Value> {
        tracing::debug!("GraphQL query: {}", operation);
        let payload = &json!({
            "operationName": operation,
            "query": query,
            "variables": variables,
        });
        let actor = session.actor_key();

        let data: Value = with_retry(&self.retry, operation, || async move {
            let request = self
                .http
                .post(&self.endpoints.graphql_url)
                .header("Accept", "application/json")
                .header("Origin", &self.endpoints.origin)
                .header("Referer", format!("{}/", self.endpoints.origin))
                .bearer_auth(session.access_token())
                .header("X-Actor-Key", actor)
                .header("X-Actor-Type", "user")
                .header("X-Session-Actor", format!("user_{actor}"))
                .header("X-Kivra-Environment", "production")
                .json(payload);
            Self::send_json(operation, request).await
        })
        .await?;

        if let Some(errors) = data.get("errors") {
            return Err(Error::Protocol(format!(
                "{operation} returned errors: {errors}"
            )));
        }
        Ok(data)
    }
}

impl AuthApi for KivraClient {
    async fn authorize(&self, code_challenge: &str) -> Result<AuthStart> {
        let url = &self.api_url("/v2/oauth2/authorize");
        let body = &json!({
            "response_type": "bankid_all",
            "code_challenge": code_challenge,
            "code_challenge_method": "S256",
            "scope": "openid profile",
            "client_id": self.endpoints.client_id,
            "redirect_uri": self.endpoints.redirect_uri,
        });

        with_retry(&self.retry, "authorize", || async move {
            let request = self
                .http
                .post(url)
                .header("Accept", "application/json")
                .json(body);
            Self::send_json("authorize", request).await
        })
        .await
    }

    async fn poll(&self, poll_url: &str) -> Result<PollState> {
        let request = self
            .http
            .get(self.api_url(poll_url))
            .header("Accept", "application/json");
        let response: PollResponse = Self::send_json("challenge poll", request).await?;
        Ok(PollState::from_status(&response.status))
    }

    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<TokenGrant> {
        let url = &self.api_url("/v2/oauth2/token");
        let body = &json!({
            "grant_type": "authorization_code",
            "code": code,
            "client_id": self.endpoints.client_id,
            "redirect_uri": self.endpoints.redirect_uri,
            "code_verifier": code_verifier,
        });

        with_retry(&self.retry, "token exchange", || async move {
            let request = self.http.post(url).json(body);
            Self::send_json("token exchange", request).await
        })
        .await
    }
}

impl Mailbox for KivraClient {
    async fn list_receipts(&self, session: &Session) -> Result<ReceiptListing> {
        let variables = json!({
            "limit": queries::RECEIPTS_LIMIT,
            "offset": 0,
            "search": null,
        });
        let data = self
            .graphql(session, "Receipts", queries::RECEIPTS, &variables)
            .await?;
        ReceiptListing::from_graphql(&data)
    }

    async fn receipt_details(&self, session: &Session, key: &str) -> Result<Value> {
        let variables = json!({ "key": key });
        let data = self
            .graphql(session, "ReceiptDetails", queries::RECEIPT_DETAILS, &variables)
            .await?;
        Ok(data
            .pointer("/data/receiptV2")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn receipt_pdf(&self, session: &Session, key: &str) -> Result<Vec<u8>> {
        let url = &self.api_url(&format!(
            "/v1/user/{}/receipts/{}",
            session.actor_key(),
            key
        ));

        with_retry(&self.retry, "receipt pdf", || async move {
            let request = self
                .token_get(session, url)
                .header("Accept", "application/pdf");
            Self::send_bytes("receipt pdf", request).await
        })
        .await
    }

    async fn list_letters(&self, session: &Session) -> Result<LetterListing> {
        let mut entries: Vec<Value> = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let variables = json!({
                "after": after,
                "filter": "inbox",
                "senderKey": null,
                "take": queries::LETTERS_PAGE_SIZE,
            });
            let data = self
                .graphql(session, "ContentList", queries::LETTERS, &variables)
                .await?;
            let page = LetterPage::from_graphql(&data)?;

            let next = page
                .items
                .last()
                .and_then(|entry| entry.get("key"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let page_len = page.items.len();
            entries.extend(page.items);

            match next {
                Some(cursor) if page.exists_more && page_len > 0 => {
                    tracing::debug!("Fetched {} letters so far", entries.len());
                    after = Some(cursor);
                }
                _ => break,
            }
        }

        Ok(LetterListing::from_entries(entries))
    }

    async fn letter_content(&self, session: &Session, key: &str) -> Result<LetterContent> {
        let url = &self.api_url(&format!("/v1/content/{key}"));

        let raw: Value = with_retry(&self.retry, "letter details", || async move {
            let request = self
                .token_get(session, url)
                .header("Accept", "application/json");
            Self::send_json("letter details", request).await
        })
        .await?;

        Ok(LetterContent::from_json(raw))
    }

    async fn letter_file(&self, session: &Session, key: &str, file_key: &str) -> Result<Vec<u8>> {
        let url = &self.api_url(&format!("/v1/content/{key}/file/{file_key}/raw"));

        with_retry(&self.retry, "letter file", || async move {
            Self::send_bytes("letter file", self.token_get(session, url)).await
        })
        .await
    }
}
