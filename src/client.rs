use std::env;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::ChatApi;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUESTS, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS};
use crate::types::{ChatReply, ChatRequest, HistoryEntry, SessionId, SessionInfo, UsageStats};

/// Base URL used when neither an explicit URL nor `CHATLINE_BASE_URL` is provided.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/";
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the chat-session HTTP API.
///
/// The server identifies the user and the active session through a cookie, so every request
/// goes through one cookie-carrying `reqwest::Client`.  Cloning the client shares that jar.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl ChatClient {
    /// Create a new client.
    ///
    /// The base URL can be provided directly or read from the CHATLINE_BASE_URL environment
    /// variable; it falls back to [`DEFAULT_BASE_URL`].
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = match base_url {
            Some(url) => url,
            None => env::var("CHATLINE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };
        let base_url = normalize_base_url(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .cookie_store(true)
            .default_headers(Self::default_headers())
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create and return default headers for API requests.
    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Resolve an API path against the base URL.
    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a request, mapping transport failures and non-2xx statuses to our Error type.
    async fn execute(&self, what: &str, request: RequestBuilder) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = request.send().await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            tracing::debug!(request = what, error = %e, "request failed before a response");
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {}", e),
                    Some(self.timeout.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
            }
        })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::debug!(request = what, error = %err, "server returned an error status");
            return Err(err);
        }
        Ok(response)
    }

    /// Send a request and decode its JSON body.
    async fn execute_json<T: DeserializeOwned>(
        &self,
        what: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = self.execute(what, request).await?;
        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse {} response: {}", what, e),
                Some(Box::new(e)),
            )
        })
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let resource_id = response
            .url()
            .path_segments()
            .and_then(|segments| {
                segments
                    .filter(|segment| segment.parse::<u64>().is_ok())
                    .last()
            })
            .map(String::from);

        match response.text().await {
            Ok(body) => map_status(status_code, &body, resource_id),
            Err(e) => Error::http_client(
                format!("Failed to read error response: {}", e),
                Some(Box::new(e)),
            ),
        }
    }

    /// Send a chat message and get the assistant's reply.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let url = self.endpoint("api/chat")?;
        self.execute_json("chat", self.client.post(url).json(request))
            .await
    }

    /// Probe the server; any 2xx status counts as reachable.
    pub async fn health(&self) -> Result<()> {
        let url = self.endpoint("api/health")?;
        self.execute("health", self.client.get(url)).await?;
        Ok(())
    }

    /// Fetch the transcript of the server's current session.
    pub async fn history(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
        #[derive(Deserialize)]
        struct HistoryResponse {
            #[serde(default)]
            history: Vec<HistoryEntry>,
        }

        let mut url = self.endpoint("api/history")?;
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        let response: HistoryResponse = self
            .execute_json("history", self.client.get(url))
            .await?;
        Ok(response.history)
    }

    /// Ask the server which session it considers active.
    pub async fn current_session(&self) -> Result<Option<SessionId>> {
        #[derive(Deserialize)]
        struct CurrentSessionResponse {
            #[serde(default)]
            session_id: Option<SessionId>,
        }

        let url = self.endpoint("api/current-session")?;
        let response: CurrentSessionResponse = self
            .execute_json("current-session", self.client.get(url))
            .await?;
        Ok(response.session_id)
    }

    /// List the user's sessions, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        #[derive(Deserialize)]
        struct SessionsResponse {
            #[serde(default)]
            sessions: Vec<SessionInfo>,
        }

        let url = self.endpoint("api/sessions")?;
        let response: SessionsResponse = self
            .execute_json("sessions", self.client.get(url))
            .await?;
        Ok(response.sessions)
    }

    /// Create a session.  The server does not switch to it.
    pub async fn create_session(&self, name: &str) -> Result<SessionId> {
        #[derive(Deserialize)]
        struct CreateSessionResponse {
            session_id: SessionId,
        }

        let url = self.endpoint("api/sessions")?;
        let body = serde_json::json!({ "name": name });
        let response: CreateSessionResponse = self
            .execute_json("create-session", self.client.post(url).json(&body))
            .await?;
        Ok(response.session_id)
    }

    /// Make `id` the server's active session.
    pub async fn switch_session(&self, id: SessionId) -> Result<()> {
        let url = self.endpoint(&format!("api/sessions/{id}/switch"))?;
        self.execute("switch-session", self.client.post(url)).await?;
        Ok(())
    }

    /// Rename a session.
    pub async fn rename_session(&self, id: SessionId, name: &str) -> Result<()> {
        let url = self.endpoint(&format!("api/sessions/{id}/rename"))?;
        let body = serde_json::json!({ "name": name });
        self.execute("rename-session", self.client.put(url).json(&body))
            .await?;
        Ok(())
    }

    /// Delete a session.
    pub async fn delete_session(&self, id: SessionId) -> Result<()> {
        let url = self.endpoint(&format!("api/sessions/{id}"))?;
        self.execute("delete-session", self.client.delete(url))
            .await?;
        Ok(())
    }

    /// Fetch usage counters.
    pub async fn stats(&self) -> Result<UsageStats> {
        let url = self.endpoint("api/stats")?;
        self.execute_json("stats", self.client.get(url)).await
    }
}

#[async_trait::async_trait]
impl ChatApi for ChatClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        ChatClient::chat(self, request).await
    }

    async fn health(&self) -> Result<()> {
        ChatClient::health(self).await
    }

    async fn history(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
        ChatClient::history(self, limit).await
    }

    async fn current_session(&self) -> Result<Option<SessionId>> {
        ChatClient::current_session(self).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        ChatClient::list_sessions(self).await
    }

    async fn create_session(&self, name: &str) -> Result<SessionId> {
        ChatClient::create_session(self, name).await
    }

    async fn switch_session(&self, id: SessionId) -> Result<()> {
        ChatClient::switch_session(self, id).await
    }

    async fn rename_session(&self, id: SessionId, name: &str) -> Result<()> {
        ChatClient::rename_session(self, id, name).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<()> {
        ChatClient::delete_session(self, id).await
    }

    async fn stats(&self) -> Result<UsageStats> {
        ChatClient::stats(self).await
    }
}

/// Parse a base URL, making sure it ends in `/` so relative joins keep its path.
fn normalize_base_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let mut url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(Error::url(
            format!("{raw} cannot be used as a base URL"),
            None,
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Map an error status and its body to an [`Error`].
///
/// Bodies of the form `{"error": "..."}` surface their message; anything else surfaces verbatim.
/// Every status maps to a server error, 408 included: a response arrived.
fn map_status(status_code: u16, body: &str, resource_id: Option<String>) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<String>,
    }

    let error_message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_else(|| body.to_string());

    match status_code {
        400 => Error::bad_request(error_message),
        404 => Error::not_found(error_message, resource_id),
        500 => Error::internal_server(error_message),
        502..=504 => Error::service_unavailable(error_message),
        _ => Error::api(status_code, error_message),
    }
}
