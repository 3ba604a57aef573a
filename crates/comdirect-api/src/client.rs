//! Shared HTTP plumbing for the endpoint modules.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ApiError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.comdirect.de/api/";
pub const DEFAULT_OAUTH_URL: &str = "https://api.comdirect.de/oauth/token";

/// Header carrying the client session and request ids on every call.
pub const REQUEST_INFO_HEADER: &str = "x-http-request-info";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in [`ApiError::Status`] messages.
const MAX_ERROR_BODY_LEN: usize = 256;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Bearer token and client session id attached to an authorized call.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    pub access_token: &'a str,
    pub session_id: &'a str,
}

impl std::fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("access_token", &"<redacted>")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ComdirectClient {
    http: Client,
    api_base: Url,
    oauth_url: Url,
}

impl ComdirectClient {
    pub fn new(api_base: &str, oauth_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        install_rustls_provider();
        let http = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;
        Self::with_http_client(http, api_base, oauth_url)
    }

    pub fn with_http_client(http: Client, api_base: &str, oauth_url: &str) -> Result<Self, ApiError> {
        let mut api_base = Url::parse(api_base)?;
        // `Url::join` drops the last path segment unless the base ends with a slash.
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self {
            http,
            api_base,
            oauth_url: Url::parse(oauth_url)?,
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn oauth_url(&self) -> &Url {
        &self.oauth_url
    }

    /// Resolve a path relative to the API base.
    ///
    /// Absolute paths (as returned in `link.href` fields) replace the base path.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.api_base.join(path)?)
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    pub(crate) fn endpoint_segments(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Parse(format!("API base {} cannot be a base", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach bearer auth and the request-info header.
    pub(crate) fn authorized(&self, builder: RequestBuilder, ctx: RequestContext<'_>) -> RequestBuilder {
        builder
            .bearer_auth(ctx.access_token)
            .header(ACCEPT, "application/json")
            .header(REQUEST_INFO_HEADER, request_info(ctx.session_id, &new_request_id()))
    }
}

/// Value of the `x-http-request-info` header.
pub fn request_info(session_id: &str, request_id: &str) -> String {
    serde_json::json!({
        "clientRequestId": {
            "sessionId": session_id,
            "requestId": request_id,
        }
    })
    .to_string()
}

/// Nine-digit request id derived from the current time of day (`HHMMSSmmm`).
pub fn new_request_id() -> String {
    chrono::Utc::now().format("%H%M%S%3f").to_string()
}

/// Turn a non-success response into [`ApiError::Status`].
pub(crate) async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(ApiError::Status {
        status: status.as_u16(),
        message: error_message(&body),
        retry_after,
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = check_status(response).await?.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))
}

/// Extract a readable message from an error body.
///
/// The OAuth endpoint answers with `error_description`, the REST endpoints
/// with a `messages` array.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(desc) = value.get("error_description").and_then(|v| v.as_str()) {
            return desc.to_string();
        }
        if let Some(msg) = value
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(code) = value.get("code").and_then(|v| v.as_str()) {
            return code.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_LEN).collect()
}
