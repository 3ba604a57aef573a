//! Session TAN endpoints.
//!
//! After the password grant the client session must be validated, which
//! issues a challenge (preferably a push-TAN approved in the banking app).
//! Once the challenge is approved the session is activated with a PATCH that
//! references the challenge id.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ComdirectClient, RequestContext, check_status, read_json};
use crate::error::ApiError;

/// Response/request header describing the challenge.
pub const AUTHENTICATION_INFO_HEADER: &str = "x-once-authentication-info";

/// Challenge type asked for on validation.
pub const PUSH_TAN: &str = "P_TAN_PUSH";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub identifier: String,
    #[serde(rename = "sessionTanActive")]
    pub session_tan_active: bool,
    #[serde(rename = "activated2FA")]
    pub activated_2fa: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub rel: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

/// Parsed `x-once-authentication-info` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationInfo {
    pub id: String,
    #[serde(default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub available_types: Vec<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub link: Option<Link>,
}

impl AuthenticationInfo {
    pub fn from_header(value: &str) -> Result<Self, ApiError> {
        serde_json::from_str(value)
            .map_err(|e| ApiError::Parse(format!("invalid {AUTHENTICATION_INFO_HEADER} header: {e}")))
    }

    pub fn is_push_tan(&self) -> bool {
        self.typ.as_deref() == Some(PUSH_TAN)
    }
}

/// Challenge state reported by the authentication status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationState {
    Pending,
    Authenticated,
    Rejected,
    Expired,
    Unknown(String),
}

impl AuthenticationState {
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "AUTHENTICATED" => Self::Authenticated,
            "REJECTED" | "DECLINED" | "CANCELED" | "CANCELLED" => Self::Rejected,
            "EXPIRED" | "TIMEOUT" => Self::Expired,
            _ => Self::Unknown(status.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthenticationStatusBody {
    status: String,
}

/// A validated session together with the challenge it issued.
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub session: SessionStatus,
    pub authentication: AuthenticationInfo,
}

pub async fn session_status(
    client: &ComdirectClient,
    ctx: RequestContext<'_>,
) -> Result<Vec<SessionStatus>, ApiError> {
    let url = client.endpoint("session/clients/user/v1/sessions")?;
    let response = client
        .authorized(client.http().get(url), ctx)
        .send()
        .await?;
    read_json(response).await
}

/// Request the session TAN challenge for `session`.
pub async fn validate_session(
    client: &ComdirectClient,
    ctx: RequestContext<'_>,
    session: &SessionStatus,
) -> Result<ValidatedSession, ApiError> {
    let url = client.endpoint_segments(&[
        "session",
        "clients",
        "user",
        "v1",
        "sessions",
        &session.identifier,
        "validate",
    ])?;
    let body = SessionStatus {
        identifier: session.identifier.clone(),
        session_tan_active: true,
        activated_2fa: true,
    };

    let response = client
        .authorized(client.http().post(url), ctx)
        .header(
            AUTHENTICATION_INFO_HEADER,
            serde_json::json!({ "typ": PUSH_TAN }).to_string(),
        )
        .json(&body)
        .send()
        .await?;
    let response = check_status(response).await?;

    let header = response
        .headers()
        .get(AUTHENTICATION_INFO_HEADER)
        .ok_or_else(|| ApiError::Parse(format!("missing {AUTHENTICATION_INFO_HEADER} header")))?
        .to_str()
        .map_err(|e| ApiError::Parse(e.to_string()))?
        .to_string();
    let authentication = AuthenticationInfo::from_header(&header)?;
    let session: SessionStatus = read_json(response).await?;

    debug!(
        challenge_id = %authentication.id,
        typ = ?authentication.typ,
        "session validation issued challenge"
    );
    Ok(ValidatedSession {
        session,
        authentication,
    })
}

/// Poll the state of a challenge through the status link it was issued with.
pub async fn authentication_status(
    client: &ComdirectClient,
    ctx: RequestContext<'_>,
    authentication: &AuthenticationInfo,
) -> Result<AuthenticationState, ApiError> {
    let link = authentication
        .link
        .as_ref()
        .ok_or_else(|| ApiError::Parse("challenge has no status link".to_string()))?;
    let url = client.endpoint(&link.href)?;

    let response = client
        .authorized(client.http().get(url), ctx)
        .send()
        .await?;
    let body: AuthenticationStatusBody = read_json(response).await?;
    Ok(AuthenticationState::parse(&body.status))
}

/// Activate the session TAN once the challenge has been approved.
pub async fn activate_session(
    client: &ComdirectClient,
    ctx: RequestContext<'_>,
    session: &SessionStatus,
    authentication: &AuthenticationInfo,
) -> Result<SessionStatus, ApiError> {
    let url = client.endpoint_segments(&[
        "session",
        "clients",
        "user",
        "v1",
        "sessions",
        &session.identifier,
    ])?;
    let body = SessionStatus {
        identifier: session.identifier.clone(),
        session_tan_active: true,
        activated_2fa: true,
    };

    let response = client
        .authorized(client.http().patch(url), ctx)
        .header(
            AUTHENTICATION_INFO_HEADER,
            serde_json::json!({ "id": authentication.id }).to_string(),
        )
        .json(&body)
        .send()
        .await?;
    read_json(response).await
}
