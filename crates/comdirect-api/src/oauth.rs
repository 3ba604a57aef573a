//! OAuth token endpoint.
//!
//! A full login takes two grants: a `password` grant yielding an unprivileged
//! token, and after the session TAN is activated a `cd_secondary` grant that
//! yields the token usable for banking calls. `refresh_token` renews the latter.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ComdirectClient, read_json};
use crate::error::ApiError;

/// OAuth client registration issued by the bank.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
    /// Customer number, present on grants bound to a customer.
    #[serde(default)]
    pub kdnr: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Resource owner password grant.
pub async fn password_grant(
    client: &ComdirectClient,
    credentials: &ClientCredentials,
    username: &str,
    password: &str,
) -> Result<TokenResponse, ApiError> {
    debug!("requesting primary token");
    token_request(
        client,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ],
    )
    .await
}

/// Exchange a primary token of an activated session for a banking token.
pub async fn secondary_grant(
    client: &ComdirectClient,
    credentials: &ClientCredentials,
    primary_access_token: &str,
) -> Result<TokenResponse, ApiError> {
    debug!("requesting secondary token");
    token_request(
        client,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "cd_secondary"),
            ("token", primary_access_token),
        ],
    )
    .await
}

pub async fn refresh_grant(
    client: &ComdirectClient,
    credentials: &ClientCredentials,
    refresh_token: &str,
) -> Result<TokenResponse, ApiError> {
    debug!("refreshing banking token");
    token_request(
        client,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ],
    )
    .await
}

/// Revoke an access token. The revocation endpoint sits next to the token endpoint.
pub async fn revoke(client: &ComdirectClient, access_token: &str) -> Result<(), ApiError> {
    let url = client.oauth_url().join("revoke")?;
    let response = client
        .http()
        .delete(url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;
    crate::client::check_status(response).await?;
    Ok(())
}

async fn token_request(
    client: &ComdirectClient,
    form: &[(&str, &str)],
) -> Result<TokenResponse, ApiError> {
    let response = client
        .http()
        .post(client.oauth_url().clone())
        .header(reqwest::header::ACCEPT, "application/json")
        .form(form)
        .send()
        .await?;
    read_json(response).await
}
