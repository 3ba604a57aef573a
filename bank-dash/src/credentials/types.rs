use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Long-lived login material for one user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Local profile id, the key under which everything is stored.
    pub user_id: String,
    /// Bank login name (customer/access number).
    pub username: String,
    /// Online banking PIN.
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    /// Check that every field is filled.
    pub fn validate(&self) -> crate::Result<()> {
        let fields = [
            ("user_id", &self.user_id),
            ("username", &self.username),
            ("password", &self.password),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(crate::Error::validation(format!(
                    "credential field '{name}' is empty"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Refresh material recorded after every successful grant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshState {
    /// Local session the refresh token belongs to.
    pub session_id: String,
    pub refresh_token: String,
    /// Expiry of the access token issued together with the refresh token.
    pub access_expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshState")
            .field("session_id", &self.session_id)
            .field("refresh_token", &"<redacted>")
            .field("access_expires_at", &self.access_expires_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
