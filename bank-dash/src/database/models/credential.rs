use sqlx::FromRow;

use crate::credentials::{Credentials, RefreshState};
use crate::database::time::{datetime_to_ms, ms_to_datetime};

#[derive(Clone, FromRow)]
pub struct BankCredentialDbModel {
    pub user_id: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<BankCredentialDbModel> for Credentials {
    fn from(row: BankCredentialDbModel) -> Self {
        Self {
            user_id: row.user_id,
            username: row.username,
            password: row.password,
            client_id: row.client_id,
            client_secret: row.client_secret,
        }
    }
}

#[derive(Clone, FromRow)]
pub struct RefreshStateDbModel {
    pub user_id: String,
    pub session_id: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub updated_at: i64,
}

impl RefreshStateDbModel {
    pub fn from_state(user_id: &str, state: &RefreshState) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: state.session_id.clone(),
            refresh_token: state.refresh_token.clone(),
            access_expires_at: datetime_to_ms(state.access_expires_at),
            updated_at: datetime_to_ms(state.updated_at),
        }
    }
}

impl From<RefreshStateDbModel> for RefreshState {
    fn from(row: RefreshStateDbModel) -> Self {
        Self {
            session_id: row.session_id,
            refresh_token: row.refresh_token,
            access_expires_at: ms_to_datetime(row.access_expires_at),
            updated_at: ms_to_datetime(row.updated_at),
        }
    }
}
