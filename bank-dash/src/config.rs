//! Application configuration from environment variables.
//!
//! Every value has a default. Numeric values that do not parse are reported
//! as [`Error::Configuration`] naming the variable.

use std::str::FromStr;
use std::time::Duration;

use comdirect_api::{DEFAULT_API_BASE_URL, DEFAULT_OAUTH_URL};

use crate::credentials::Credentials;
use crate::session::{HandshakeConfig, RenewalConfig, RetryPolicy};
use crate::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite:bank-dash.db?mode=rwc";
const DEFAULT_USER_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComdirectConfig {
    pub api_base_url: String,
    pub oauth_url: String,
    pub request_timeout: Duration,
}

impl Default for ComdirectConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Handshake and renewal timings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub handshake: HandshakeConfig,
    pub renewal: RenewalConfig,
}

/// Staleness windows of the repository caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub balances_max_staleness: Duration,
    pub transactions_max_staleness: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            balances_max_staleness: Duration::from_secs(300),
            transactions_max_staleness: Duration::from_secs(900),
        }
    }
}

/// Background refresh job settings. The job is off without an interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshJobConfig {
    pub interval: Option<Duration>,
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub dir: Option<String>,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub user_id: String,
    pub comdirect: ComdirectConfig,
    pub session: SessionConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub refresh_job: RefreshJobConfig,
    pub logging: LoggingConfig,
    /// Login material from the environment, seeded into the credential store.
    pub credentials: Option<Credentials>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            comdirect: ComdirectConfig::default(),
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            refresh_job: RefreshJobConfig::default(),
            logging: LoggingConfig::default(),
            credentials: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(url) = env.string("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(user_id) = env.string("BANK_USER_ID") {
            config.user_id = user_id;
        }

        if let Some(url) = env.string("BANK_API_BASE_URL") {
            config.comdirect.api_base_url = url;
        }
        if let Some(url) = env.string("BANK_OAUTH_URL") {
            config.comdirect.oauth_url = url;
        }
        if let Some(secs) = env.parse::<u64>("BANK_REQUEST_TIMEOUT_SECS")? {
            config.comdirect.request_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env.parse::<u64>("BANK_TOKEN_SAFETY_MARGIN_SECS")? {
            config.session.renewal.safety_margin = Duration::from_secs(secs);
        }
        if let Some(secs) = env.parse::<u64>("BANK_CHALLENGE_POLL_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(Error::config(
                    "BANK_CHALLENGE_POLL_INTERVAL_SECS must be greater than zero",
                ));
            }
            config.session.handshake.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env.parse::<u64>("BANK_CHALLENGE_MAX_WAIT_SECS")? {
            config.session.handshake.max_challenge_wait = Duration::from_secs(secs);
        }

        if let Some(retries) = env.parse::<u32>("BANK_RETRY_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }
        if let Some(ms) = env.parse::<u64>("BANK_RETRY_INITIAL_DELAY_MS")? {
            config.retry.initial_delay_ms = ms;
        }

        if let Some(secs) = env.parse::<u64>("BANK_BALANCES_MAX_STALENESS_SECS")? {
            config.cache.balances_max_staleness = Duration::from_secs(secs);
        }
        if let Some(secs) = env.parse::<u64>("BANK_TRANSACTIONS_MAX_STALENESS_SECS")? {
            config.cache.transactions_max_staleness = Duration::from_secs(secs);
        }

        if let Some(mins) = env.parse::<u64>("BANK_REFRESH_INTERVAL_MINS")?
            && mins > 0
        {
            let secs = mins.checked_mul(60).ok_or_else(|| {
                Error::config(format!("BANK_REFRESH_INTERVAL_MINS is out of range: {mins}"))
            })?;
            config.refresh_job.interval = Some(Duration::from_secs(secs));
        }
        if let Some(accounts) = env.string("BANK_REFRESH_ACCOUNTS") {
            config.refresh_job.accounts = accounts
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.logging.dir = env.string("BANK_LOG_DIR");
        config.logging.json = env
            .string("BANK_LOG_FORMAT")
            .is_some_and(|f| f.eq_ignore_ascii_case("json"));

        config.credentials = match (
            env.string("BANK_USERNAME"),
            env.string("BANK_PIN"),
            env.string("BANK_CLIENT_ID"),
            env.string("BANK_CLIENT_SECRET"),
        ) {
            (Some(username), Some(password), Some(client_id), Some(client_secret)) => {
                Some(Credentials {
                    user_id: config.user_id.clone(),
                    username,
                    password,
                    client_id,
                    client_secret,
                })
            }
            (None, None, None, None) => None,
            _ => {
                return Err(Error::config(
                    "BANK_USERNAME, BANK_PIN, BANK_CLIENT_ID and BANK_CLIENT_SECRET must be set together",
                ));
            }
        };

        Ok(config)
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank value of `key`.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| Error::config(format!("{key}: invalid value {raw:?}: {e}"))),
            None => Ok(None),
        }
    }
}
