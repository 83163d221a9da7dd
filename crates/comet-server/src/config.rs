use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use tracing::warn;

use comet_chat::{ApprovalPolicy, ChatConfig, RetryConfig};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub service_token: String,
    pub chat: ChatConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("COMET_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "COMET_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let db_path = PathBuf::from(lookup("COMET_DB_PATH").unwrap_or_else(|| "comet.db".into()));

        let jwt_secret = lookup("COMET_JWT_SECRET").unwrap_or_else(|| {
            warn!("COMET_JWT_SECRET not set, using the development secret");
            DEV_JWT_SECRET.into()
        });

        // Empty token disables the feed routes
        let service_token = lookup("COMET_SERVICE_TOKEN").unwrap_or_default();
        if service_token.is_empty() {
            warn!("COMET_SERVICE_TOKEN not set, match-source and profile feeds are disabled");
        }

        let approval_policy = match lookup("COMET_APPROVAL_POLICY") {
            Some(raw) => raw.parse::<ApprovalPolicy>().map_err(|e| anyhow!(e))?,
            None => ApprovalPolicy::default(),
        };

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: parse_or(&lookup, "COMET_RETRY_ATTEMPTS", defaults.max_attempts)?,
            initial_backoff_ms: parse_or(&lookup, "COMET_RETRY_INITIAL_MS", defaults.initial_backoff_ms)?,
            max_backoff_ms: parse_or(&lookup, "COMET_RETRY_MAX_MS", defaults.max_backoff_ms)?,
            ..defaults
        };

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            service_token,
            chat: ChatConfig {
                approval_policy,
                retry,
            },
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.parse().with_context(|| format!("invalid {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
