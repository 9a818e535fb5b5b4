//! Runtime configuration from `RIDEBOT_*` environment variables

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("RIDEBOT_BOT_TOKEN is not set")]
    MissingToken,
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub api_url: String,
    pub db_path: String,
    pub port: u16,
    /// Path segment and header secret guarding the webhook
    pub webhook_secret: Option<String>,
    /// When set, the webhook is registered at `<public_url>/webhook/<secret>` on startup
    pub public_url: Option<String>,
    pub transport_timeout: Duration,
    pub route_timeout: Duration,
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bot_token = var("RIDEBOT_BOT_TOKEN").ok_or(ConfigError::MissingToken)?;
        let db_path = var("RIDEBOT_DB_PATH").unwrap_or_else(|| {
            let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.ridebot/ridebot.db")
        });

        Ok(Self {
            bot_token,
            api_url: var("RIDEBOT_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            db_path,
            port: parse_or("RIDEBOT_PORT", var("RIDEBOT_PORT"), 8000)?,
            webhook_secret: var("RIDEBOT_WEBHOOK_SECRET"),
            public_url: var("RIDEBOT_PUBLIC_URL").map(|url| url.trim_end_matches('/').to_string()),
            transport_timeout: Duration::from_secs(parse_or(
                "RIDEBOT_TRANSPORT_TIMEOUT_SECS",
                var("RIDEBOT_TRANSPORT_TIMEOUT_SECS"),
                10,
            )?),
            route_timeout: Duration::from_secs(parse_or(
                "RIDEBOT_ROUTE_TIMEOUT_SECS",
                var("RIDEBOT_ROUTE_TIMEOUT_SECS"),
                8,
            )?),
            session_ttl: session_ttl(var("RIDEBOT_SESSION_TTL_MINS"))?,
        })
    }

    /// Path segment of the webhook route; `-` when no secret is configured
    pub fn webhook_path_secret(&self) -> &str {
        self.webhook_secret.as_deref().unwrap_or("-")
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{base}/webhook/{}", self.webhook_path_secret()))
    }
}

fn session_ttl(raw: Option<String>) -> Result<Duration, ConfigError> {
    const NAME: &str = "RIDEBOT_SESSION_TTL_MINS";
    let minutes: u64 = parse_or(NAME, raw.clone(), 60)?;
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Invalid {
            name: NAME,
            value: raw.unwrap_or_default(),
        })
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("RIDEBOT_BOT_TOKEN", "123:abc"), ("HOME", "/home/rider")]).unwrap();
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.db_path, "/home/rider/.ridebot/ridebot.db");
        assert_eq!(config.port, 8000);
        assert_eq!(config.transport_timeout, Duration::from_secs(10));
        assert_eq!(config.route_timeout, Duration::from_secs(8));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.webhook_secret, None);
        assert_eq!(config.webhook_url(), None);
    }

    #[test]
    fn test_missing_token() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::MissingToken);
        assert_eq!(
            config(&[("RIDEBOT_BOT_TOKEN", "  ")]).unwrap_err(),
            ConfigError::MissingToken
        );
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("RIDEBOT_BOT_TOKEN", "t"),
            ("RIDEBOT_API_URL", "http://localhost:8081/"),
            ("RIDEBOT_DB_PATH", "/data/rides.db"),
            ("RIDEBOT_PORT", "9000"),
            ("RIDEBOT_WEBHOOK_SECRET", "s3cret"),
            ("RIDEBOT_PUBLIC_URL", "https://rides.example.org/"),
            ("RIDEBOT_SESSION_TTL_MINS", "15"),
        ])
        .unwrap();
        assert_eq!(config.api_url, "http://localhost:8081");
        assert_eq!(config.db_path, "/data/rides.db");
        assert_eq!(config.port, 9000);
        assert_eq!(config.session_ttl, Duration::from_secs(900));
        assert_eq!(
            config.webhook_url().as_deref(),
            Some("https://rides.example.org/webhook/s3cret")
        );
    }

    #[test]
    fn test_huge_session_ttl_is_rejected() {
        let huge = u64::MAX.to_string();
        let err = config(&[("RIDEBOT_BOT_TOKEN", "t"), ("RIDEBOT_SESSION_TTL_MINS", &huge)])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "RIDEBOT_SESSION_TTL_MINS",
                value: huge
            }
        );
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = config(&[("RIDEBOT_BOT_TOKEN", "t"), ("RIDEBOT_PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "RIDEBOT_PORT",
                value: "eighty".to_string()
            }
        );
    }
}
