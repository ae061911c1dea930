use regex::Regex;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use crate::infrastructure::providers::SmtpConfig;
use crate::infrastructure::workers::WorkerSettings;

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` keeps the queue in memory.
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_port: u16,
    pub send_timeout: Duration,
    pub worker: WorkerSettings,
    pub telegram_bot_token: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub team_chat_webhook_url: Option<String>,
    pub webhook_signing_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort("SERVER_PORT".to_string()))?;

        let metrics_port = env::var("METRICS_PORT")
            .unwrap_or_else(|_| "9000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort("METRICS_PORT".to_string()))?;

        let defaults = WorkerSettings::default();
        let worker = WorkerSettings {
            batch_size: nonzero_number(
                "WORKER_BATCH_SIZE",
                env_number("WORKER_BATCH_SIZE", defaults.batch_size)?,
            )?,
            poll_interval: env_interval("WORKER_POLL_INTERVAL", defaults.poll_interval)?,
            retry_interval: env_interval("WORKER_RETRY_INTERVAL", defaults.retry_interval)?,
            maintenance_interval: env_interval(
                "WORKER_MAINTENANCE_INTERVAL",
                defaults.maintenance_interval,
            )?,
            delivered_retention: env_duration("DELIVERED_RETENTION", defaults.delivered_retention)?,
            processing_lock_timeout: env_interval(
                "PROCESSING_LOCK_TIMEOUT",
                defaults.processing_lock_timeout,
            )?,
            rate_limit_entry_ttl: env_duration("RATE_LIMIT_ENTRY_TTL", defaults.rate_limit_entry_ttl)?,
        };

        let smtp = match non_empty("SMTP_HOST") {
            Some(host) => {
                let port = env_number("SMTP_PORT", 587u16)?;
                Some(SmtpConfig {
                    host,
                    port,
                    username: non_empty("SMTP_USERNAME"),
                    password: non_empty("SMTP_PASSWORD"),
                    from_address: non_empty("SMTP_FROM")
                        .ok_or(ConfigError::MissingVar("SMTP_FROM"))?,
                    // implicit TLS on 465, STARTTLS otherwise
                    use_tls: port == 465,
                })
            }
            None => None,
        };

        Ok(Config {
            database_url: non_empty("DATABASE_URL"),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port,
            otel_exporter_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "notifier".to_string()),
            metrics_port,
            send_timeout: env_interval("SEND_TIMEOUT", Duration::from_secs(30))?,
            worker,
            telegram_bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            smtp,
            team_chat_webhook_url: non_empty("TEAM_CHAT_WEBHOOK_URL"),
            webhook_signing_secret: non_empty("WEBHOOK_SIGNING_SECRET"),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(key, raw)),
        None => Ok(default),
    }
}

fn env_duration(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    duration_value(key, non_empty(key), default)
}

/// Like `env_duration`, for settings that drive timers and must not be zero.
fn env_interval(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    nonzero_duration(key, env_duration(key, default)?)
}

fn duration_value(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => parse_duration(&raw).ok_or(ConfigError::InvalidDuration(key, raw)),
        None => Ok(default),
    }
}

fn nonzero_duration(key: &'static str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::MustBePositive(key));
    }
    Ok(value)
}

fn nonzero_number(key: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::MustBePositive(key));
    }
    Ok(value)
}

/// Parses `500ms`, `30s`, `5m`, `2h`, `7d`; a bare number means seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*(ms|s|m|h|d)?\s*$").expect("duration pattern is valid")
    });

    let captures = pattern.captures(raw)?;
    let value: u64 = captures.get(1)?.as_str().parse().ok()?;
    let duration = match captures.get(2).map(|m| m.as_str()) {
        Some("ms") => Duration::from_millis(value),
        Some("s") | None => Duration::from_secs(value),
        Some("m") => Duration::from_secs(value.checked_mul(60)?),
        Some("h") => Duration::from_secs(value.checked_mul(3600)?),
        Some("d") => Duration::from_secs(value.checked_mul(86_400)?),
        Some(_) => return None,
    };
    Some(duration)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number in {0}")]
    InvalidPort(String),

    #[error("{0} must be a number, got {1:?}")]
    InvalidNumber(&'static str, String),

    #[error("{0} must be a duration like 30s, 5m or 1h, got {1:?}")]
    InvalidDuration(&'static str, String),

    #[error("{0} environment variable not set")]
    MissingVar(&'static str),

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}
