//! Configuration, built from environment variables.

use secrecy::SecretString;

use crate::error::ConfigError;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Mailbox monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub account: String,
    pub password: SecretString,
    pub mailbox: String,
    /// Seconds to wait between polls when the mailbox is idle.
    pub poll_interval_secs: u64,
    /// Directory where attachment bytes are persisted.
    pub attachment_dir: std::path::PathBuf,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            imap_host: env_required("IMAP_SERVER")?,
            imap_port: env_or("IMAP_PORT", 993),
            account: env_required("EMAIL_ACCOUNT")?,
            password: SecretString::from(env_required("PASSWORD")?),
            mailbox: env_or("IMAP_MAILBOX", "INBOX".to_string()),
            poll_interval_secs: env_or("POLL_INTERVAL_SECS", 60),
            attachment_dir: env_or("ATTACHMENT_DIR", "attachments".to_string()).into(),
        })
    }
}

/// Email log store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: std::path::PathBuf,
    /// Connection attempts before startup is aborted.
    pub connect_retries: u32,
    /// Fixed backoff between attempts.
    pub connect_backoff_secs: u64,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: env_or("DB_PATH", "./data/email_log.db".to_string()).into(),
            connect_retries: env_or("DB_CONNECT_RETRIES", 5),
            connect_backoff_secs: env_or("DB_CONNECT_BACKOFF_SECS", 5),
        }
    }
}

/// Text-generation gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env_or("OLLAMA_ENDPOINT", "http://ollama:11434".to_string()),
            model: env_or("OLLAMA_MODEL", "gemma2:latest".to_string()),
            timeout_secs: env_or("OLLAMA_TIMEOUT_SECS", 120),
        }
    }
}

/// Processing orchestrator configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Seconds between sweeps over unprocessed records.
    pub sweep_interval_secs: u64,
}

impl ProcessorConfig {
    pub fn from_env() -> Self {
        Self {
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 10),
        }
    }
}

/// Outbound mail configuration.
///
/// Returns `None` when `RECIPIENTS` is unset (forwarding disabled).
/// The SMTP host defaults to the IMAP host; typical deployments run
/// both on the same server.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub account: String,
    pub password: SecretString,
    pub recipients: Vec<String>,
}

impl SenderConfig {
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(raw) = std::env::var("RECIPIENTS") else {
            return Ok(None);
        };
        let recipients: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RECIPIENTS".to_string(),
                message: "set but contains no addresses".to_string(),
            });
        }
        Ok(Some(Self {
            smtp_host: std::env::var("SMTP_SERVER").or_else(|_| env_required("IMAP_SERVER"))?,
            smtp_port: env_or("SMTP_PORT", 465),
            account: env_required("EMAIL_ACCOUNT")?,
            password: SecretString::from(env_required("PASSWORD")?),
            recipients,
        }))
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("API_BIND_ADDR", "0.0.0.0:8000".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        // SAFETY: tests do not read this variable concurrently.
        unsafe { std::env::remove_var("MAIL_DIGEST_NONEXISTENT") };
        assert_eq!(env_or("MAIL_DIGEST_NONEXISTENT", 42_u64), 42);
    }

    #[test]
    fn env_required_reports_missing_key() {
        unsafe { std::env::remove_var("MAIL_DIGEST_MISSING") };
        let err = env_required("MAIL_DIGEST_MISSING").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(k) if k == "MAIL_DIGEST_MISSING"));
    }
}
