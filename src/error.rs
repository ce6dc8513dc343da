//! Error types for mail-digest.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Durable-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: id {0}")]
    NotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox monitor errors.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Session setup or transport failure. Fatal to the current
    /// connection; the monitor reconnects and resumes polling.
    #[error("IMAP connection failed: {0}")]
    Connection(String),

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Message parse failed: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether this failure invalidates the session and requires a
    /// full reconnect before the next poll.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }
}

/// Content extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unsupported format: .{extension}")]
    UnsupportedFormat { extension: String },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Document extraction failed: {0}")]
    Doc(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text-generation gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Compose(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// HTTP API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Forwarding is disabled: RECIPIENTS is not configured")]
    ForwardingDisabled,
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
