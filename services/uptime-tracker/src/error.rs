//! Error types for the uptime tracker

/// Errors that can occur in the uptime tracker
#[derive(Debug, thiserror::Error)]
pub enum UptimeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Container runtime unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Failed to record point for '{id}': {reason}")]
    WorkloadWrite { id: String, reason: String },

    #[error("Prune failed: {0}")]
    Prune(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for uptime tracker operations
pub type Result<T> = std::result::Result<T, UptimeError>;
