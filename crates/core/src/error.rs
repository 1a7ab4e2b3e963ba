#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("No job id stored for tab {tab}")]
    NoStoredJob { tab: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
