use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {source_id}: {message}")]
    Fetch { source_id: String, message: String },

    #[error("Fetch timed out: {0}")]
    Timeout(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ReplyError>;
