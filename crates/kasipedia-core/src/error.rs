use thiserror::Error;

#[derive(Debug, Error)]
pub enum KasipediaError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Service credential not configured")]
    CredentialMissing,

    #[error("Device permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    #[error("Content fetch failed: {0}")]
    ContentFetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KasipediaError>;
