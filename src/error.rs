use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum VidscribeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot read {path}: {message}")]
    Path { path: PathBuf, message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio extraction error: {0}")]
    Extraction(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Transcription service rejected the credential: {0}")]
    Credential(String),

    #[error("Subtitle formatting error: {0}")]
    Format(String),

    #[error("Subtitle burn error: {0}")]
    Burn(String),

    #[error("Placement error: {0}")]
    Placement(String),

    #[error("{0} timed out")]
    TimedOut(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Task aborted: {0}")]
    Aborted(String),

    #[error("{stage} failed for {}: {source}", path.display())]
    Task {
        path: PathBuf,
        stage: Stage,
        #[source]
        source: Box<VidscribeError>,
    },
}

impl VidscribeError {
    /// Errors that abort the whole run before any task starts.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            VidscribeError::Setup(_)
                | VidscribeError::Config(_)
                | VidscribeError::Path { .. }
                | VidscribeError::UnsupportedFormat(_)
        )
    }

    /// Task errors that make every sibling task pointless, e.g. a rejected API key.
    pub fn is_fatal_for_batch(&self) -> bool {
        match self {
            VidscribeError::Credential(_) => true,
            VidscribeError::Task { source, .. } => source.is_fatal_for_batch(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, VidscribeError>;
