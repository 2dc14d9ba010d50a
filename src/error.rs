use thiserror::Error;

/// Error taxonomy for the processing engine (see spec §7). Variants map to
/// abstract "kinds"; recovery policy lives with the caller, not the error type.
#[derive(Error, Debug)]
pub enum BisubError {
    #[error("media tool not found: {0}")]
    ToolNotFound(String),

    #[error("audio extraction failed: {0}")]
    ExtractFailed(String),

    #[error("subtitle burn failed: {0}")]
    BurnFailed(String),

    #[error("ASR model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("translation batch failed: {0}")]
    TranslationBatchFailed(String),

    #[error("content filtered by provider")]
    ContentFiltered,

    #[error("rate limited, retry after backoff")]
    RateLimited,

    #[error("bilingual subtitles empty")]
    EmptyBilingual,

    #[error("cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BisubError>;

impl BisubError {
    /// A short human-readable detail string, suitable for `JobFinished.detail`.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}
