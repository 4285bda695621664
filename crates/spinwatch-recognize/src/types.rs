use thiserror::Error;

/// A successfully identified track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMatch {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    /// Spotify track id when the service provides one.
    pub external_id: Option<String>,
    /// Full service response, kept for the journal.
    pub raw_response: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("Recognition transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed recognition response: {0}")]
    MalformedResponse(String),
}
