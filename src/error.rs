use thiserror::Error;

/// Fallos al convertir un elemento de la cola en un stream reproducible.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("catalog lookup failed: {0}")]
    Catalog(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("no results for `{0}`")]
    NoResults(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid extractor output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by the playback driver to chat commands and the web panel.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Nothing is playing")]
    NothingPlaying,

    #[error("Playback is not paused")]
    NotPaused,

    #[error("Volume must be between 0 and 100")]
    InvalidVolume(i64),

    #[error("Bot is not connected to a voice channel")]
    NotConnected,

    /// A stop or leave landed while the track was being prepared.
    #[error("Playback was stopped before the track could start")]
    Superseded,

    #[error("Voice connection failed: {0}")]
    Voice(String),

    #[error("Stream control failed: {0}")]
    Control(String),

    #[error("Playback error: {0}")]
    Resolve(#[from] ResolveError),
}

/// Channel management failures (create / move / delete).
#[derive(Debug, Error)]
pub enum ChannelOpError {
    #[error("missing permissions: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Failed(String),
}
