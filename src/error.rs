use serde::Serialize;

/// Failures that travel as data: stored on sessions and sinks, carried by
/// engine events, never raised across an async boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum PlaybackError {
    #[error("Manifest unreachable: {0}")]
    ManifestUnreachable(String),

    #[error("Manifest unparseable: {0}")]
    ManifestUnparseable(String),

    #[error("Engine fatal error: {0}")]
    EngineFatal(String),

    #[error("Sink playback error: {0}")]
    SinkPlayback(String),
}

impl PlaybackError {
    pub fn kind(&self) -> &str {
        match self {
            PlaybackError::ManifestUnreachable(_) => "manifest_unreachable",
            PlaybackError::ManifestUnparseable(_) => "manifest_unparseable",
            PlaybackError::EngineFatal(_) => "engine_fatal",
            PlaybackError::SinkPlayback(_) => "sink_playback",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl AppError {
    fn kind(&self) -> &str {
        match self {
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::Config(_) => "config",
            AppError::Cancelled => "cancelled",
            AppError::Playback(p) => p.kind(),
            AppError::Io(_) => "io",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// Folds any failure into the data taxonomy so it can be stored or sent.
    pub fn into_playback(self) -> PlaybackError {
        match self {
            AppError::Playback(p) => p,
            other => PlaybackError::EngineFatal(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
