pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod playback;
pub mod preload;

pub use config::{CompletionPolicy, PreloadConfig};
pub use engine::probe_engine::{ProbeEngine, ProbeEngineFactory};
pub use engine::{
    DestroyedFlag, EngineEvent, EngineEvents, EngineFactory, EngineHandle, EngineId,
    EngineMessage, EngineOptions, EngineOrigin, StreamingEngine,
};
pub use error::{AppError, AppResult, PlaybackError};
pub use events::{Event, EventBus};
pub use playback::clock::{Clock, ManualClock, SystemClock};
pub use playback::detector::PlaybackStartDetector;
pub use playback::latency::{AttemptId, LatencyRecorder, LatencySnapshot, PlaybackAttempt};
pub use playback::sink::{PlaybackSink, SinkId, SinkSource};
pub use preload::manager::{Dispatch, PreloadManager};
pub use preload::probe::{ManifestEstimate, ManifestProbe};
pub use preload::service::{DetachedEvents, PreloadService};
pub use preload::session::{Applied, PreloadSession, SessionId, SessionSnapshot, SessionState};

/// Installs `env_logger`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("hlswarm_lib=info"),
    )
    .try_init();
}
