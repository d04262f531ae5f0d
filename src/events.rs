use crate::error::PlaybackError;
use crate::preload::session::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

pub const PRELOAD_STATE_CHANGED: &str = "preload:state-changed";
pub const PRELOAD_PROGRESS: &str = "preload:progress";
pub const PLAYBACK_CONFIRMED: &str = "playback:confirmed";
pub const PLAYBACK_SINK_ERROR: &str = "playback:sink-error";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangedPayload {
    pub url: String,
    pub state: SessionState,
    pub error: Option<PlaybackError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub url: String,
    pub loaded_segments: u32,
    pub total_segments: Option<u32>,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedPayload {
    pub attempt_id: String,
    pub latency_ms: u64,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkErrorPayload {
    pub sink_id: String,
    pub error: PlaybackError,
}

/// Everything the view layer can observe, tagged with its event name.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    #[serde(rename = "preload:state-changed")]
    StateChanged(StateChangedPayload),
    #[serde(rename = "preload:progress")]
    Progress(ProgressPayload),
    #[serde(rename = "playback:confirmed")]
    Confirmed(ConfirmedPayload),
    #[serde(rename = "playback:sink-error")]
    SinkError(SinkErrorPayload),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StateChanged(_) => PRELOAD_STATE_CHANGED,
            Event::Progress(_) => PRELOAD_PROGRESS,
            Event::Confirmed(_) => PLAYBACK_CONFIRMED,
            Event::SinkError(_) => PLAYBACK_SINK_ERROR,
        }
    }
}

/// Broadcasts [`Event`]s to any number of view-layer listeners.
///
/// `publish` is sync and silently drops events when nobody is subscribed.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        log::trace!("publish {}", event.name());
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
