use crate::engine::{EngineHandle, EngineId};
use crate::error::PlaybackError;
use crate::events::{ConfirmedPayload, Event, EventBus, SinkErrorPayload};
use crate::playback::clock::Clock;
use crate::playback::detector::PlaybackStartDetector;
use crate::playback::latency::{AttemptId, LatencyRecorder};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(Uuid);

impl SinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// What a sink renders from.
#[derive(Debug)]
pub enum SinkSource {
    Engine(EngineHandle),
    Url(String),
}

/// A media-rendering target and everything it owns.
///
/// The sink is the sole owner of any engine attached to it and destroys it
/// exactly once: on re-attach, on `teardown`, or on drop.
#[derive(Debug)]
pub struct PlaybackSink {
    id: SinkId,
    source: Option<SinkSource>,
    detector: PlaybackStartDetector,
    attempt: Option<AttemptId>,
    error: Option<PlaybackError>,
    bus: Option<EventBus>,
}

impl PlaybackSink {
    pub fn new() -> Self {
        Self {
            id: SinkId::new(),
            source: None,
            detector: PlaybackStartDetector::new(),
            attempt: None,
            error: None,
            bus: None,
        }
    }

    /// Publishes confirmations and sink errors on `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Replaces the current source. Returns the id of the engine the old
    /// source held, which has been destroyed.
    pub fn attach(&mut self, mut source: SinkSource) -> Option<EngineId> {
        let released = self.release_source();
        match &mut source {
            SinkSource::Engine(handle) => handle.attach_to_sink(self.id),
            SinkSource::Url(url) => log::info!("{}: playing {} directly", self.id, url),
        }
        self.source = Some(source);
        self.error = None;
        released
    }

    pub fn source(&self) -> Option<&SinkSource> {
        self.source.as_ref()
    }

    pub fn engine(&self) -> Option<&EngineHandle> {
        match &self.source {
            Some(SinkSource::Engine(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Records the play intent. Signals seen before this call do not count.
    pub fn begin_attempt<C: Clock>(&mut self, recorder: &mut LatencyRecorder<C>) -> AttemptId {
        self.detector.reset();
        let id = recorder.begin();
        self.attempt = Some(id);
        id
    }

    pub fn attempt(&self) -> Option<AttemptId> {
        self.attempt
    }

    /// The sink was mounted (`true`) or hidden (`false`).
    /// Returns the latency if this call confirmed playback.
    pub fn set_visible<C: Clock>(
        &mut self,
        visible: bool,
        recorder: &mut LatencyRecorder<C>,
    ) -> Option<Duration> {
        if self.attempt.is_none() {
            return None;
        }
        if self.detector.set_visible(visible) {
            return self.confirm(recorder);
        }
        None
    }

    /// Low-level "content is rendering" notification from the sink.
    /// Returns the latency if this call confirmed playback.
    pub fn rendering_started<C: Clock>(
        &mut self,
        recorder: &mut LatencyRecorder<C>,
    ) -> Option<Duration> {
        if self.attempt.is_none() {
            log::debug!("{}: rendering signal before play intent, ignored", self.id);
            return None;
        }
        if self.detector.on_rendering_started() {
            return self.confirm(recorder);
        }
        None
    }

    pub fn is_confirmed(&self) -> bool {
        self.detector.is_confirmed()
    }

    /// Surfaces a playback failure. Preload state is not affected.
    pub fn report_error(&mut self, message: impl Into<String>) -> PlaybackError {
        let error = PlaybackError::SinkPlayback(message.into());
        log::error!("{}: {}", self.id, error);
        if let Some(bus) = &self.bus {
            bus.publish(Event::SinkError(SinkErrorPayload {
                sink_id: self.id.to_string(),
                error: error.clone(),
            }));
        }
        self.error = Some(error.clone());
        error
    }

    pub fn error(&self) -> Option<&PlaybackError> {
        self.error.as_ref()
    }

    /// Releases the source. Returns the id of the engine that was destroyed.
    pub fn teardown(&mut self) -> Option<EngineId> {
        self.attempt = None;
        self.detector.reset();
        self.release_source()
    }

    fn confirm<C: Clock>(&mut self, recorder: &mut LatencyRecorder<C>) -> Option<Duration> {
        let id = self.attempt?;
        let latency = recorder.confirm(id)?;
        if let Some(bus) = &self.bus {
            let confirmed_at = recorder
                .attempt(id)
                .and_then(|a| a.confirmed_wall())
                .unwrap_or_else(|| recorder.clock().utc_now());
            bus.publish(Event::Confirmed(ConfirmedPayload {
                attempt_id: id.to_string(),
                latency_ms: latency.as_millis() as u64,
                confirmed_at,
            }));
        }
        Some(latency)
    }

    fn release_source(&mut self) -> Option<EngineId> {
        match self.source.take()? {
            SinkSource::Engine(handle) => {
                let id = handle.id();
                handle.destroy();
                Some(id)
            }
            SinkSource::Url(_) => None,
        }
    }
}

impl Default for PlaybackSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        self.release_source();
    }
}
