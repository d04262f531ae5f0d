use crate::engine::{EngineEvent, EngineMessage, EngineOrigin};
use crate::error::PlaybackError;
use crate::playback::clock::Clock;
use crate::playback::latency::{AttemptId, LatencyRecorder};
use crate::playback::sink::{PlaybackSink, SinkSource};
use crate::preload::service::PreloadService;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayStarted {
    pub attempt: AttemptId,
    pub origin: EngineOrigin,
}

/// Play intent for `url`: records the attempt first, then attaches the warm
/// engine if one was preloaded, or a freshly created one otherwise.
pub async fn play<C: Clock>(
    service: &PreloadService,
    sink: &mut PlaybackSink,
    recorder: &mut LatencyRecorder<C>,
    url: &str,
) -> PlayStarted {
    log::info!("[play] url={}", url);
    let attempt = sink.begin_attempt(recorder);

    let handle = service.handoff_or_create(url).await;
    let origin = handle.origin();
    match origin {
        EngineOrigin::PreloadedTransferred => log::info!("[play] Using preloaded engine"),
        EngineOrigin::FreshlyCreated => log::info!("[play] Cold start"),
    }
    if let Some(released) = sink.attach(SinkSource::Engine(handle)) {
        service.forget_detached(released).await;
    }

    PlayStarted { attempt, origin }
}

/// No-preload baseline: the sink loads the URL itself.
pub fn play_direct<C: Clock>(
    sink: &mut PlaybackSink,
    recorder: &mut LatencyRecorder<C>,
    url: &str,
) -> AttemptId {
    log::info!("[play_direct] url={}", url);
    let attempt = sink.begin_attempt(recorder);
    if let Some(released) = sink.attach(SinkSource::Url(url.to_string())) {
        log::debug!("[play_direct] released {}", released);
    }
    attempt
}

/// Forwards an event from a sink-owned engine. Fatal engine errors surface as
/// sink playback errors; everything else is the engine's own business.
pub fn forward_detached(sink: &mut PlaybackSink, message: EngineMessage) -> Option<PlaybackError> {
    let owned = sink.engine().map(|e| e.id()) == Some(message.engine);
    if !owned {
        log::debug!("[forward_detached] {} is not attached here", message.engine);
        return None;
    }
    match message.event {
        EngineEvent::FatalError { error } => Some(sink.report_error(error.to_string())),
        _ => None,
    }
}

/// Tears the sink down and lets the preload side forget its engine.
pub async fn stop_playback(service: &PreloadService, sink: &mut PlaybackSink) {
    if let Some(engine) = sink.teardown() {
        service.forget_detached(engine).await;
    }
}
