pub mod probe_engine;

use crate::error::PlaybackError;
use crate::playback::sink::SinkId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(Uuid);

impl EngineId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// Lifecycle notifications a streaming engine reports after `load_source`.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ManifestParsed { fragment_count: u32 },
    FragmentLoaded,
    FatalError { error: PlaybackError },
}

/// An [`EngineEvent`] stamped with the engine that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMessage {
    pub engine: EngineId,
    pub event: EngineEvent,
}

pub type EngineEventSender = mpsc::UnboundedSender<EngineMessage>;
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineMessage>;

/// Notification outlet handed to an engine when it starts loading.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    engine: EngineId,
    tx: EngineEventSender,
}

impl EngineEvents {
    pub fn new(engine: EngineId, tx: EngineEventSender) -> Self {
        Self { engine, tx }
    }

    pub fn engine(&self) -> EngineId {
        self.engine
    }

    pub fn manifest_parsed(&self, fragment_count: u32) {
        self.send(EngineEvent::ManifestParsed { fragment_count });
    }

    pub fn fragment_loaded(&self) {
        self.send(EngineEvent::FragmentLoaded);
    }

    pub fn fatal_error(&self, error: PlaybackError) {
        self.send(EngineEvent::FatalError { error });
    }

    fn send(&self, event: EngineEvent) {
        let message = EngineMessage {
            engine: self.engine,
            event,
        };
        if self.tx.send(message).is_err() {
            log::debug!("{}: event receiver closed, dropping event", self.engine);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Start fetching fragments as soon as the manifest is parsed.
    pub auto_start_load: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            auto_start_load: true,
        }
    }
}

/// The black-box streaming engine: fetches and parses a manifest, downloads
/// fragments, and reports progress through [`EngineEvents`].
pub trait StreamingEngine: Send {
    fn load_source(&mut self, url: &str, events: EngineEvents);

    fn attach_to_sink(&mut self, sink: SinkId);

    /// Must stop all in-flight work; no events may follow.
    fn destroy(&mut self);
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, options: &EngineOptions) -> Box<dyn StreamingEngine>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineOrigin {
    FreshlyCreated,
    PreloadedTransferred,
}

/// Read-only view of whether an engine instance has been destroyed.
#[derive(Debug, Clone, Default)]
pub struct DestroyedFlag(Arc<AtomicBool>);

impl DestroyedFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Exclusive ownership of one engine instance.
///
/// Whoever holds the handle is the only party that can destroy the engine.
/// Destruction happens at most once: either through [`EngineHandle::destroy`]
/// or when the handle is dropped.
pub struct EngineHandle {
    id: EngineId,
    engine: Box<dyn StreamingEngine>,
    origin: EngineOrigin,
    destroyed: DestroyedFlag,
}

impl EngineHandle {
    pub fn new(engine: Box<dyn StreamingEngine>, origin: EngineOrigin) -> Self {
        Self {
            id: EngineId::new(),
            engine,
            origin,
            destroyed: DestroyedFlag::default(),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn origin(&self) -> EngineOrigin {
        self.origin
    }

    pub fn destroyed_flag(&self) -> DestroyedFlag {
        self.destroyed.clone()
    }

    pub fn load_source(&mut self, url: &str, tx: &EngineEventSender) {
        log::info!("{}: loading {}", self.id, url);
        self.engine
            .load_source(url, EngineEvents::new(self.id, tx.clone()));
    }

    pub fn attach_to_sink(&mut self, sink: SinkId) {
        log::info!("{}: attaching to {} ({:?})", self.id, sink, self.origin);
        self.engine.attach_to_sink(sink);
    }

    pub(crate) fn mark_transferred(&mut self) {
        self.origin = EngineOrigin::PreloadedTransferred;
    }

    pub fn destroy(mut self) {
        self.destroy_engine();
    }

    fn destroy_engine(&mut self) {
        if self.destroyed.set() {
            log::debug!("{}: destroying engine", self.id);
            self.engine.destroy();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.destroy_engine();
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("destroyed", &self.destroyed.is_set())
            .finish()
    }
}
