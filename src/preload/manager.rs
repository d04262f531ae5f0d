use crate::config::PreloadConfig;
use crate::engine::{
    DestroyedFlag, EngineEventReceiver, EngineEventSender, EngineFactory, EngineHandle,
    EngineId, EngineMessage, EngineOptions, EngineOrigin,
};
use crate::preload::session::{Applied, PreloadSession, SessionId, SessionSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Where an engine event ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Applied { url: String, outcome: Applied },
    /// The engine now belongs to a sink; forward the event there.
    Detached(EngineMessage),
    /// Cancelled or unknown engine; the event was discarded.
    Dropped,
}

/// Registry of preload sessions keyed by trimmed URL.
///
/// At most one session is active (Preloading or Ready) at a time. The session
/// a `start` supersedes stays observable until the next `start`.
pub struct PreloadManager {
    config: PreloadConfig,
    factory: Arc<dyn EngineFactory>,
    sessions: HashMap<String, PreloadSession>,
    active: Option<String>,
    detached: HashMap<EngineId, DestroyedFlag>,
    events_tx: EngineEventSender,
}

impl PreloadManager {
    pub fn new(
        config: PreloadConfig,
        factory: Arc<dyn EngineFactory>,
    ) -> (Self, EngineEventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            config,
            factory,
            sessions: HashMap::new(),
            active: None,
            detached: HashMap::new(),
            events_tx,
        };
        (manager, events_rx)
    }

    /// Starts warming `url`, cancelling whichever session was active before.
    /// Blank URLs are ignored.
    pub fn start(&mut self, url: &str) -> Option<SessionId> {
        let url = session_key(url);
        if url.is_empty() {
            log::debug!("Ignoring preload request for empty url");
            return None;
        }

        self.sessions.retain(|_, s| !s.state().is_terminal());
        self.stop();

        let engine = EngineHandle::new(
            self.factory.create(&EngineOptions::default()),
            EngineOrigin::FreshlyCreated,
        );
        let mut session = PreloadSession::new(url, self.config.completion_policy);
        session.begin(engine, &self.events_tx);
        let id = session.id();

        if let Some(mut previous) = self.sessions.insert(url.to_string(), session) {
            previous.stop();
        }
        self.active = Some(url.to_string());
        Some(id)
    }

    /// Stops the active session, if any. Returns its URL.
    pub fn stop(&mut self) -> Option<String> {
        let url = self.active.take()?;
        if let Some(session) = self.sessions.get_mut(&url) {
            session.stop();
        }
        Some(url)
    }

    pub fn stop_url(&mut self, url: &str) -> bool {
        let url = session_key(url);
        if self.active.as_deref() == Some(url) {
            self.active = None;
        }
        self.sessions
            .get_mut(url)
            .map(PreloadSession::stop)
            .unwrap_or(false)
    }

    pub fn session(&self, url: &str) -> Option<&PreloadSession> {
        self.sessions.get(session_key(url))
    }

    pub fn active_url(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_session(&self) -> Option<&PreloadSession> {
        self.active.as_ref().and_then(|url| self.sessions.get(url))
    }

    pub fn is_warm(&self, url: &str) -> bool {
        self.session(url)
            .map(PreloadSession::is_warm)
            .unwrap_or(false)
    }

    /// Takes the warmed engine for `url`. `None` means the caller must cold start.
    pub fn handoff(&mut self, url: &str) -> Option<EngineHandle> {
        let handle = self.sessions.get_mut(session_key(url))?.handoff()?;
        self.track_detached(&handle);
        Some(handle)
    }

    /// Hands off the preloaded engine, or creates and loads a fresh one.
    pub fn handoff_or_create(&mut self, url: &str) -> EngineHandle {
        if let Some(handle) = self.handoff(url) {
            return handle;
        }
        let url = session_key(url);
        log::info!("No warm engine for {}, cold start", url);
        let mut handle = EngineHandle::new(
            self.factory.create(&EngineOptions::default()),
            EngineOrigin::FreshlyCreated,
        );
        handle.load_source(url, &self.events_tx);
        self.track_detached(&handle);
        handle
    }

    /// Engines handed out earlier and since destroyed are pruned here, so
    /// sinks that were dropped without `forget_detached` leave nothing behind.
    fn track_detached(&mut self, handle: &EngineHandle) {
        self.detached.retain(|_, destroyed| !destroyed.is_set());
        self.detached.insert(handle.id(), handle.destroyed_flag());
    }

    /// Routes an engine event to the session that owns the engine.
    pub fn dispatch(&mut self, message: EngineMessage) -> Dispatch {
        if let Some(destroyed) = self.detached.get(&message.engine) {
            if !destroyed.is_set() {
                return Dispatch::Detached(message);
            }
            self.detached.remove(&message.engine);
            log::debug!("Dropping {:?} from destroyed {}", message.event, message.engine);
            return Dispatch::Dropped;
        }

        let Some((url, session)) = self
            .sessions
            .iter_mut()
            .find(|(_, s)| s.owns_engine(message.engine))
        else {
            log::debug!("Dropping {:?} from {}", message.event, message.engine);
            return Dispatch::Dropped;
        };

        let outcome = session.apply(message.event);
        let url = url.clone();
        if session.state().is_terminal() && self.active.as_deref() == Some(url.as_str()) {
            self.active = None;
        }
        Dispatch::Applied { url, outcome }
    }

    /// Stops tracking an engine a sink has destroyed.
    pub fn forget_detached(&mut self, engine: EngineId) {
        self.detached.remove(&engine);
    }

    pub fn snapshot(&self, url: &str) -> Option<SessionSnapshot> {
        self.session(url).map(PreloadSession::snapshot)
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions.values().map(PreloadSession::snapshot).collect()
    }

    pub fn config(&self) -> &PreloadConfig {
        &self.config
    }

    /// Stops every session and releases every engine still owned here.
    pub fn shutdown(&mut self) {
        self.active = None;
        for session in self.sessions.values_mut() {
            session.stop();
        }
    }
}

fn session_key(url: &str) -> &str {
    url.trim()
}

impl Drop for PreloadManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
