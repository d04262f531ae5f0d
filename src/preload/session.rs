use crate::config::CompletionPolicy;
use crate::engine::{EngineEvent, EngineEventSender, EngineHandle, EngineId};
use crate::error::PlaybackError;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Preloading,
    Ready,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Cancelled)
    }

    /// Counts toward the one-active-session limit.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Preloading | SessionState::Ready)
    }
}

/// What feeding one engine event into a session did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Ignored,
    Progressed,
    Transitioned(SessionState),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub url: String,
    pub state: SessionState,
    pub loaded_segments: u32,
    pub total_segments: Option<u32>,
    pub progress: f64,
    pub error: Option<PlaybackError>,
    pub handed_off: bool,
}

/// Warms one stream ahead of playback.
///
/// The session exclusively owns its engine until [`PreloadSession::handoff`];
/// after that it never touches the engine again, not even on `stop`.
#[derive(Debug)]
pub struct PreloadSession {
    id: SessionId,
    url: String,
    state: SessionState,
    policy: CompletionPolicy,
    engine: Option<EngineHandle>,
    handed_off: bool,
    total_segments: Option<u32>,
    loaded_segments: u32,
    progress: f64,
    error: Option<PlaybackError>,
}

impl PreloadSession {
    pub fn new(url: impl Into<String>, policy: CompletionPolicy) -> Self {
        Self {
            id: SessionId::new(),
            url: url.into(),
            state: SessionState::Idle,
            policy,
            engine: None,
            handed_off: false,
            total_segments: None,
            loaded_segments: 0,
            progress: 0.0,
            error: None,
        }
    }

    /// Idle -> Preloading. Takes ownership of `engine` and starts the manifest load.
    /// Returns false (and releases `engine`) if the session was already started.
    pub fn begin(&mut self, mut engine: EngineHandle, tx: &EngineEventSender) -> bool {
        if self.state != SessionState::Idle {
            log::warn!("{}: begin called in state {:?}", self.id, self.state);
            engine.destroy();
            return false;
        }
        log::info!("{}: preloading {}", self.id, self.url);
        engine.load_source(&self.url, tx);
        self.engine = Some(engine);
        self.state = SessionState::Preloading;
        true
    }

    pub fn apply(&mut self, event: EngineEvent) -> Applied {
        match event {
            EngineEvent::ManifestParsed { fragment_count } => {
                self.on_manifest_parsed(fragment_count)
            }
            EngineEvent::FragmentLoaded => self.on_fragment_loaded(),
            EngineEvent::FatalError { error } => self.on_fatal_error(error),
        }
    }

    pub fn on_manifest_parsed(&mut self, fragment_count: u32) -> Applied {
        if !self.accepts_events() {
            log::debug!("{}: manifest parsed in {:?}, ignored", self.id, self.state);
            return Applied::Ignored;
        }
        match self.total_segments {
            Some(total) if fragment_count <= total => return Applied::Ignored,
            _ => self.total_segments = Some(fragment_count),
        }
        log::info!(
            "{}: manifest parsed, {} fragments",
            self.id,
            fragment_count
        );
        self.update_progress();
        self.check_ready()
    }

    pub fn on_fragment_loaded(&mut self) -> Applied {
        if !self.accepts_events() {
            log::debug!("{}: fragment loaded in {:?}, ignored", self.id, self.state);
            return Applied::Ignored;
        }
        let Some(total) = self.total_segments else {
            log::debug!("{}: fragment before manifest, ignored", self.id);
            return Applied::Ignored;
        };
        if self.loaded_segments >= total {
            return Applied::Ignored;
        }
        self.loaded_segments += 1;
        self.update_progress();
        self.check_ready()
    }

    pub fn on_fatal_error(&mut self, error: PlaybackError) -> Applied {
        if !self.accepts_events() {
            log::debug!("{}: late fatal error ignored: {}", self.id, error);
            return Applied::Ignored;
        }
        log::error!("{}: preload failed: {}", self.id, error);
        self.state = SessionState::Failed;
        self.error = Some(error);
        self.release_engine();
        Applied::Transitioned(SessionState::Failed)
    }

    /// Cancels the session. Idempotent; terminal sessions are left untouched.
    pub fn stop(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        log::info!("{}: stopped in {:?}", self.id, self.state);
        self.state = SessionState::Cancelled;
        self.release_engine();
        true
    }

    /// Transfers the engine to the caller, at most once.
    ///
    /// Returns `None` when the session never started, failed, was cancelled,
    /// or already handed its engine off.
    pub fn handoff(&mut self) -> Option<EngineHandle> {
        if !self.state.is_active() {
            return None;
        }
        let mut engine = self.engine.take()?;
        engine.mark_transferred();
        self.handed_off = true;
        log::info!(
            "{}: handed off {} at {:.0}% ({:?})",
            self.id,
            engine.id(),
            self.progress * 100.0,
            self.state
        );
        Some(engine)
    }

    pub fn owns_engine(&self, id: EngineId) -> bool {
        self.engine.as_ref().map(EngineHandle::id) == Some(id)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn total_segments(&self) -> Option<u32> {
        self.total_segments
    }

    pub fn loaded_segments(&self) -> u32 {
        self.loaded_segments
    }

    /// Loaded share in [0, 1]; never moves backwards.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn error(&self) -> Option<&PlaybackError> {
        self.error.as_ref()
    }

    pub fn is_warm(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn is_handed_off(&self) -> bool {
        self.handed_off
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            url: self.url.clone(),
            state: self.state,
            loaded_segments: self.loaded_segments,
            total_segments: self.total_segments,
            progress: self.progress,
            error: self.error.clone(),
            handed_off: self.handed_off,
        }
    }

    fn accepts_events(&self) -> bool {
        self.state.is_active() && self.engine.is_some()
    }

    fn update_progress(&mut self) {
        let ratio = match self.total_segments {
            Some(0) => 1.0,
            Some(total) => f64::from(self.loaded_segments) / f64::from(total),
            None => 0.0,
        };
        self.progress = self.progress.max(ratio.clamp(0.0, 1.0));
    }

    fn check_ready(&mut self) -> Applied {
        let Some(total) = self.total_segments else {
            return Applied::Progressed;
        };
        if self.state == SessionState::Preloading
            && self.policy.is_satisfied(self.loaded_segments, total)
        {
            log::info!(
                "{}: ready with {}/{} fragments",
                self.id,
                self.loaded_segments,
                total
            );
            self.state = SessionState::Ready;
            return Applied::Transitioned(SessionState::Ready);
        }
        Applied::Progressed
    }

    fn release_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{recording_handle, EngineLog};
    use crate::engine::EngineOrigin;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn started(policy: CompletionPolicy) -> (PreloadSession, Arc<EngineLog>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, log) = recording_handle(EngineOrigin::FreshlyCreated);
        let mut session = PreloadSession::new("https://example.com/a.m3u8", policy);
        assert!(session.begin(handle, &tx));
        (session, log)
    }

    #[test]
    fn begin_loads_the_url_and_enters_preloading() {
        let (session, log) = started(CompletionPolicy::FirstFragment);
        assert_eq!(session.state(), SessionState::Preloading);
        assert_eq!(
            log.loads.lock().unwrap().as_slice(),
            ["https://example.com/a.m3u8"]
        );
    }

    #[test]
    fn first_fragment_policy_is_ready_after_one_tick_and_keeps_filling() {
        let (mut session, _log) = started(CompletionPolicy::FirstFragment);
        session.on_manifest_parsed(4);
        assert_eq!(session.state(), SessionState::Preloading);

        assert_eq!(
            session.on_fragment_loaded(),
            Applied::Transitioned(SessionState::Ready)
        );
        assert_eq!(session.on_fragment_loaded(), Applied::Progressed);
        assert_eq!(session.loaded_segments(), 2);
        assert_eq!(session.progress(), 0.5);
    }

    #[test]
    fn fragments_never_exceed_total() {
        let (mut session, _log) = started(CompletionPolicy::AllFragments);
        session.on_manifest_parsed(2);
        for _ in 0..5 {
            session.on_fragment_loaded();
        }
        assert_eq!(session.loaded_segments(), 2);
        assert_eq!(session.progress(), 1.0);
        assert!(session.is_warm());
    }

    #[test]
    fn fragments_before_manifest_are_ignored() {
        let (mut session, _log) = started(CompletionPolicy::FirstFragment);
        assert_eq!(session.on_fragment_loaded(), Applied::Ignored);
        assert_eq!(session.loaded_segments(), 0);
    }

    #[test]
    fn total_never_decreases_and_progress_never_regresses() {
        let (mut session, _log) = started(CompletionPolicy::AllFragments);
        session.on_manifest_parsed(4);
        session.on_fragment_loaded();
        session.on_fragment_loaded();
        assert_eq!(session.progress(), 0.5);

        assert_eq!(session.on_manifest_parsed(2), Applied::Ignored);
        assert_eq!(session.total_segments(), Some(4));

        session.on_manifest_parsed(8);
        assert_eq!(session.total_segments(), Some(8));
        assert_eq!(session.progress(), 0.5);
    }

    #[test]
    fn empty_manifest_is_immediately_ready() {
        let (mut session, _log) = started(CompletionPolicy::FirstFragment);
        assert_eq!(
            session.on_manifest_parsed(0),
            Applied::Transitioned(SessionState::Ready)
        );
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn fatal_error_fails_once_and_releases_engine() {
        let (mut session, log) = started(CompletionPolicy::FirstFragment);
        session.on_manifest_parsed(4);
        let err = PlaybackError::EngineFatal("network".into());
        assert_eq!(
            session.on_fatal_error(err.clone()),
            Applied::Transitioned(SessionState::Failed)
        );
        assert_eq!(
            session.on_fatal_error(PlaybackError::EngineFatal("again".into())),
            Applied::Ignored
        );
        assert_eq!(session.on_fragment_loaded(), Applied::Ignored);
        assert_eq!(session.error(), Some(&err));
        assert_eq!(log.destroy_count(), 1);
        assert!(session.handoff().is_none());
    }

    #[test]
    fn stop_is_idempotent_and_safe_before_start() {
        let mut idle = PreloadSession::new("u", CompletionPolicy::FirstFragment);
        assert!(idle.stop());
        assert!(!idle.stop());
        assert_eq!(idle.state(), SessionState::Cancelled);

        let (mut session, log) = started(CompletionPolicy::FirstFragment);
        assert!(session.stop());
        assert!(!session.stop());
        assert_eq!(log.destroy_count(), 1);
        assert_eq!(session.on_manifest_parsed(3), Applied::Ignored);
    }

    #[test]
    fn handoff_happens_once_and_stop_leaves_transferred_engine_alone() {
        let (mut session, log) = started(CompletionPolicy::FirstFragment);
        session.on_manifest_parsed(4);

        let handle = session.handoff().expect("first handoff");
        assert_eq!(handle.origin(), EngineOrigin::PreloadedTransferred);
        assert!(session.handoff().is_none());
        assert!(session.is_handed_off());

        let flag = handle.destroyed_flag();
        session.stop();
        assert!(!flag.is_set());
        assert_eq!(log.destroy_count(), 0);

        handle.destroy();
        assert!(flag.is_set());
        assert_eq!(log.destroy_count(), 1);
    }

    #[test]
    fn events_after_handoff_do_not_touch_the_session() {
        let (mut session, _log) = started(CompletionPolicy::AllFragments);
        session.on_manifest_parsed(4);
        let _handle = session.handoff();
        assert_eq!(session.on_fragment_loaded(), Applied::Ignored);
        assert_eq!(session.loaded_segments(), 0);
    }

    #[test]
    fn idle_session_cannot_hand_off() {
        let mut session = PreloadSession::new("u", CompletionPolicy::FirstFragment);
        assert!(session.handoff().is_none());
    }
}
