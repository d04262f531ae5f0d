use crate::config::PreloadConfig;
use crate::engine::{EngineEventReceiver, EngineFactory, EngineHandle, EngineId, EngineMessage};
use crate::events::{Event, EventBus, ProgressPayload, StateChangedPayload};
use crate::preload::manager::{Dispatch, PreloadManager};
use crate::preload::session::{Applied, SessionId, SessionSnapshot};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, Mutex};

/// Engine events for engines that were handed to a sink or created cold.
pub type DetachedEvents = mpsc::UnboundedReceiver<EngineMessage>;

/// Async front door to a [`PreloadManager`].
///
/// Every mutation, whether a caller command or an engine event, goes through
/// one lock, so events are applied one at a time in arrival order.
#[derive(Clone)]
pub struct PreloadService {
    manager: Arc<Mutex<PreloadManager>>,
    bus: EventBus,
}

impl PreloadService {
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: PreloadConfig, factory: Arc<dyn EngineFactory>) -> (Self, DetachedEvents) {
        let bus = EventBus::new(config.event_capacity);
        let (manager, events_rx) = PreloadManager::new(config, factory);
        let manager = Arc::new(Mutex::new(manager));
        let (detached_tx, detached_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump_engine_events(
            Arc::downgrade(&manager),
            bus.clone(),
            events_rx,
            detached_tx,
        ));

        (Self { manager, bus }, detached_rx)
    }

    pub async fn start(&self, url: &str) -> Option<SessionId> {
        let mut manager = self.manager.lock().await;
        let previous = manager.active_url().map(str::to_string);
        let id = manager.start(url)?;
        if let Some(previous) = previous.filter(|p| p != url.trim()) {
            publish_state(&self.bus, &manager, &previous);
        }
        publish_state(&self.bus, &manager, url.trim());
        Some(id)
    }

    pub async fn stop(&self) {
        let mut manager = self.manager.lock().await;
        if let Some(url) = manager.stop() {
            publish_state(&self.bus, &manager, &url);
        }
    }

    pub async fn is_warm(&self, url: &str) -> bool {
        self.manager.lock().await.is_warm(url)
    }

    pub async fn handoff(&self, url: &str) -> Option<EngineHandle> {
        self.manager.lock().await.handoff(url)
    }

    pub async fn handoff_or_create(&self, url: &str) -> EngineHandle {
        self.manager.lock().await.handoff_or_create(url)
    }

    pub async fn snapshot(&self, url: &str) -> Option<SessionSnapshot> {
        self.manager.lock().await.snapshot(url)
    }

    pub async fn shutdown(&self) {
        self.manager.lock().await.shutdown();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Stops routing events for an engine a sink has destroyed.
    pub async fn forget_detached(&self, engine: EngineId) {
        self.manager.lock().await.forget_detached(engine);
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

async fn pump_engine_events(
    manager: Weak<Mutex<PreloadManager>>,
    bus: EventBus,
    mut events_rx: EngineEventReceiver,
    detached_tx: mpsc::UnboundedSender<EngineMessage>,
) {
    while let Some(message) = events_rx.recv().await {
        let Some(shared) = manager.upgrade() else {
            break;
        };
        let mut guard = shared.lock().await;
        match guard.dispatch(message) {
            Dispatch::Applied { url, outcome } => match outcome {
                Applied::Ignored => {}
                Applied::Progressed => publish_progress(&bus, &guard, &url),
                Applied::Transitioned(_) => {
                    publish_progress(&bus, &guard, &url);
                    publish_state(&bus, &guard, &url);
                }
            },
            Dispatch::Detached(message) => {
                let _ = detached_tx.send(message);
            }
            Dispatch::Dropped => {}
        }
    }
    log::debug!("Engine event pump finished");
}

fn publish_state(bus: &EventBus, manager: &PreloadManager, url: &str) {
    if let Some(session) = manager.session(url) {
        bus.publish(Event::StateChanged(StateChangedPayload {
            url: url.to_string(),
            state: session.state(),
            error: session.error().cloned(),
        }));
    }
}

fn publish_progress(bus: &EventBus, manager: &PreloadManager, url: &str) {
    if let Some(session) = manager.session(url) {
        bus.publish(Event::Progress(ProgressPayload {
            url: url.to_string(),
            loaded_segments: session.loaded_segments(),
            total_segments: session.total_segments(),
            progress: session.progress(),
        }));
    }
}
