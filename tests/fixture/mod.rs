#![allow(dead_code)]

use axum::{http::StatusCode, routing::get, Router};
use hlswarm_lib::{
    EngineEvents, EngineFactory, EngineOptions, Event, PreloadConfig, SinkId, StreamingEngine,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub const MEDIA_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-PLAYLIST-TYPE:VOD
#EXTINF:4.0,
seg/a_0.ts
#EXTINF:4.0,
seg/a_1.ts
#EXTINF:4.0,
seg/a_2.ts
#EXTINF:4.0,
seg/a_3.ts
#EXT-X-ENDLIST
";

pub const MASTER_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:6
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=854x480
v0/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2560000,RESOLUTION=1280x720
v1/index.m3u8
";

pub const VARIANT_PLAYLIST: &str = "#EXTM3U
#EXT-X-TARGETDURATION:6
#EXTINF:6.0,
chunk_0.m4s
#EXTINF:6.0,
chunk_1.m4s
#EXTINF:6.0,
chunk_2.m4s
#EXT-X-ENDLIST
";

pub struct TestServer {
    base_url: String,
}

impl TestServer {
    pub async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://127.0.0.1:{}", addr.port());

        let app = Router::new()
            .route("/a.m3u8", get(|| async { MEDIA_PLAYLIST }))
            .route("/master.m3u8", get(|| async { MASTER_PLAYLIST }))
            .route("/v0/index.m3u8", get(|| async { VARIANT_PLAYLIST }))
            .route("/garbage.m3u8", get(|| async { "<html>not a playlist</html>" }))
            .route(
                "/missing.m3u8",
                get(|| async { (StatusCode::NOT_FOUND, "no such stream") }),
            )
            .route(
                "/slow.m3u8",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    MEDIA_PLAYLIST
                }),
            );

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Config with near-instant fragment pacing.
pub fn fast_config() -> PreloadConfig {
    PreloadConfig {
        fragment_interval_min_ms: 1,
        fragment_interval_max_ms: 2,
        ..PreloadConfig::default()
    }
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Waits for the first bus event matching `pred`, skipping the rest.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<Event>, pred: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await;
    result.expect("timed out waiting for event")
}

/// What a [`ScriptedEngine`] has been told, shared with the test.
#[derive(Default)]
pub struct ScriptedState {
    events: Mutex<Option<EngineEvents>>,
    loads: Mutex<Vec<String>>,
    sink: Mutex<Option<SinkId>>,
    destroyed: AtomicBool,
    destroy_calls: AtomicUsize,
}

impl ScriptedState {
    pub fn events(&self) -> EngineEvents {
        self.events
            .lock()
            .unwrap()
            .clone()
            .expect("engine was never loaded")
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn sink(&self) -> Option<SinkId> {
        *self.sink.lock().unwrap()
    }

    pub fn destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

/// Engine whose notifications are fired by the test itself.
pub struct ScriptedEngine {
    state: Arc<ScriptedState>,
}

impl StreamingEngine for ScriptedEngine {
    fn load_source(&mut self, url: &str, events: EngineEvents) {
        self.state.loads.lock().unwrap().push(url.to_string());
        *self.state.events.lock().unwrap() = Some(events);
    }

    fn attach_to_sink(&mut self, sink: SinkId) {
        *self.state.sink.lock().unwrap() = Some(sink);
    }

    fn destroy(&mut self) {
        self.state.destroyed.store(true, Ordering::SeqCst);
        self.state.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct ScriptedFactory {
    created: Mutex<Vec<Arc<ScriptedState>>>,
}

impl ScriptedFactory {
    pub fn engine(&self, index: usize) -> Arc<ScriptedState> {
        Arc::clone(&self.created.lock().unwrap()[index])
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self, _options: &EngineOptions) -> Box<dyn StreamingEngine> {
        let state = Arc::new(ScriptedState::default());
        self.created.lock().unwrap().push(Arc::clone(&state));
        Box::new(ScriptedEngine { state })
    }
}
