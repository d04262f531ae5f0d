use crate::config::PreloadConfig;
use crate::engine::{EngineEvents, EngineFactory, EngineOptions, StreamingEngine};
use crate::error::{AppError, AppResult, PlaybackError};
use crate::playback::sink::SinkId;
use crate::preload::probe::ManifestProbe;
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Stand-in engine for when no real streaming engine is wired up.
///
/// It probes the manifest for a segment estimate, reports it as parsed, then
/// paces one `FragmentLoaded` per estimated segment.
pub struct ProbeEngine {
    probe: ManifestProbe,
    interval: (Duration, Duration),
    options: EngineOptions,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    sink: Option<SinkId>,
}

impl ProbeEngine {
    pub fn new(
        probe: ManifestProbe,
        interval: (Duration, Duration),
        options: EngineOptions,
    ) -> Self {
        Self {
            probe,
            interval,
            options,
            cancel: CancellationToken::new(),
            task: None,
            sink: None,
        }
    }

    pub fn sink(&self) -> Option<SinkId> {
        self.sink
    }

    fn cancel_load(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl StreamingEngine for ProbeEngine {
    fn load_source(&mut self, url: &str, events: EngineEvents) {
        self.cancel_load();
        self.cancel = CancellationToken::new();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("{}: no async runtime to load {}: {}", events.engine(), url, e);
                events.fatal_error(PlaybackError::EngineFatal(format!(
                    "no async runtime: {}",
                    e
                )));
                return;
            }
        };

        self.task = Some(runtime.spawn(run_load(
            self.probe.clone(),
            url.to_string(),
            events,
            self.cancel.clone(),
            self.interval,
            self.options.auto_start_load,
        )));
    }

    fn attach_to_sink(&mut self, sink: SinkId) {
        self.sink = Some(sink);
    }

    fn destroy(&mut self) {
        self.cancel_load();
        self.sink = None;
    }
}

impl Drop for ProbeEngine {
    fn drop(&mut self) {
        self.cancel_load();
    }
}

async fn run_load(
    probe: ManifestProbe,
    url: String,
    events: EngineEvents,
    cancel: CancellationToken,
    interval: (Duration, Duration),
    auto_start_load: bool,
) {
    let estimate = match probe.probe(&url, &cancel).await {
        Ok(estimate) => estimate,
        Err(AppError::Cancelled) => return,
        Err(e) => {
            if !cancel.is_cancelled() {
                events.fatal_error(e.into_playback());
            }
            return;
        }
    };
    if cancel.is_cancelled() {
        return;
    }

    log::info!(
        "{}: manifest ready, {} segments{}",
        events.engine(),
        estimate.segments,
        if estimate.fallback { " (estimated)" } else { "" }
    );
    events.manifest_parsed(estimate.segments);
    if !auto_start_load {
        return;
    }

    for loaded in 1..=estimate.segments {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(jitter(interval)) => {}
        }
        if cancel.is_cancelled() {
            return;
        }
        log::trace!("{}: fragment {}/{}", events.engine(), loaded, estimate.segments);
        events.fragment_loaded();
    }
    log::info!("{}: all {} segments warm", events.engine(), estimate.segments);
}

fn jitter((min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
    Duration::from_millis(millis as u64)
}

/// Creates [`ProbeEngine`]s sharing one HTTP client.
#[derive(Clone)]
pub struct ProbeEngineFactory {
    probe: ManifestProbe,
    interval: (Duration, Duration),
}

impl ProbeEngineFactory {
    pub fn new(config: &PreloadConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            probe: ManifestProbe::new(config)?,
            interval: config.fragment_interval_range(),
        })
    }
}

impl EngineFactory for ProbeEngineFactory {
    fn create(&self, options: &EngineOptions) -> Box<dyn StreamingEngine> {
        Box::new(ProbeEngine::new(self.probe.clone(), self.interval, *options))
    }
}
