//! Engine wiring
//!
//! **Tasks:**
//! ```text
//! supervisor ──raw──► ingress (SessionEventBus) ──┐
//!                                                 ▼
//!   EngineHandle ──SetVolume/TrackFinished──► processing queue ──► controller
//!                                                 ▲                   │ intents
//!   sink worker ──TransitionComplete/Failed───────┘                   ▼
//!                                                               sink worker
//! ```
//!
//! The controller task is the only consumer of the processing queue and the
//! only owner of the music context. Everyone else observes it through a
//! `watch` of [`ControllerSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use mwmc_common::config::TomlConfig;
use mwmc_common::events::ConnectionState;
use mwmc_common::{RawSessionMessage, TrackId, Volume};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioSink, SinkWorker};
use crate::bus::{BusStats, SessionEventBus};
use crate::catalog::TrackCatalog;
use crate::connection::{BackoffPolicy, ConnectionSupervisor, SessionConnector};
use crate::playback::{
    ControllerInput, ControllerSnapshot, LocationCheckRequest, PlaybackController,
};

/// Runtime settings derived from the bootstrap config
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub backoff: BackoffPolicy,
    /// Connection lifetime after which the retry counter resets
    pub stable_after: Duration,
    /// Issued once when the controller first goes live
    pub initial_volume: Option<Volume>,
    /// Processing-queue backlog that triggers a warning
    pub queue_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            stable_after: Duration::from_secs(60),
            initial_volume: None,
            queue_capacity: 1024,
        }
    }
}

impl From<&TomlConfig> for EngineSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            backoff: BackoffPolicy::from(&config.reconnect),
            stable_after: config.reconnect.stable_after(),
            initial_volume: Some(Volume::new(config.playback.initial_volume)),
            queue_capacity: config.playback.queue_capacity,
        }
    }
}

pub struct Engine;

impl Engine {
    /// Spawn all engine tasks on the current runtime
    pub fn start(
        catalog: Arc<TrackCatalog>,
        sink: Arc<dyn AudioSink>,
        connector: Arc<dyn SessionConnector>,
        settings: EngineSettings,
    ) -> EngineHandle {
        let supervisor_shutdown = CancellationToken::new();
        let worker_shutdown = CancellationToken::new();

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (check_tx, check_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ControllerSnapshot::default());
        let (stats_tx, stats_rx) = watch::channel(BusStats::default());

        let supervisor = ConnectionSupervisor::new(
            connector,
            settings.backoff,
            settings.stable_after,
            raw_tx,
            supervisor_shutdown.clone(),
        );
        let connection_rx = supervisor.subscribe();

        let mut controller =
            PlaybackController::new(catalog, intent_tx).with_location_checks(check_tx);
        if let Some(level) = settings.initial_volume {
            controller = controller.with_initial_volume(level);
        }

        let worker = SinkWorker::new(sink, intent_rx, input_tx.clone(), worker_shutdown.clone());

        let tasks = EngineTasks {
            supervisor: supervisor.spawn(),
            ingress: tokio::spawn(run_ingress(raw_rx, input_tx.clone(), stats_tx)),
            controller: tokio::spawn(run_controller(
                controller,
                input_rx,
                state_tx,
                settings.queue_capacity,
            )),
            worker: worker.spawn(),
        };
        info!("Engine started");

        EngineHandle {
            inputs: input_tx,
            state: state_rx,
            connection: connection_rx,
            bus_stats: stats_rx,
            location_checks: Some(check_rx),
            supervisor_shutdown,
            worker_shutdown,
            tasks,
        }
    }
}

struct EngineTasks {
    supervisor: JoinHandle<()>,
    ingress: JoinHandle<()>,
    controller: JoinHandle<()>,
    worker: JoinHandle<()>,
}

/// Control surface of a running engine
pub struct EngineHandle {
    inputs: mpsc::UnboundedSender<ControllerInput>,
    state: watch::Receiver<ControllerSnapshot>,
    connection: watch::Receiver<ConnectionState>,
    bus_stats: watch::Receiver<BusStats>,
    location_checks: Option<mpsc::UnboundedReceiver<LocationCheckRequest>>,
    supervisor_shutdown: CancellationToken,
    worker_shutdown: CancellationToken,
    tasks: EngineTasks,
}

impl EngineHandle {
    pub fn set_volume(&self, level: Volume) {
        self.submit(ControllerInput::SetVolume(level));
    }

    /// Report that `track` played to its end (from the audio backend)
    pub fn track_finished(&self, track: TrackId) {
        self.submit(ControllerInput::TrackFinished { track });
    }

    pub fn state(&self) -> watch::Receiver<ControllerSnapshot> {
        self.state.clone()
    }

    pub fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    pub fn bus_stats(&self) -> watch::Receiver<BusStats> {
        self.bus_stats.clone()
    }

    /// Outbound location checks; can be taken once
    pub fn location_checks(&mut self) -> Option<mpsc::UnboundedReceiver<LocationCheckRequest>> {
        self.location_checks.take()
    }

    /// Stop the session, silence playback and wait for every task
    ///
    /// Messages already delivered by the session are processed before the
    /// controller shuts down.
    pub async fn shutdown(self) {
        let EngineHandle {
            inputs,
            supervisor_shutdown,
            worker_shutdown,
            tasks,
            ..
        } = self;

        info!("Engine shutting down");
        supervisor_shutdown.cancel();
        join("supervisor", tasks.supervisor).await;
        join("ingress", tasks.ingress).await;

        if inputs.send(ControllerInput::Shutdown).is_err() {
            warn!("Controller already stopped");
        }
        join("controller", tasks.controller).await;

        worker_shutdown.cancel();
        join("sink worker", tasks.worker).await;
        info!("Engine stopped");
    }

    fn submit(&self, input: ControllerInput) {
        if self.inputs.send(input).is_err() {
            warn!("Processing queue closed; input dropped");
        }
    }
}

async fn join(name: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        error!("{} task failed: {}", name, e);
    }
}

/// Normalize raw session messages into the processing queue
async fn run_ingress(
    mut raw_rx: mpsc::UnboundedReceiver<RawSessionMessage>,
    inputs: mpsc::UnboundedSender<ControllerInput>,
    stats_tx: watch::Sender<BusStats>,
) {
    let mut bus = SessionEventBus::new();

    while let Some(raw) = raw_rx.recv().await {
        if let Some(event) = bus.ingest(raw) {
            if inputs.send(ControllerInput::Event(event)).is_err() {
                debug!("Controller gone; ingress stopping");
                break;
            }
        }
        stats_tx.send_replace(bus.stats());
    }

    let stats = bus.stats();
    info!(
        "Ingress stopped: accepted={} duplicates={} stale={} malformed={}",
        stats.accepted, stats.duplicates, stats.stale, stats.malformed
    );
}

/// Single consumer of the processing queue
async fn run_controller(
    mut controller: PlaybackController,
    mut inputs: mpsc::UnboundedReceiver<ControllerInput>,
    state_tx: watch::Sender<ControllerSnapshot>,
    queue_capacity: usize,
) {
    let mut backlog_warned = false;

    while let Some(input) = inputs.recv().await {
        let backlog = inputs.len();
        if backlog >= queue_capacity && !backlog_warned {
            warn!(
                "Processing queue backlog at {} (capacity {})",
                backlog, queue_capacity
            );
            backlog_warned = true;
        } else if backlog < queue_capacity / 2 {
            backlog_warned = false;
        }

        let running = controller.process(input);
        let snapshot = controller.snapshot();
        state_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        if !running {
            break;
        }
    }
    info!("Playback controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = TomlConfig::from_toml_str(
            r#"
rules_path = "rules.toml"

[reconnect]
initial_delay_ms = 500
stable_after_secs = 10

[playback]
initial_volume = 0.25
queue_capacity = 64
"#,
        )
        .unwrap();

        let settings = EngineSettings::from(&config);
        assert_eq!(settings.backoff.first, Duration::from_millis(500));
        assert_eq!(settings.backoff.max, Duration::from_secs(30));
        assert_eq!(settings.stable_after, Duration::from_secs(10));
        assert_eq!(settings.initial_volume, Some(Volume::new(0.25)));
        assert_eq!(settings.queue_capacity, 64);
    }
}
