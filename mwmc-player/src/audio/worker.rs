//! Sink worker - executes intents in order and reports back
//!
//! **Flow:**
//! 1. Receive the next [`PlaybackIntent`] from the controller
//! 2. A Play/Stop supersedes the pending transition timer (cancelled)
//! 3. Execute against the [`AudioSink`]
//! 4. Failure → `PlaybackFailed`; timed transition → arm a completion timer
//!    that posts `TransitionComplete` when it fires
//!
//! Volume changes leave a running timer alone; a ducked stinger still
//! completes while the operator turns the volume down.

use std::sync::Arc;

use mwmc_common::{PlaybackAction, PlaybackIntent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sink::AudioSink;
use crate::playback::ControllerInput;

/// Single consumer of the intent channel
pub struct SinkWorker {
    sink: Arc<dyn AudioSink>,
    intents: mpsc::UnboundedReceiver<PlaybackIntent>,
    feedback: mpsc::UnboundedSender<ControllerInput>,
    shutdown: CancellationToken,
    /// Timer of the transition currently in flight
    pending: Option<CancellationToken>,
}

impl SinkWorker {
    pub fn new(
        sink: Arc<dyn AudioSink>,
        intents: mpsc::UnboundedReceiver<PlaybackIntent>,
        feedback: mpsc::UnboundedSender<ControllerInput>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sink,
            intents,
            feedback,
            shutdown,
            pending: None,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until the intent channel closes or shutdown is requested
    ///
    /// Intents already queued when the channel closes are still executed, so
    /// the final `Stop` of a shutdown reaches the sink.
    pub async fn run(mut self) {
        info!("Sink worker started");
        loop {
            let intent = tokio::select! {
                biased;
                next = self.intents.recv() => match next {
                    Some(intent) => intent,
                    None => break,
                },
                _ = self.shutdown.cancelled() => break,
            };
            self.execute(intent).await;
        }

        if let Some(timer) = self.pending.take() {
            timer.cancel();
        }
        info!("Sink worker stopped");
    }

    async fn execute(&mut self, intent: PlaybackIntent) {
        debug!("Executing {}", intent);

        let result = match &intent.action {
            PlaybackAction::Play { track, transition } => {
                self.cancel_pending();
                self.sink.play(track, *transition).await
            }
            PlaybackAction::Stop { transition } => {
                self.cancel_pending();
                self.sink.stop(*transition).await
            }
            PlaybackAction::AdjustVolume { level } => self.sink.set_volume(*level).await,
        };

        match result {
            Ok(()) => {
                if let Some(duration) = intent.transition().and_then(|t| t.duration()) {
                    self.arm_timer(intent.id, duration);
                }
            }
            Err(failure) => {
                warn!("Intent #{} failed: {}", intent.id, failure);
                let input = ControllerInput::PlaybackFailed {
                    intent_id: intent.id,
                    failure,
                };
                if self.feedback.send(input).is_err() {
                    debug!("Controller gone; failure of #{} not reported", intent.id);
                }
            }
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.cancel();
        }
    }

    fn arm_timer(&mut self, intent_id: u64, duration: std::time::Duration) {
        let token = self.shutdown.child_token();
        self.pending = Some(token.clone());

        let feedback = self.feedback.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Transition timer for #{} cancelled", intent_id);
                }
                _ = tokio::time::sleep(duration) => {
                    let _ = feedback.send(ControllerInput::TransitionComplete { intent_id });
                }
            }
        });
    }
}
