//! Connection supervisor
//!
//! Owns the retry loop around a [`SessionConnector`] and turns connectivity
//! changes into ordinary session messages.
//!
//! **Loop:**
//! ```text
//! Connecting ──ok──► epoch += 1, emit Connected{epoch}
//!     ▲                  │ forward messages (stamped with epoch)
//!     │                  ▼
//!  backoff ◄── emit Disconnected{epoch} ◄── stream ends / errors
//! ```
//!
//! The retry counter resets once a session has stayed up for `stable_after`.
//! Failures are never fatal; the loop ends only when cancelled.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use mwmc_common::events::{ConnectionState, ConnectionStatus};
use mwmc_common::RawSessionMessage;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::connector::{SessionConnector, SessionStream};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Stream ended or errored; reconnect
    Dropped,
    /// Cancelled or nobody is listening any more
    Stopped,
}

pub struct ConnectionSupervisor {
    connector: Arc<dyn SessionConnector>,
    backoff: BackoffPolicy,
    stable_after: Duration,
    raw_tx: mpsc::UnboundedSender<RawSessionMessage>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,

    epoch: u64,
    retry_count: u32,
}

impl ConnectionSupervisor {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        backoff: BackoffPolicy,
        stable_after: Duration,
        raw_tx: mpsc::UnboundedSender<RawSessionMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::new());
        Self {
            connector,
            backoff,
            stable_after,
            raw_tx,
            state_tx,
            shutdown,
            epoch: 0,
            retry_count: 0,
        }
    }

    /// Subscribe to connection state snapshots
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Connection supervisor started");

        loop {
            self.publish(ConnectionStatus::Connecting);
            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                attempt = self.connector.connect() => attempt,
            };

            match attempt {
                Ok(stream) => {
                    if self.run_session(stream).await == SessionEnd::Stopped {
                        break;
                    }
                }
                Err(e) => warn!("Connection attempt {} failed: {}", self.retry_count + 1, e),
            }

            let delay = self.backoff.next(self.retry_count);
            self.retry_count = self.retry_count.saturating_add(1);
            self.publish(ConnectionStatus::Disconnected);
            info!(
                "Reconnecting in {:?} (attempt {})",
                delay, self.retry_count
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.publish(ConnectionStatus::Disconnected);
        info!("Connection supervisor stopped");
    }

    /// Drive one open session until it drops
    async fn run_session(&mut self, mut stream: SessionStream) -> SessionEnd {
        self.epoch += 1;
        let epoch = self.epoch;
        let reconnect = epoch > 1;
        let started = Instant::now();

        info!("Session epoch {} connected", epoch);
        self.publish(if reconnect {
            ConnectionStatus::Resyncing
        } else {
            ConnectionStatus::Connected
        });
        if !self.forward(RawSessionMessage::connected(epoch)) {
            return SessionEnd::Stopped;
        }

        let mut awaiting_first = reconnect;
        let end = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break SessionEnd::Stopped,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(raw)) => {
                    if awaiting_first {
                        awaiting_first = false;
                        self.publish(ConnectionStatus::Connected);
                    }
                    if !self.forward(raw.with_epoch(epoch)) {
                        break SessionEnd::Stopped;
                    }
                }
                Some(Err(e)) => {
                    warn!("Session epoch {} lost: {}", epoch, e);
                    break SessionEnd::Dropped;
                }
                None => {
                    info!("Session epoch {} closed by server", epoch);
                    break SessionEnd::Dropped;
                }
            }
        };

        let _ = self.raw_tx.send(RawSessionMessage::disconnected(epoch));

        if started.elapsed() >= self.stable_after {
            debug!(
                "Session epoch {} was stable for {:?}; resetting backoff",
                epoch,
                started.elapsed()
            );
            self.retry_count = 0;
        }
        end
    }

    fn forward(&self, raw: RawSessionMessage) -> bool {
        if self.raw_tx.send(raw).is_err() {
            debug!("Session message receiver closed");
            return false;
        }
        true
    }

    fn publish(&self, status: ConnectionStatus) {
        let epoch = self.epoch;
        let retry_count = self.retry_count;
        self.state_tx.send_modify(|state| {
            state.transition(status);
            state.epoch = epoch;
            state.retry_count = retry_count;
        });
    }
}
