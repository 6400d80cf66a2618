//! Session sources
//!
//! A [`SessionConnector`] opens one session per call. The supervisor owns the
//! retry loop; connectors only report whether an attempt worked.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use mwmc_common::{EventKind, Error, RawSessionMessage, Result};
use tracing::{debug, info};

use crate::error::ConnectError;

/// Messages of one open session; ends (or errors) when the session drops
pub type SessionStream = BoxStream<'static, std::result::Result<RawSessionMessage, ConnectError>>;

/// Opens sessions with the game server
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> std::result::Result<SessionStream, ConnectError>;
}

/// Replays a recorded JSON-lines session
///
/// Each non-empty line is one [`RawSessionMessage`]; lines starting with `#`
/// are comments. A `disconnected` line ends the current session, and the next
/// `connect` continues with the lines after it. The last session stays open
/// after its final message so the music keeps playing.
pub struct ReplayConnector {
    sessions: Mutex<VecDeque<Vec<RawSessionMessage>>>,
    pace: Duration,
}

impl ReplayConnector {
    /// Parse a replay file
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the file cannot be read or a line is not a
    /// valid raw message.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read replay {:?}: {}", path, e)))?;
        let connector = Self::from_json_lines(&text)?;
        info!(
            "Loaded replay {:?} with {} session(s)",
            path,
            connector.remaining_sessions()
        );
        Ok(connector)
    }

    pub fn from_json_lines(text: &str) -> Result<Self> {
        let mut sessions = VecDeque::new();
        let mut current = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let raw: RawSessionMessage = serde_json::from_str(line)
                .map_err(|e| Error::Config(format!("replay line {}: {}", index + 1, e)))?;

            if raw.kind.parse::<EventKind>().ok() == Some(EventKind::Disconnected) {
                sessions.push_back(std::mem::take(&mut current));
            } else {
                current.push(raw);
            }
        }
        sessions.push_back(current);

        Ok(Self {
            sessions: Mutex::new(sessions),
            pace: Duration::ZERO,
        })
    }

    /// Wait `pace` before delivering each message
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn remaining_sessions(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SessionConnector for ReplayConnector {
    async fn connect(&self) -> std::result::Result<SessionStream, ConnectError> {
        let (messages, last) = {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| ConnectError::Transport("replay state poisoned".to_string()))?;
            let messages = sessions
                .pop_front()
                .ok_or_else(|| ConnectError::Refused("replay exhausted".to_string()))?;
            (messages, sessions.is_empty())
        };
        debug!("Replaying session of {} messages", messages.len());

        let pace = self.pace;
        let replay = stream::iter(messages).then(move |raw| async move {
            if !pace.is_zero() {
                tokio::time::sleep(pace).await;
            }
            Ok::<_, ConnectError>(raw)
        });

        if last {
            Ok(replay.chain(stream::pending()).boxed())
        } else {
            Ok(replay.boxed())
        }
    }
}
