//! Connection state types
//!
//! Owned by the connection supervisor; everyone else sees immutable snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connectivity status of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnected; waiting for the session to deliver its first message
    Resyncing,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Resyncing => write!(f, "resyncing"),
        }
    }
}

/// Snapshot of the supervisor's connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Epoch of the most recent successful connection (0 = never connected)
    pub epoch: u64,
    /// Consecutive failed attempts since the last stable connection
    pub retry_count: u32,
    /// When `status` last changed
    pub changed_at: DateTime<Utc>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            epoch: 0,
            retry_count: 0,
            changed_at: Utc::now(),
        }
    }

    /// Move to `status`, stamping the change time
    pub fn transition(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            self.changed_at = Utc::now();
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Connected | ConnectionStatus::Resyncing
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
