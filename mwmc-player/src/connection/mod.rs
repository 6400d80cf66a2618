//! Session connectivity
//!
//! [`ConnectionSupervisor`] retries a [`SessionConnector`] with bounded
//! exponential backoff and feeds `Connected`/`Disconnected` into the same raw
//! message stream as game events.

pub mod backoff;
pub mod connector;
pub mod jitter;
pub mod supervisor;

pub use backoff::BackoffPolicy;
pub use connector::{ReplayConnector, SessionConnector, SessionStream};
pub use jitter::JitterPolicy;
pub use supervisor::ConnectionSupervisor;
