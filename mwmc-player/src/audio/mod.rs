//! Audio sink boundary
//!
//! The controller never touches audio devices. It hands [`PlaybackIntent`]s to
//! a [`SinkWorker`] which executes them in order against an [`AudioSink`] and
//! reports completions and failures back into the processing queue.
//!
//! [`PlaybackIntent`]: mwmc_common::PlaybackIntent

pub mod sink;
pub mod worker;

pub use sink::{AudioSink, TracingSink};
pub use worker::SinkWorker;
