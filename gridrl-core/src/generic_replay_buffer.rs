//! Generic implementation of experience buffers.
//!
//! This module provides buffers that can store transitions of arbitrary
//! observation and action batch types:
//! - [`SimpleReplayBuffer`]: fixed-capacity ring buffer with uniform random
//!   sampling and an optional prioritized variant (PER).
//! - [`RolloutBuffer`]: ordered on-policy store drained wholesale at update
//!   time.
mod base;
mod batch;
mod config;
mod rollout;
mod step_proc;
pub use base::{IwScheduler, SimpleReplayBuffer, SumTree, WeightNormalizer};
pub use batch::{BatchBase, GenericTransitionBatch};
pub use config::{PerConfig, SimpleReplayBufferConfig};
pub use rollout::{RolloutBuffer, RolloutBufferConfig};
pub use step_proc::{SimpleStepProcessor, SimpleStepProcessorConfig};
