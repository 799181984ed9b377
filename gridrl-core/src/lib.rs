#![warn(missing_docs)]
//! Core abstractions of the gridrl reinforcement learning stack.
//!
//! This crate defines the interfaces between an environment, a trainable
//! policy and the experience buffers that connect them, together with the
//! generic pieces every algorithm shares: a ring-buffer replay store with
//! optional prioritized sampling, an on-policy rollout store, a record system
//! for training metrics, an episode-driven trainer and an evaluator.
pub mod error;
pub mod generic_replay_buffer;
pub mod record;

mod base;
pub use base::{
    Act, Agent, Configurable, Env, ExperienceBufferBase, Info, Obs, OnPolicyBuffer, Policy,
    ReplayBufferBase, Step, StepProcessor, TransitionBatch,
};

mod evaluator;
pub use evaluator::{DefaultEvaluator, Evaluator};

mod trainer;
pub use trainer::{Sampler, Trainer, TrainerConfig};
