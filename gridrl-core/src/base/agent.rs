//! Agent.
use super::{Env, Policy, ReplayBufferBase};
use crate::record::Record;
use anyhow::Result;
use std::path::Path;

/// Represents a trainable policy on an environment.
pub trait Agent<E: Env, R: ReplayBufferBase>: Policy<E> {
    /// Sets the policy to training mode.
    fn train(&mut self);

    /// Sets the policy to evaluation mode.
    fn eval(&mut self);

    /// Returns `true` if the policy is in training mode.
    fn is_train(&self) -> bool;

    /// Performs an optimization step.
    ///
    /// `buffer` is the buffer from which transitions are taken for updating
    /// model parameters. Returns `None` when the agent skipped the step,
    /// for example because the buffer does not hold a batch yet.
    fn opt(&mut self, buffer: &mut R) -> Option<Record>;

    /// Called by the trainer when an episode finishes.
    ///
    /// Agents that keep per-episode schedules (e.g. exploration decay) hook
    /// in here. The returned record is merged into the episode record.
    fn on_episode_end(&mut self) -> Record {
        Record::empty()
    }

    /// Saves the parameters of the agent in the given directory.
    ///
    /// This method commonly creates a number of files in the directory. For
    /// example, the DQN agent saves the online and target Q-networks plus a
    /// file of learner scalars.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
