//! Environment.
use super::{Act, Info, Obs, Step};
use crate::record::Record;
use anyhow::Result;

/// Represents an environment, typically an MDP.
pub trait Env {
    /// Configuration of the environment.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Obs;

    /// Action of the environment.
    type Act: Act;

    /// Information in the [`Step`] object.
    type Info: Info;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Performs an environment step.
    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record)
    where
        Self: Sized;

    /// Resets the environment and returns the initial observation.
    ///
    /// The random state of the environment is kept; stochastic draws continue
    /// the sequence started by [`Env::build`].
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Resets the environment after reseeding its random state with the
    /// given index.
    ///
    /// The index is combined with the seed given at build time, which makes
    /// evaluation episodes reproducible. This method is called by
    /// [`DefaultEvaluator`](crate::DefaultEvaluator).
    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs>;

    /// Performs an environment step and resets the environment if the
    /// episode ends, filling [`Step::init_obs`] with the first observation
    /// of the next episode.
    fn step_with_reset(&mut self, a: &Self::Act) -> (Step<Self>, Record)
    where
        Self: Sized;
}
