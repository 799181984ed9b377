//! Environment step.
use super::Env;

/// Additional information attached to [`Step`] by the environment.
pub trait Info {}

impl Info for () {}

/// Represents an action, observation and reward tuple `(a_t, o_t+1, r_t)`
/// with some additional information.
///
/// An environment emits a [`Step`] object at every interaction step.
/// This object is used to create transitions `(o_t, a_t, o_t+1, r_t)`.
pub struct Step<E: Env> {
    /// Action.
    pub act: E::Act,

    /// Observation after taking the action.
    pub obs: E::Obs,

    /// Reward.
    pub reward: Vec<f32>,

    /// Flag denoting if the episode was terminated by the environment.
    pub is_terminated: Vec<i8>,

    /// Flag denoting if the episode was truncated (e.g. a time limit).
    pub is_truncated: Vec<i8>,

    /// Information defined by the environment.
    pub info: E::Info,

    /// Initial observation of the next episode. `None` unless the episode
    /// ended and the environment was reset.
    pub init_obs: Option<E::Obs>,
}

impl<E: Env> Step<E> {
    /// Constructs a [`Step`] object.
    pub fn new(
        obs: E::Obs,
        act: E::Act,
        reward: Vec<f32>,
        is_terminated: Vec<i8>,
        is_truncated: Vec<i8>,
        info: E::Info,
        init_obs: Option<E::Obs>,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
            is_truncated,
            info,
            init_obs,
        }
    }

    #[inline]
    /// Terminated or truncated.
    pub fn is_done(&self) -> bool {
        self.is_terminated[0] == 1 || self.is_truncated[0] == 1
    }
}

/// Processes [`Step`] objects into items a buffer accepts.
///
/// This trait is used in [`Trainer`](crate::Trainer). A [`Step`] object is
/// transformed into [`Self::Output`], which is pushed into a buffer
/// implementing [`ExperienceBufferBase`](crate::ExperienceBufferBase).
/// [`Self::Output`] should equal the buffer's
/// [`Item`](crate::ExperienceBufferBase::Item) type.
pub trait StepProcessor<E: Env> {
    /// Configuration.
    type Config: Clone;

    /// The type of transitions produced.
    type Output;

    /// Builds the processor.
    fn build(config: &Self::Config) -> Self;

    /// Resets the processor with the initial observation of an episode.
    fn reset(&mut self, init_obs: E::Obs);

    /// Processes a [`Step`] object.
    fn process(&mut self, step: Step<E>) -> Self::Output;
}
