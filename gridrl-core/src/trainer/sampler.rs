//! Sampling of experiences from an environment.
use crate::{
    record::{Record, RecordValue::Scalar},
    Env, ExperienceBufferBase, Policy, StepProcessor,
};
use anyhow::Result;

/// Interacts with an environment and pushes transitions into a buffer.
///
/// One call to [`Sampler::sample_and_push`] performs one environment step:
/// the agent samples an action, the environment applies it, the step is
/// processed into a transition and pushed. The sampler also accumulates the
/// episode return and length, which are reported in the record of the step
/// that ends an episode.
pub struct Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    env: E,
    prev_obs: Option<E::Obs>,
    step_processor: P,
    episode_return: f32,
    episode_length: usize,
}

impl<E, P> Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    /// Creates a sampler for the given environment and step processor.
    pub fn new(env: E, step_processor: P) -> Self {
        Self {
            env,
            prev_obs: None,
            step_processor,
            episode_return: 0.0,
            episode_length: 0,
        }
    }

    /// Samples a transition and pushes it into the given buffer.
    ///
    /// Returns the record of the step and whether the episode ended.
    pub fn sample_and_push<A, R>(&mut self, agent: &mut A, buffer: &mut R) -> Result<(Record, bool)>
    where
        A: Policy<E>,
        R: ExperienceBufferBase<Item = P::Output>,
    {
        // Lazily reset the environment at the start of training.
        if self.prev_obs.is_none() {
            self.prev_obs = Some(self.env.reset()?);
            self.step_processor
                .reset(self.prev_obs.as_ref().unwrap().clone());
        }

        let (step, mut record) = {
            let act = agent.sample(self.prev_obs.as_ref().unwrap());
            self.env.step_with_reset(&act)
        };
        let is_done = step.is_done();

        self.episode_return += step.reward[0];
        self.episode_length += 1;

        self.prev_obs = match is_done {
            true => Some(step.init_obs.clone().expect("Failed to unwrap init_obs")),
            false => Some(step.obs.clone()),
        };

        let transition = self.step_processor.process(step);
        buffer.push(transition)?;

        if is_done {
            record.insert("episode_return", Scalar(self.episode_return));
            record.insert("episode_length", Scalar(self.episode_length as f32));
            self.episode_return = 0.0;
            self.episode_length = 0;
            self.step_processor
                .reset(self.prev_obs.as_ref().unwrap().clone());
        }

        Ok((record, is_done))
    }
}
