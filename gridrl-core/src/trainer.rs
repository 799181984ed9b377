//! Episode-driven training loop.
mod config;
mod sampler;
use crate::{
    record::{Recorder, RecordValue::Scalar},
    Agent, Env, Evaluator, ExperienceBufferBase, ReplayBufferBase, StepProcessor,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::info;
pub use sampler::Sampler;
use std::path::Path;

/// Manages the training loop.
///
/// The loop interleaves environment steps and optimization steps:
///
/// 1. Perform an environment step through [`Sampler`] and push the resulting
///    transition into the buffer.
/// 2. After the warmup period, every `opt_interval` environment steps invoke
///    [`Agent::opt`]. The agent may skip the step (e.g. the buffer does not
///    hold a full batch yet).
/// 3. When an episode ends, merge the agent's episode-end record (e.g. the
///    exploration rate after decay) into the episode record and store it in
///    the recorder. Every `flush_record_interval` episodes the aggregated
///    records are flushed to the history log.
/// 4. Every `eval_interval` episodes the agent is evaluated; the model with
///    the best mean return so far is kept under `<model_dir>/best`.
/// 5. Every `save_interval` episodes a snapshot is saved under
///    `<model_dir>/<episode>`.
///
/// Training stops after `max_episodes` episodes.
pub struct Trainer {
    config: TrainerConfig,
    max_eval_reward: f32,
}

impl Trainer {
    /// Builds a trainer from the given configuration.
    pub fn build(config: TrainerConfig) -> Self {
        Self {
            config,
            max_eval_reward: f32::MIN,
        }
    }

    fn save_model<E, R, A>(agent: &A, model_dir: &str)
    where
        E: Env,
        R: ReplayBufferBase,
        A: Agent<E, R>,
    {
        match agent.save_params(Path::new(model_dir)) {
            Ok(()) => info!("Saved the model in {:?}", model_dir),
            Err(e) => info!("Failed to save model in {:?}: {:?}", model_dir, e),
        }
    }

    /// Runs the training loop.
    pub fn train<E, P, A, R, D>(
        &mut self,
        env: E,
        step_proc: P,
        agent: &mut A,
        buffer: &mut R,
        recorder: &mut Box<dyn Recorder>,
        evaluator: &mut D,
    ) -> Result<()>
    where
        E: Env,
        P: StepProcessor<E>,
        A: Agent<E, R>,
        R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
        D: Evaluator<E>,
    {
        let mut sampler = Sampler::new(env, step_proc);
        let mut env_steps: usize = 0;
        let mut opt_steps: usize = 0;
        let mut episodes: usize = 0;
        agent.train();

        loop {
            let (mut record, is_done) = sampler.sample_and_push(agent, buffer)?;
            env_steps += 1;

            if env_steps >= self.config.warmup_period && env_steps % self.config.opt_interval == 0 {
                if let Some(record_agent) = agent.opt(buffer) {
                    opt_steps += 1;
                    record = record.merge(record_agent);
                }
            }

            if !is_done {
                if !record.is_empty() {
                    recorder.store(record);
                }
                continue;
            }

            episodes += 1;
            record = record.merge(agent.on_episode_end());

            if episodes % self.config.eval_interval == 0 {
                agent.eval();
                let record_eval = evaluator.evaluate(agent)?;
                agent.train();
                let eval_reward = record_eval.get_scalar("episode_return")?;
                info!(
                    "Episode {} ({} opt steps): eval mean return {:.2}",
                    episodes, opt_steps, eval_reward
                );
                record.insert("eval_reward", Scalar(eval_reward));

                // Keep the best model seen across evaluations.
                if eval_reward > self.max_eval_reward {
                    self.max_eval_reward = eval_reward;
                    if let Some(model_dir) = self.config.model_dir.as_ref() {
                        let dir = format!("{}/best", model_dir);
                        Self::save_model::<E, R, A>(agent, &dir);
                    }
                }
            }

            recorder.store(record);

            if episodes % self.config.flush_record_interval == 0 {
                recorder.flush(episodes as _);
            }

            if self.config.save_interval > 0 && episodes % self.config.save_interval == 0 {
                if let Some(model_dir) = self.config.model_dir.as_ref() {
                    let dir = format!("{}/{}", model_dir, episodes);
                    Self::save_model::<E, R, A>(agent, &dir);
                }
            }

            if episodes >= self.config.max_episodes {
                break;
            }
        }

        if let Some(model_dir) = self.config.model_dir.as_ref() {
            let dir = format!("{}/final", model_dir);
            Self::save_model::<E, R, A>(agent, &dir);
        }

        Ok(())
    }
}
