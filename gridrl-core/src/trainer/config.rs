//! Configuration of the trainer.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TrainerConfig {
    /// Number of episodes to train for.
    pub max_episodes: usize,

    /// Interval of optimization in environment steps.
    ///
    /// 1 for step-wise off-policy updates; the rollout length for on-policy
    /// agents that consume their buffer wholesale.
    pub opt_interval: usize,

    /// Environment steps before the first optimization, filling the buffer.
    pub warmup_period: usize,

    /// Interval of evaluation in episodes.
    pub eval_interval: usize,

    /// Interval of saving model parameters in episodes. 0 disables periodic
    /// snapshots (the best model is still tracked at evaluations).
    pub save_interval: usize,

    /// Interval of flushing aggregated records in episodes.
    pub flush_record_interval: usize,

    /// Directory where model parameters are saved.
    pub model_dir: Option<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_episodes: 500,
            opt_interval: 1,
            warmup_period: 0,
            eval_interval: 50,
            save_interval: 100,
            flush_record_interval: 10,
            model_dir: None,
        }
    }
}

impl TrainerConfig {
    /// Sets the number of training episodes.
    pub fn max_episodes(mut self, v: usize) -> Self {
        self.max_episodes = v;
        self
    }

    /// Sets the optimization interval in environment steps.
    pub fn opt_interval(mut self, v: usize) -> Self {
        self.opt_interval = v;
        self
    }

    /// Sets the warmup period in environment steps.
    pub fn warmup_period(mut self, v: usize) -> Self {
        self.warmup_period = v;
        self
    }

    /// Sets the evaluation interval in episodes.
    pub fn eval_interval(mut self, v: usize) -> Self {
        self.eval_interval = v;
        self
    }

    /// Sets the snapshot interval in episodes.
    pub fn save_interval(mut self, v: usize) -> Self {
        self.save_interval = v;
        self
    }

    /// Sets the record flush interval in episodes.
    pub fn flush_record_interval(mut self, v: usize) -> Self {
        self.flush_record_interval = v;
        self
    }

    /// Sets the directory where model parameters are saved.
    pub fn model_dir<T: Into<String>>(mut self, model_dir: T) -> Self {
        self.model_dir = Some(model_dir.into());
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
