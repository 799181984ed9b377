//! Configuration of the DQN agent.
use super::{explorer::EpsilonGreedy, model::DqnModelConfig};
use crate::{
    util::{CriticLoss, OutDim},
    Device,
};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Dqn`](super::Dqn).
///
/// `Q` is the configuration type of the action-value network. The
/// Double-DQN target computation is a flag on this configuration, selected
/// at construction, not a separate agent type.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DqnConfig<Q>
where
    Q: OutDim,
{
    /// Configuration of the action-value model.
    pub model_config: DqnModelConfig<Q>,

    /// Batch size of optimization steps.
    pub batch_size: usize,

    /// Minimum number of stored transitions before optimization starts.
    pub min_transitions_warmup: usize,

    /// Discount factor.
    pub discount_factor: f64,

    /// Interval of hard target-network synchronization in optimization steps.
    pub target_sync_interval: usize,

    /// Selects the Double-DQN target: the next action is chosen by the
    /// online network and evaluated by the target network.
    pub double_dqn: bool,

    /// Epsilon-greedy exploration schedule.
    pub explorer: EpsilonGreedy,

    /// Loss of the value regression.
    pub critic_loss: CriticLoss,

    /// Device on which the networks live.
    pub device: Device,

    /// Seed of the exploration random number generator.
    pub seed: u64,
}

impl<Q> Default for DqnConfig<Q>
where
    Q: OutDim,
{
    fn default() -> Self {
        Self {
            model_config: DqnModelConfig::default(),
            batch_size: 64,
            min_transitions_warmup: 64,
            discount_factor: 0.99,
            target_sync_interval: 1000,
            double_dqn: false,
            explorer: EpsilonGreedy::default(),
            critic_loss: CriticLoss::SmoothL1,
            device: Device::Cpu,
            seed: 42,
        }
    }
}

impl<Q> DqnConfig<Q>
where
    Q: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Sets the model configuration.
    pub fn model_config(mut self, v: DqnModelConfig<Q>) -> Self {
        self.model_config = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the warmup transition count.
    pub fn min_transitions_warmup(mut self, v: usize) -> Self {
        self.min_transitions_warmup = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets the target synchronization interval.
    pub fn target_sync_interval(mut self, v: usize) -> Self {
        self.target_sync_interval = v;
        self
    }

    /// Selects vanilla or Double-DQN targets.
    pub fn double_dqn(mut self, v: bool) -> Self {
        self.double_dqn = v;
        self
    }

    /// Sets the exploration schedule.
    pub fn explorer(mut self, v: EpsilonGreedy) -> Self {
        self.explorer = v;
        self
    }

    /// Sets the critic loss.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the exploration seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`DqnConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DqnConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
