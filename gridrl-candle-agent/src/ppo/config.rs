//! Configuration of the PPO agent.
use super::model::PpoModelConfig;
use crate::{util::OutDim, Device};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Ppo`](super::Ppo).
///
/// `P` is the configuration type of the actor-critic network.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PpoConfig<P>
where
    P: OutDim,
{
    /// Configuration of the actor-critic model.
    pub model_config: PpoModelConfig<P>,

    /// Discount factor.
    pub gamma: f64,

    /// Lambda of generalized advantage estimation.
    pub gae_lambda: f64,

    /// Clipping range of the surrogate objective.
    pub clip_eps: f64,

    /// Number of epochs over the rollout per update.
    pub opt_epochs: usize,

    /// Size of the shuffled minibatches within an epoch.
    pub minibatch_size: usize,

    /// Weight of the entropy bonus.
    pub entropy_coef: f64,

    /// Weight of the value loss.
    pub value_coef: f64,

    /// Device on which the network lives.
    pub device: Device,

    /// Seed of the sampling and shuffling random number generator.
    pub seed: u64,
}

impl<P> Default for PpoConfig<P>
where
    P: OutDim,
{
    fn default() -> Self {
        Self {
            model_config: PpoModelConfig::default(),
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_eps: 0.2,
            opt_epochs: 10,
            minibatch_size: 32,
            entropy_coef: 0.01,
            value_coef: 0.5,
            device: Device::Cpu,
            seed: 42,
        }
    }
}

impl<P> PpoConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Sets the model configuration.
    pub fn model_config(mut self, v: PpoModelConfig<P>) -> Self {
        self.model_config = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the GAE lambda.
    pub fn gae_lambda(mut self, v: f64) -> Self {
        self.gae_lambda = v;
        self
    }

    /// Sets the clipping range.
    pub fn clip_eps(mut self, v: f64) -> Self {
        self.clip_eps = v;
        self
    }

    /// Sets the number of update epochs.
    pub fn opt_epochs(mut self, v: usize) -> Self {
        self.opt_epochs = v;
        self
    }

    /// Sets the minibatch size.
    pub fn minibatch_size(mut self, v: usize) -> Self {
        self.minibatch_size = v;
        self
    }

    /// Sets the entropy coefficient.
    pub fn entropy_coef(mut self, v: f64) -> Self {
        self.entropy_coef = v;
        self
    }

    /// Sets the value loss coefficient.
    pub fn value_coef(mut self, v: f64) -> Self {
        self.value_coef = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`PpoConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PpoConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
