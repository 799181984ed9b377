use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::{clip_grad_norm, copy_params, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`DqnModel`].
pub struct DqnModelConfig<Q>
where
    Q: OutDim,
{
    pub(super) q_config: Option<Q>,
    pub(super) opt_config: OptimizerConfig,
    pub(super) max_grad_norm: Option<f64>,
}

impl<Q> Default for DqnModelConfig<Q>
where
    Q: OutDim,
{
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
            max_grad_norm: Some(10.0),
        }
    }
}

impl<Q> DqnModelConfig<Q>
where
    Q: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets the output dimension of the model.
    pub fn out_dim(mut self, v: i64) -> Self {
        match &mut self.q_config {
            None => {}
            Some(q_config) => q_config.set_out_dim(v),
        };
        self
    }

    /// Sets the optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the bound of the gradient norm. `None` disables clipping.
    pub fn max_grad_norm(mut self, v: Option<f64>) -> Self {
        self.max_grad_norm = v;
        self
    }

    /// Constructs [`DqnModelConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DqnModelConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// An action-value function with its variables and optimizer.
pub struct DqnModel<Q>
where
    Q: SubModel1<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    device: Device,
    varmap: VarMap,

    // Action-value function.
    q: Q,

    q_config: Q::Config,
    opt_config: OptimizerConfig,
    max_grad_norm: Option<f64>,
    opt: Optimizer,
}

impl<Q> DqnModel<Q>
where
    Q: SubModel1<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`DqnModel`].
    pub fn build(config: DqnModelConfig<Q::Config>, device: Device) -> Result<Self> {
        let q_config = config.q_config.context("q_config is not set")?;
        let opt_config = config.opt_config;
        let max_grad_norm = config.max_grad_norm;
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            Q::build(vb, q_config.clone())
        };
        let opt = opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            varmap,
            q,
            q_config,
            opt_config,
            max_grad_norm,
            opt,
        })
    }

    /// Outputs the action values given observation(s).
    pub fn forward(&self, obs: &Q::Input) -> Tensor {
        self.q.forward(obs)
    }

    /// Backpropagates the loss and applies an optimization step, clipping
    /// gradients to the configured norm.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self.max_grad_norm {
            None => self.opt.backward_step(loss),
            Some(max_norm) => {
                let mut grads = loss.backward()?;
                let _ = clip_grad_norm(&mut grads, &self.varmap.all_vars(), max_norm)?;
                self.opt.step(&grads)
            }
        }
    }

    /// The varmap holding the parameters.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters to the given path in safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Saved DQN model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters from the given path.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Loaded DQN model from {:?}", path.as_ref());
        Ok(())
    }
}

impl<Q> Clone for DqnModel<Q>
where
    Q: SubModel1<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Builds an independent model with the same configuration and copies
    /// the parameter values. The optimizer state is not shared.
    fn clone(&self) -> Self {
        let config = DqnModelConfig {
            q_config: Some(self.q_config.clone()),
            opt_config: self.opt_config.clone(),
            max_grad_norm: self.max_grad_norm,
        };
        let model = Self::build(config, self.device.clone()).unwrap();
        copy_params(&model.varmap, &self.varmap).unwrap();
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp, MlpConfig};
    use tempdir::TempDir;

    fn model() -> DqnModel<Mlp> {
        let config = DqnModelConfig::default().q_config(MlpConfig::new(8, vec![16], 5));
        DqnModel::build(config, Device::Cpu).unwrap()
    }

    #[test]
    fn test_clone_copies_parameters() {
        let m = model();
        let c = m.clone();
        let x = Tensor::rand(0f32, 1f32, (2, 8), &Device::Cpu).unwrap();
        let a = m.forward(&x).to_vec2::<f32>().unwrap();
        let b = c.forward(&x).to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_save_load_round_trip() -> Result<()> {
        let dir = TempDir::new("dqn_model")?;
        let path = dir.path().join("qnet.safetensors");

        let m = model();
        m.save(&path)?;

        let mut other = model();
        other.load(&path)?;

        let x = Tensor::rand(0f32, 1f32, (3, 8), &Device::Cpu)?;
        assert_eq!(
            m.forward(&x).to_vec2::<f32>()?,
            other.forward(&x).to_vec2::<f32>()?
        );
        Ok(())
    }
}
