use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::{clip_grad_norm, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`PpoModel`].
pub struct PpoModelConfig<P>
where
    P: OutDim,
{
    pub(super) ac_config: Option<P>,
    pub(super) opt_config_actor: OptimizerConfig,
    pub(super) opt_config_critic: OptimizerConfig,
    pub(super) max_grad_norm: Option<f64>,
}

impl<P> Default for PpoModelConfig<P>
where
    P: OutDim,
{
    fn default() -> Self {
        Self {
            ac_config: None,
            opt_config_actor: OptimizerConfig::Adam { lr: 3e-4 },
            opt_config_critic: OptimizerConfig::Adam { lr: 1e-3 },
            max_grad_norm: Some(0.5),
        }
    }
}

impl<P> PpoModelConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the actor-critic network.
    pub fn ac_config(mut self, v: P) -> Self {
        self.ac_config = Some(v);
        self
    }

    /// Sets the output dimension of the model.
    pub fn out_dim(mut self, v: i64) -> Self {
        match &mut self.ac_config {
            None => {}
            Some(ac_config) => ac_config.set_out_dim(v),
        };
        self
    }

    /// Sets the optimizer of the trunk and the actor head.
    pub fn opt_config_actor(mut self, v: OptimizerConfig) -> Self {
        self.opt_config_actor = v;
        self
    }

    /// Sets the optimizer of the critic head.
    pub fn opt_config_critic(mut self, v: OptimizerConfig) -> Self {
        self.opt_config_critic = v;
        self
    }

    /// Sets the bound of the gradient norm. `None` disables clipping.
    pub fn max_grad_norm(mut self, v: Option<f64>) -> Self {
        self.max_grad_norm = v;
        self
    }

    /// Constructs [`PpoModelConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PpoModelConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// An actor-critic network with its variables and optimizers.
///
/// The trunk and actor head are trained by one optimizer, the critic head by
/// another with its own learning rate. Both steps consume the same gradient
/// store; each optimizer touches only its variables.
pub struct PpoModel<P>
where
    P: SubModel1<Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    device: Device,
    varmap: VarMap,
    p: P,
    max_grad_norm: Option<f64>,
    opt_actor: Optimizer,
    opt_critic: Optimizer,
}

impl<P> PpoModel<P>
where
    P: SubModel1<Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`PpoModel`].
    pub fn build(config: PpoModelConfig<P::Config>, device: Device) -> Result<Self> {
        let ac_config = config.ac_config.context("ac_config is not set")?;
        let varmap = VarMap::new();
        let p = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            P::build(vb, ac_config)
        };

        let (critic_vars, actor_vars): (Vec<Var>, Vec<Var>) = {
            let data = varmap.data().lock().unwrap();
            let mut critic = vec![];
            let mut actor = vec![];
            for (name, var) in data.iter() {
                if name.starts_with("critic") {
                    critic.push(var.clone());
                } else {
                    actor.push(var.clone());
                }
            }
            (critic, actor)
        };
        let opt_actor = config.opt_config_actor.build(actor_vars)?;
        let opt_critic = config.opt_config_critic.build(critic_vars)?;

        Ok(Self {
            device,
            varmap,
            p,
            max_grad_norm: config.max_grad_norm,
            opt_actor,
            opt_critic,
        })
    }

    /// Outputs `(logits, values)` given observation(s).
    pub fn forward(&self, obs: &P::Input) -> (Tensor, Tensor) {
        self.p.forward(obs)
    }

    /// Backpropagates the joint loss and steps both optimizers, clipping
    /// gradients to the configured global norm.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let mut grads = loss.backward()?;
        if let Some(max_norm) = self.max_grad_norm {
            let _ = clip_grad_norm(&mut grads, &self.varmap.all_vars(), max_norm)?;
        }
        self.opt_actor.step(&grads)?;
        self.opt_critic.step(&grads)?;
        Ok(())
    }

    /// The varmap holding the parameters.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters to the given path in safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Saved PPO model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters from the given path.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Loaded PPO model from {:?}", path.as_ref());
        Ok(())
    }
}
