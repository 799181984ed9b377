//! Actor-critic network.
use crate::{model::SubModel1, util::OutDim};
use candle_core::{shape::D, Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`ActorCritic`].
pub struct ActorCriticConfig {
    pub(super) in_dim: i64,
    pub(super) units: Vec<i64>,
    pub(super) out_dim: i64,
}

impl ActorCriticConfig {
    /// Creates the configuration of an actor-critic network.
    pub fn new(in_dim: i64, units: Vec<i64>, out_dim: i64) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
        }
    }
}

impl OutDim for ActorCriticConfig {
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    fn set_out_dim(&mut self, out_dim: i64) {
        self.out_dim = out_dim;
    }
}

/// Shared-trunk actor-critic network.
///
/// A tanh trunk feeds two heads: the actor producing logits over the
/// discrete actions and the critic producing a scalar state value.
pub struct ActorCritic {
    device: Device,
    trunk: Vec<Linear>,
    actor: Linear,
    critic: Linear,
}

impl SubModel1 for ActorCritic {
    type Config = ActorCriticConfig;
    type Input = Tensor;
    type Output = (Tensor, Tensor);

    fn build(vs: VarBuilder, config: Self::Config) -> Self {
        assert!(
            !config.units.is_empty(),
            "actor-critic trunk needs at least one hidden layer"
        );

        let device = vs.device().clone();
        let trunk = {
            let vs = vs.pp("trunk");
            let mut layers = vec![];
            let mut in_dim = config.in_dim;
            for (i, &out) in config.units.iter().enumerate() {
                layers.push(
                    linear(in_dim as usize, out as usize, vs.pp(format!("ln{}", i))).unwrap(),
                );
                in_dim = out;
            }
            layers
        };
        let trunk_out = *config.units.last().unwrap() as usize;
        let actor = linear(trunk_out, config.out_dim as usize, vs.pp("actor")).unwrap();
        let critic = linear(trunk_out, 1, vs.pp("critic")).unwrap();

        Self {
            device,
            trunk,
            actor,
            critic,
        }
    }

    /// Returns `(logits, values)` of shapes `[n, n_actions]` and `[n]`.
    fn forward(&self, xs: &Self::Input) -> Self::Output {
        let mut xs = xs.to_device(&self.device).unwrap();
        for layer in self.trunk.iter() {
            xs = layer.forward(&xs).unwrap().tanh().unwrap();
        }

        let logits = self.actor.forward(&xs).unwrap();
        let values = self
            .critic
            .forward(&xs)
            .unwrap()
            .squeeze(D::Minus1)
            .unwrap();
        (logits, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_forward_shapes() {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let net = ActorCritic::build(vs, ActorCriticConfig::new(8, vec![64, 64], 5));

        let x = Tensor::rand(0f32, 1f32, (7, 8), &Device::Cpu).unwrap();
        let (logits, values) = net.forward(&x);
        assert_eq!(logits.dims(), &[7, 5]);
        assert_eq!(values.dims(), &[7]);
    }
}
