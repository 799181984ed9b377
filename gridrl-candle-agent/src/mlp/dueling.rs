use super::DuelingMlpConfig;
use crate::model::SubModel1;
use candle_core::{shape::D, Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Dueling value network.
///
/// A shared ReLU trunk feeds a value stream `V(s)` and an advantage stream
/// `A(s, a)`, combined as `Q = V + (A - mean(A))`. The mean subtraction
/// keeps the decomposition identifiable.
pub struct DuelingMlp {
    device: Device,
    trunk: Vec<Linear>,
    value: Vec<Linear>,
    advantage: Vec<Linear>,
}

fn forward_stack(mut xs: Tensor, layers: &[Linear], relu_last: bool) -> Tensor {
    let n = layers.len();
    for (i, layer) in layers.iter().enumerate() {
        xs = layer.forward(&xs).unwrap();
        if relu_last || i + 1 < n {
            xs = xs.relu().unwrap();
        }
    }
    xs
}

impl SubModel1 for DuelingMlp {
    type Config = DuelingMlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(vs: VarBuilder, config: Self::Config) -> Self {
        assert!(
            config.units.len() >= 2,
            "dueling network needs at least two hidden layers, got {:?}",
            config.units
        );

        let device = vs.device().clone();
        let (trunk_units, stream_hidden) = {
            let n = config.units.len();
            (&config.units[..n - 1], config.units[n - 1])
        };

        let trunk = {
            let vs = vs.pp("trunk");
            let mut layers = vec![];
            let mut in_dim = config.in_dim;
            for (i, &out) in trunk_units.iter().enumerate() {
                layers.push(
                    linear(in_dim as usize, out as usize, vs.pp(format!("ln{}", i))).unwrap(),
                );
                in_dim = out;
            }
            layers
        };
        let trunk_out = *trunk_units.last().unwrap();

        let value = {
            let vs = vs.pp("value");
            vec![
                linear(trunk_out as usize, stream_hidden as usize, vs.pp("ln0")).unwrap(),
                linear(stream_hidden as usize, 1, vs.pp("ln1")).unwrap(),
            ]
        };
        let advantage = {
            let vs = vs.pp("advantage");
            vec![
                linear(trunk_out as usize, stream_hidden as usize, vs.pp("ln0")).unwrap(),
                linear(stream_hidden as usize, config.out_dim as usize, vs.pp("ln1")).unwrap(),
            ]
        };

        Self {
            device,
            trunk,
            value,
            advantage,
        }
    }

    fn forward(&self, xs: &Self::Input) -> Tensor {
        let xs = xs.to_device(&self.device).unwrap();
        let features = forward_stack(xs, &self.trunk, true);

        let value = forward_stack(features.clone(), &self.value, false);
        let advantage = forward_stack(features, &self.advantage, false);

        let advantage_mean = advantage.mean_keepdim(D::Minus1).unwrap();
        let centered = advantage.broadcast_sub(&advantage_mean).unwrap();
        value.broadcast_add(&centered).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_forward_shape_and_mean_centering() {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let net = DuelingMlp::build(vs, DuelingMlpConfig::new(8, vec![32, 32, 16], 5));

        let x = Tensor::rand(0f32, 1f32, (4, 8), &Device::Cpu).unwrap();
        let q = net.forward(&x);
        assert_eq!(q.dims(), &[4, 5]);
    }

    #[test]
    #[should_panic]
    fn test_too_shallow_config_is_rejected() {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let _ = DuelingMlp::build(vs, DuelingMlpConfig::new(8, vec![32], 5));
    }
}
