use super::{mlp_forward, MlpConfig};
use crate::model::SubModel1;
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// Returns a stack of linear modules from a configuration.
fn create_linear_layers(
    prefix: &str,
    vs: VarBuilder,
    in_dim: i64,
    units: &[i64],
    out_dim: i64,
) -> Result<Vec<Linear>> {
    let mut in_out_pairs: Vec<(i64, i64)> = (0..units.len().saturating_sub(1))
        .map(|i| (units[i], units[i + 1]))
        .collect();
    if let Some(&first) = units.first() {
        in_out_pairs.insert(0, (in_dim, first));
    }
    let last = units.last().copied().unwrap_or(in_dim);
    in_out_pairs.push((last, out_dim));
    let vs = vs.pp(prefix);

    Ok(in_out_pairs
        .iter()
        .enumerate()
        .map(|(i, &(in_dim, out_dim))| {
            linear(in_dim as usize, out_dim as usize, vs.pp(format!("ln{}", i))).unwrap()
        })
        .collect())
}

/// Multilayer perceptron with ReLU activations and a raw output layer.
pub struct Mlp {
    device: Device,
    layers: Vec<Linear>,
}

impl SubModel1 for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, xs: &Self::Input) -> Tensor {
        let xs = xs.to_device(&self.device).unwrap();
        mlp_forward(xs, &self.layers)
    }

    fn build(vs: VarBuilder, config: Self::Config) -> Self {
        let device = vs.device().clone();
        let layers =
            create_linear_layers("mlp", vs, config.in_dim, &config.units, config.out_dim).unwrap();

        Mlp { device, layers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_forward_shape() {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mlp = Mlp::build(vs, MlpConfig::new(8, vec![32, 16], 5));

        let x = Tensor::zeros((3, 8), DType::F32, &Device::Cpu).unwrap();
        let y = mlp.forward(&x);
        assert_eq!(y.dims(), &[3, 5]);
    }
}
