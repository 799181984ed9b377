//! Multilayer perceptrons for value estimation.
mod base;
mod config;
mod dueling;
pub use base::Mlp;
use candle_core::Tensor;
use candle_nn::{Linear, Module};
pub use config::{DuelingMlpConfig, MlpConfig};
pub use dueling::DuelingMlp;

/// ReLU between hidden layers, raw output at the last layer.
fn mlp_forward(xs: Tensor, layers: &[Linear]) -> Tensor {
    let n_layers = layers.len();
    let mut xs = xs;

    for layer in layers[..n_layers - 1].iter() {
        xs = layer.forward(&xs).unwrap().relu().unwrap();
    }

    layers[n_layers - 1].forward(&xs).unwrap()
}
