//! RL agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! Two learners are provided: a value-based DQN agent (vanilla and double
//! targets, plain and dueling value networks) and a policy-gradient PPO
//! agent (actor-critic with generalized advantage estimation and a clipped
//! surrogate objective).
pub mod dqn;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod ppo;
pub mod util;
use serde::{Deserialize, Serialize};

/// Device for candle computations.
///
/// This enum exists because [`candle_core::Device`] does not support
/// serialization.
#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// A CUDA device.
    Cuda(usize),
}

impl From<candle_core::Device> for Device {
    fn from(device: candle_core::Device) -> Self {
        match device {
            candle_core::Device::Cpu => Self::Cpu,
            candle_core::Device::Cuda(_) => unimplemented!("cannot recover the CUDA ordinal"),
            _ => unimplemented!(),
        }
    }
}

impl From<Device> for candle_core::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => candle_core::Device::Cpu,
            Device::Cuda(n) => candle_core::Device::new_cuda(n).unwrap(),
        }
    }
}
