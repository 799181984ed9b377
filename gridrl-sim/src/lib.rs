#![warn(missing_docs)]
//! Microgrid energy-dispatch simulation environment.
//!
//! The environment models one day of operation of a small grid with a
//! battery, solar and wind generation, a grid connection with time-of-use
//! pricing and stochastic consumer demand. At every hour the agent picks one
//! of five energy-routing policies; the reward trades off renewable
//! utilization, grid cost, unmet demand and battery wear.
//!
//! Two named parameter presets are provided, matching the two variants of
//! the system this crate models; see [`MicrogridEnvConfig`].
mod act;
pub mod candle;
mod config;
mod env;
mod error;
mod exogenous;
mod obs;

pub use act::{EnergyAction, MicrogridAct};
pub use config::{MicrogridEnvConfig, RewardWeights};
pub use env::{EnergyFlows, MicrogridEnv, MicrogridInfo, TerminationReason};
pub use error::MicrogridError;
pub use exogenous::ExogenousDraw;
pub use obs::{MicrogridObs, OBS_DIM};
