//! PPO agent.
mod actor_critic;
mod base;
mod config;
mod gae;
mod model;
pub use actor_critic::{ActorCritic, ActorCriticConfig};
pub use base::Ppo;
pub use config::PpoConfig;
pub use gae::compute_gae;
pub use model::{PpoModel, PpoModelConfig};
