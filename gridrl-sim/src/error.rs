//! Errors of the simulation crate.
use thiserror::Error;

/// Errors raised by the microgrid environment.
#[derive(Debug, Error)]
pub enum MicrogridError {
    /// An action code outside the five routing policies.
    #[error("invalid action code {0}, expected 0..=4")]
    InvalidAction(i64),

    /// A configuration failed validation at construction time.
    #[error("invalid environment configuration: {0}")]
    InvalidConfig(String),
}
