//! Errors of the gridrl core crate.
use thiserror::Error;

/// Errors raised by buffers, records and configurations.
#[derive(Debug, Error)]
pub enum GridRlError {
    /// Requested more transitions than the buffer currently holds.
    #[error("insufficient data: requested {requested} transitions, buffer holds {stored}")]
    InsufficientData {
        /// Number of transitions requested.
        requested: usize,
        /// Number of transitions stored.
        stored: usize,
    },

    /// Random-access sampling was attempted on an on-policy buffer.
    #[error("on-policy buffer is consumed wholesale; use drain() instead of batch()")]
    OnPolicySampling,

    /// A record key was queried with the wrong value type.
    #[error("record value for key '{0}' has an unexpected type")]
    RecordValueType(String),

    /// A record key was not found.
    #[error("record key '{0}' not found")]
    RecordKeyNotFound(String),
}
