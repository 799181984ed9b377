//! Observation of the microgrid environment.
use gridrl_core::Obs;

/// Dimension of the observation vector.
pub const OBS_DIM: usize = 8;

/// Normalized observation of the microgrid.
///
/// Components, all clamped to `[0, 1]`:
/// battery fraction, demand fraction, solar fraction, wind fraction,
/// normalized price, sin/cos of the hour angle rescaled to `[0, 1]`,
/// previous-action fraction.
#[derive(Debug, Clone)]
pub struct MicrogridObs {
    /// The observation vector.
    pub obs: [f32; OBS_DIM],
}

impl MicrogridObs {
    /// Wraps a raw observation vector.
    pub fn new(obs: [f32; OBS_DIM]) -> Self {
        Self { obs }
    }
}

impl Obs for MicrogridObs {
    fn dummy(_n: usize) -> Self {
        Self {
            obs: [0.0; OBS_DIM],
        }
    }

    fn len(&self) -> usize {
        1
    }
}
