//! Scheduling the exponent of importance weights for PER.
use serde::{Deserialize, Serialize};

/// Linear scheduler of the importance-weight exponent `beta`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwScheduler {
    /// Initial value of beta.
    pub beta_0: f32,

    /// Final value of beta.
    pub beta_final: f32,

    /// Optimization steps at which beta reaches its final value.
    pub n_opts_final: usize,

    /// Current optimization steps.
    pub n_opts: usize,
}

impl IwScheduler {
    /// Creates a scheduler.
    pub fn new(beta_0: f32, beta_final: f32, n_opts_final: usize) -> Self {
        Self {
            beta_0,
            beta_final,
            n_opts_final,
            n_opts: 0,
        }
    }

    /// The exponent of the importance sampling weight at the current step.
    pub fn beta(&self) -> f32 {
        let n_opts = self.n_opts;
        if n_opts >= self.n_opts_final {
            self.beta_final
        } else {
            let d = self.beta_final - self.beta_0;
            self.beta_0 + d * (n_opts as f32 / self.n_opts_final as f32)
        }
    }

    /// Counts an optimization step, annealing beta toward its final value.
    pub fn add_n_opts(&mut self) {
        self.n_opts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::IwScheduler;

    #[test]
    fn test_beta_anneals_linearly_to_final() {
        let mut s = IwScheduler::new(0.4, 1.0, 10);
        assert!((s.beta() - 0.4).abs() < 1e-6);

        for _ in 0..5 {
            s.add_n_opts();
        }
        assert!((s.beta() - 0.7).abs() < 1e-6);

        for _ in 0..10 {
            s.add_n_opts();
        }
        assert!((s.beta() - 1.0).abs() < 1e-6);
    }
}
