//! Exploration strategy of DQN.
use candle_core::{shape::D, DType, Tensor};
use rand::{rngs::SmallRng, Rng};
use serde::{Deserialize, Serialize};

/// Epsilon-greedy action selection.
///
/// With probability `eps` a uniformly random action is taken, otherwise the
/// argmax of the action values. `eps` decays geometrically once per episode
/// down to `eps_final`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpsilonGreedy {
    pub(super) eps: f64,
    pub(super) eps_final: f64,
    pub(super) eps_decay: f64,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self {
            eps: 1.0,
            eps_final: 0.01,
            eps_decay: 0.995,
        }
    }
}

impl EpsilonGreedy {
    /// Constructs an epsilon-greedy explorer with the default schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial epsilon.
    pub fn eps_start(mut self, v: f64) -> Self {
        self.eps = v;
        self
    }

    /// Sets the epsilon floor.
    pub fn eps_final(mut self, v: f64) -> Self {
        self.eps_final = v;
        self
    }

    /// Sets the per-episode decay factor.
    pub fn eps_decay(mut self, v: f64) -> Self {
        self.eps_decay = v;
        self
    }

    /// The current exploration rate.
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Takes an action based on action values, returning an i64 tensor.
    ///
    /// * `a` - action values of shape `[n, n_actions]`.
    pub fn action(&self, a: &Tensor, rng: &mut SmallRng) -> Tensor {
        let is_random = rng.gen::<f64>() < self.eps;

        if is_random {
            let n_samples = a.dims()[0];
            let n_actions = a.dims()[1] as i64;
            Tensor::from_vec(
                (0..n_samples)
                    .map(|_| rng.gen_range(0..n_actions))
                    .collect::<Vec<_>>(),
                (n_samples,),
                a.device(),
            )
            .unwrap()
        } else {
            a.argmax(D::Minus1).unwrap().to_dtype(DType::I64).unwrap()
        }
    }

    /// Applies the geometric per-episode decay: `eps <- max(eps_final, eps * eps_decay)`.
    pub fn decay(&mut self) {
        self.eps = self.eps_final.max(self.eps * self.eps_decay);
    }
}

#[cfg(test)]
mod tests {
    use super::EpsilonGreedy;

    #[test]
    fn test_geometric_decay_with_floor() {
        let mut explorer = EpsilonGreedy::new().eps_start(1.0).eps_final(0.1).eps_decay(0.5);
        explorer.decay();
        assert!((explorer.eps() - 0.5).abs() < 1e-12);
        explorer.decay();
        assert!((explorer.eps() - 0.25).abs() < 1e-12);
        for _ in 0..10 {
            explorer.decay();
        }
        assert_eq!(explorer.eps(), 0.1);
    }
}
