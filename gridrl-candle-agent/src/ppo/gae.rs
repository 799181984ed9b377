//! Generalized advantage estimation.

/// Computes advantages and returns by reverse accumulation.
///
/// `delta_t = r_t + gamma * V(s_{t+1}) * (1 - done_t) - V(s_t)` and
/// `A_t = delta_t + gamma * lambda * (1 - done_t) * A_{t+1}`, iterated
/// backward from the end of the rollout. `bootstrap_value` is the critic's
/// estimate of the state following the rollout. Returns are `A_t + V(s_t)`.
///
/// `lambda = 0` reduces to one-step TD errors, `lambda = 1` to the
/// Monte-Carlo return minus the value baseline.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[f32],
    bootstrap_value: f32,
    gamma: f32,
    lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    assert_eq!(values.len(), n);
    assert_eq!(dones.len(), n);

    let mut advantages = vec![0f32; n];
    let mut gae = 0f32;

    for t in (0..n).rev() {
        let next_value = if t + 1 < n {
            values[t + 1]
        } else {
            bootstrap_value
        };
        let not_done = 1.0 - dones[t];
        let delta = rewards[t] + gamma * next_value * not_done - values[t];
        gae = delta + gamma * lambda * not_done * gae;
        advantages[t] = gae;
    }

    let returns = advantages
        .iter()
        .zip(values.iter())
        .map(|(a, v)| a + v)
        .collect();

    (advantages, returns)
}

#[cfg(test)]
mod tests {
    use super::compute_gae;

    const REWARDS: [f32; 3] = [1.0, 2.0, 3.0];
    const VALUES: [f32; 3] = [0.5, 1.0, 1.5];
    const BOOTSTRAP: f32 = 2.0;
    const GAMMA: f32 = 0.9;

    #[test]
    fn test_lambda_zero_reduces_to_td_errors() {
        let dones = [0.0, 0.0, 0.0];
        let (adv, _) = compute_gae(&REWARDS, &VALUES, &dones, BOOTSTRAP, GAMMA, 0.0);

        let deltas = [
            1.0 + 0.9 * 1.0 - 0.5,
            2.0 + 0.9 * 1.5 - 1.0,
            3.0 + 0.9 * 2.0 - 1.5,
        ];
        for (a, d) in adv.iter().zip(deltas.iter()) {
            assert!((a - d).abs() < 1e-6);
        }
    }

    #[test]
    fn test_lambda_one_reduces_to_monte_carlo_minus_baseline() {
        let dones = [0.0, 0.0, 0.0];
        let (adv, returns) = compute_gae(&REWARDS, &VALUES, &dones, BOOTSTRAP, GAMMA, 1.0);

        // Discounted returns bootstrapped from the trailing value estimate.
        let g2 = 3.0 + 0.9 * BOOTSTRAP;
        let g1 = 2.0 + 0.9 * g2;
        let g0 = 1.0 + 0.9 * g1;

        for (a, (g, v)) in adv.iter().zip([g0, g1, g2].iter().zip(VALUES.iter())) {
            assert!((a - (g - v)).abs() < 1e-5);
        }
        for (r, g) in returns.iter().zip([g0, g1, g2].iter()) {
            assert!((r - g).abs() < 1e-5);
        }
    }

    #[test]
    fn test_done_cuts_the_accumulation() {
        let dones = [0.0, 1.0, 0.0];
        let (adv, _) = compute_gae(&REWARDS, &VALUES, &dones, BOOTSTRAP, GAMMA, 1.0);

        // The terminal flag at t=1 removes both the bootstrap of delta_1 and
        // the propagation of A_2 into A_1.
        let delta_1 = 2.0 - 1.0;
        assert!((adv[1] - delta_1).abs() < 1e-6);

        let delta_0 = 1.0 + 0.9 * 1.0 - 0.5;
        assert!((adv[0] - (delta_0 + 0.9 * adv[1])).abs() < 1e-6);
    }
}
