//! The microgrid environment.
use crate::{
    act::{EnergyAction, MicrogridAct},
    config::MicrogridEnvConfig,
    exogenous::ExogenousDraw,
    obs::{MicrogridObs, OBS_DIM},
};
use anyhow::Result;
use gridrl_core::{
    record::{Record, RecordValue},
    Env, Info, Step,
};
use rand::{rngs::StdRng, SeedableRng};
use std::convert::TryFrom;
use std::f64::consts::PI;
use std::fmt;

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The clock reached the configured episode length.
    EndOfDay,

    /// The battery fraction fell below the low-critical threshold.
    BatteryCriticalLow,

    /// The battery fraction exceeded the high-critical threshold.
    BatteryCriticalHigh,

    /// The cumulative unmet-demand ratio exceeded the configured maximum.
    MaxUnmetExceeded,
}

impl TerminationReason {
    /// Stable name of the reason, used in records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndOfDay => "end_of_day",
            Self::BatteryCriticalLow => "battery_critical_low",
            Self::BatteryCriticalHigh => "battery_critical_high",
            Self::MaxUnmetExceeded => "max_unmet_exceeded",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Energy flows of one hour, in kWh.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyFlows {
    /// Consumer demand.
    pub demand: f64,

    /// Solar generation.
    pub solar: f64,

    /// Wind generation.
    pub wind: f64,

    /// Grid price in $/kWh.
    pub price: f64,

    /// Renewable energy served to demand.
    pub renewable_used: f64,

    /// Energy purchased from the grid.
    pub grid_purchased: f64,

    /// Energy routed into the battery (before efficiency loss).
    pub battery_charge: f64,

    /// Energy drawn from the battery (before efficiency loss).
    pub battery_discharge: f64,

    /// Demand left unserved.
    pub unmet_demand: f64,
}

/// Per-step information of [`MicrogridEnv`].
#[derive(Debug, Clone)]
pub struct MicrogridInfo {
    /// Hour at which the step was taken.
    pub hour: u32,

    /// Battery level after the step, in kWh.
    pub battery_level: f64,

    /// Cumulative demand of the episode.
    pub total_demand: f64,

    /// Cumulative renewable energy used.
    pub total_renewable_used: f64,

    /// Cumulative grid cost in $.
    pub total_grid_cost: f64,

    /// Cumulative unmet demand.
    pub total_unmet: f64,

    /// Renewable energy used over total demand.
    pub renewable_ratio: f64,

    /// Unmet demand over total demand.
    pub unmet_ratio: f64,

    /// Why the episode ended, if it did.
    pub termination: Option<TerminationReason>,

    /// Energy flows of this step.
    pub flows: EnergyFlows,
}

impl Info for MicrogridInfo {}

/// Discrete-time stochastic model of a small grid with battery storage,
/// solar and wind generation and a metered grid connection.
///
/// The exogenous variables of the current hour are drawn once and cached;
/// the observation emitted for an hour and the dynamics applied at that hour
/// always see the same sample.
pub struct MicrogridEnv {
    config: MicrogridEnvConfig,
    rng: StdRng,
    base_seed: i64,
    battery_level: f64,
    hour: u32,
    prev_action: i64,
    total_demand: f64,
    total_renewable_used: f64,
    total_grid_cost: f64,
    total_unmet: f64,
    current: ExogenousDraw,
}

impl MicrogridEnv {
    fn reset_state(&mut self) {
        self.battery_level = self.config.battery_capacity * self.config.initial_battery_fraction;
        self.hour = 0;
        self.prev_action = 0;
        self.total_demand = 0.0;
        self.total_renewable_used = 0.0;
        self.total_grid_cost = 0.0;
        self.total_unmet = 0.0;
        self.current = ExogenousDraw::sample(&self.config, 0, &mut self.rng);
    }

    /// Builds the observation from the cached draw and the internal state.
    fn observation(&self) -> MicrogridObs {
        let c = &self.config;
        let d = &self.current;
        let angle = 2.0 * PI * self.hour as f64 / 24.0;

        let raw: [f64; OBS_DIM] = [
            self.battery_level / c.battery_capacity,
            d.demand / (c.base_demand * 2.0),
            d.solar / c.max_solar,
            d.wind / c.max_wind,
            (d.price - c.grid_price_min) / (c.grid_price_max - c.grid_price_min),
            (angle.sin() + 1.0) / 2.0,
            (angle.cos() + 1.0) / 2.0,
            self.prev_action as f64 / 4.0,
        ];

        let mut obs = [0f32; OBS_DIM];
        for (o, r) in obs.iter_mut().zip(raw.iter()) {
            *o = r.max(0.0).min(1.0) as f32;
        }
        MicrogridObs::new(obs)
    }

    /// Routes energy for one hour according to the chosen policy.
    ///
    /// All flows are clamped into their valid ranges, so the battery level
    /// stays within `[0, capacity]` by construction. The round-trip
    /// efficiency applies to every charge and discharge flow.
    fn apply_action(&mut self, action: EnergyAction, draw: &ExogenousDraw) -> EnergyFlows {
        let c = &self.config;
        let demand = draw.demand;
        let renewable = draw.renewable();
        let eff = c.battery_efficiency;

        let mut flows = EnergyFlows {
            demand,
            solar: draw.solar,
            wind: draw.wind,
            price: draw.price,
            ..EnergyFlows::default()
        };

        match action {
            EnergyAction::DischargeOnly => {
                let discharge = self.battery_level.min(c.max_discharge_rate).min(demand);
                flows.battery_discharge = discharge;
                self.battery_level -= discharge;
                flows.unmet_demand = (demand - discharge * eff).max(0.0);
            }
            EnergyAction::RenewableCharge => {
                let supply = renewable.min(demand);
                flows.renewable_used = supply;
                flows.unmet_demand = (demand - supply).max(0.0);
                let excess = renewable - supply;
                if excess > 0.0 {
                    let headroom = c.battery_capacity - self.battery_level;
                    let charge = excess.min(c.max_charge_rate).min(headroom);
                    flows.battery_charge = charge;
                    self.battery_level += charge * eff;
                }
            }
            EnergyAction::GridOnly => {
                flows.grid_purchased = demand;
            }
            EnergyAction::RenewableThenDischarge => {
                flows.renewable_used = renewable.min(demand);
                let mut remaining = demand - flows.renewable_used;
                if remaining > 0.0 {
                    let discharge = self.battery_level.min(c.max_discharge_rate).min(remaining);
                    flows.battery_discharge = discharge;
                    self.battery_level -= discharge;
                    remaining -= discharge * eff;
                }
                flows.unmet_demand = remaining.max(0.0);
            }
            EnergyAction::RenewableThenGrid => {
                flows.renewable_used = renewable.min(demand);
                let remaining = demand - flows.renewable_used;
                if remaining > 0.0 {
                    flows.grid_purchased = remaining;
                }
            }
        }

        flows
    }

    /// Weighted sum of the reward terms, plus the peak-avoidance bonus.
    fn reward(&self, flows: &EnergyFlows, hour: u32) -> f64 {
        let c = &self.config;
        let w = &c.reward;
        let norm_price =
            (flows.price - c.grid_price_min) / (c.grid_price_max - c.grid_price_min);
        let throughput = flows.battery_charge + flows.battery_discharge;

        let mut reward = w.renewable_usage * (flows.renewable_used / c.base_demand)
            + w.grid_purchase * (flows.grid_purchased / c.base_demand) * norm_price
            + w.unmet_demand * (flows.unmet_demand / c.base_demand)
            + w.battery_wear * (throughput / c.max_charge_rate);

        let is_peak = hour >= c.peak_evening.0 && hour <= c.peak_evening.1;
        if is_peak && flows.grid_purchased == 0.0 {
            reward += w.peak_bonus;
        }

        reward
    }

    /// Checks the termination conditions, in order.
    fn check_termination(&self) -> Option<TerminationReason> {
        let c = &self.config;

        if self.hour >= c.hours_per_episode {
            return Some(TerminationReason::EndOfDay);
        }

        let battery_ratio = self.battery_level / c.battery_capacity;
        if battery_ratio < c.battery_critical_low {
            return Some(TerminationReason::BatteryCriticalLow);
        }
        if battery_ratio > c.battery_critical_high {
            return Some(TerminationReason::BatteryCriticalHigh);
        }

        if self.total_demand > 0.0 && self.total_unmet / self.total_demand > c.max_unmet_ratio {
            return Some(TerminationReason::MaxUnmetExceeded);
        }

        None
    }

    fn info(&self, hour: u32, flows: EnergyFlows, termination: Option<TerminationReason>) -> MicrogridInfo {
        // The ratio denominators are floored at 1, so an all-zero episode
        // reports 0 instead of NaN.
        let denom = self.total_demand.max(1.0);
        MicrogridInfo {
            hour,
            battery_level: self.battery_level,
            total_demand: self.total_demand,
            total_renewable_used: self.total_renewable_used,
            total_grid_cost: self.total_grid_cost,
            total_unmet: self.total_unmet,
            renewable_ratio: self.total_renewable_used / denom,
            unmet_ratio: self.total_unmet / denom,
            termination,
            flows,
        }
    }
}

impl Env for MicrogridEnv {
    type Config = MicrogridEnvConfig;
    type Obs = MicrogridObs;
    type Act = MicrogridAct;
    type Info = MicrogridInfo;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        config.validate()?;

        let mut env = Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(seed as u64),
            base_seed: seed,
            battery_level: 0.0,
            hour: 0,
            prev_action: 0,
            total_demand: 0.0,
            total_renewable_used: 0.0,
            total_grid_cost: 0.0,
            total_unmet: 0.0,
            current: ExogenousDraw {
                demand: 0.0,
                solar: 0.0,
                wind: 0.0,
                price: 0.0,
            },
        };
        env.reset_state();
        Ok(env)
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        let action = match EnergyAction::try_from(a.act) {
            Ok(action) => action,
            Err(e) => panic!("{}", e),
        };

        let hour = self.hour;
        let draw = self.current;
        let flows = self.apply_action(action, &draw);
        let reward = self.reward(&flows, hour);

        self.total_demand += draw.demand;
        self.total_renewable_used += flows.renewable_used;
        self.total_grid_cost += flows.grid_purchased * draw.price;
        self.total_unmet += flows.unmet_demand;

        self.hour += 1;
        self.prev_action = action.code();

        let termination = self.check_termination();

        // Draw the next hour once; the following observation and the next
        // step both consume this sample.
        self.current = ExogenousDraw::sample(&self.config, self.hour, &mut self.rng);
        let obs = self.observation();
        let info = self.info(hour, flows, termination);

        let (is_terminated, is_truncated) = match termination {
            Some(TerminationReason::EndOfDay) => (0, 1),
            Some(_) => (1, 0),
            None => (0, 0),
        };

        let record = match termination {
            Some(reason) => Record::from_slice(&[
                ("grid_cost", RecordValue::Scalar(info.total_grid_cost as f32)),
                ("renewable_ratio", RecordValue::Scalar(info.renewable_ratio as f32)),
                ("unmet_ratio", RecordValue::Scalar(info.unmet_ratio as f32)),
                ("termination", RecordValue::String(reason.as_str().into())),
            ]),
            None => Record::empty(),
        };

        let step = Step::new(
            obs,
            a.clone(),
            vec![reward as f32],
            vec![is_terminated],
            vec![is_truncated],
            info,
            None,
        );

        (step, record)
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        self.reset_state();
        Ok(self.observation())
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs> {
        self.rng = StdRng::seed_from_u64((self.base_seed + ix as i64) as u64);
        self.reset()
    }

    fn step_with_reset(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        let (mut step, record) = self.step(a);
        if step.is_done() {
            let init_obs = self.reset().expect("resetting the environment cannot fail");
            step.init_obs = Some(init_obs);
        }
        (step, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn act(a: EnergyAction) -> MicrogridAct {
        MicrogridAct::from(a)
    }

    #[test]
    fn test_battery_stays_within_bounds() {
        let config = MicrogridEnvConfig::standalone();
        for seed in 0..5 {
            let mut env = MicrogridEnv::build(&config, seed).unwrap();
            let mut rng = StdRng::seed_from_u64(seed as u64);
            for _ in 0..10 {
                env.reset().unwrap();
                loop {
                    let a = MicrogridAct::new(rng.gen_range(0..5));
                    let (step, _) = env.step(&a);
                    let level = step.info.battery_level;
                    assert!(
                        level >= 0.0 && level <= config.battery_capacity,
                        "battery level {} out of range",
                        level
                    );
                    if step.is_done() {
                        break;
                    }
                }
            }
        }
    }

    #[test]
    fn test_observation_components_are_normalized() {
        let config = MicrogridEnvConfig::library();
        let mut env = MicrogridEnv::build(&config, 3).unwrap();
        let obs = env.reset().unwrap();
        assert!(obs.obs.iter().all(|&x| (0.0..=1.0).contains(&x)));

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..48 {
            let a = MicrogridAct::new(rng.gen_range(0..5));
            let (step, _) = env.step(&a);
            assert!(step.obs.obs.iter().all(|&x| (0.0..=1.0).contains(&x)));
            if step.is_done() {
                env.reset().unwrap();
            }
        }
    }

    #[test]
    fn test_same_seed_reproduces_the_episode() {
        let config = MicrogridEnvConfig::standalone();
        let actions: Vec<i64> = vec![2, 4, 1, 3, 0, 2, 4, 1, 2, 3, 2, 4];

        let run = |seed: i64| -> (Vec<[f32; 8]>, Vec<f32>, Vec<bool>) {
            let mut env = MicrogridEnv::build(&config, seed).unwrap();
            env.reset().unwrap();
            let mut obs_log = vec![];
            let mut reward_log = vec![];
            let mut done_log = vec![];
            for &code in actions.iter() {
                let (step, _) = env.step(&MicrogridAct::new(code));
                obs_log.push(step.obs.obs);
                reward_log.push(step.reward[0]);
                done_log.push(step.is_done());
                if step.is_done() {
                    break;
                }
            }
            (obs_log, reward_log, done_log)
        };

        assert_eq!(run(42), run(42));
        assert_ne!(run(42).1, run(43).1);
    }

    #[test]
    fn test_reset_with_index_is_reproducible() {
        let config = MicrogridEnvConfig::standalone();
        let mut env = MicrogridEnv::build(&config, 7).unwrap();

        let a = env.reset_with_index(3).unwrap();
        let (s1, _) = env.step(&act(EnergyAction::GridOnly));
        let b = env.reset_with_index(3).unwrap();
        let (s2, _) = env.step(&act(EnergyAction::GridOnly));

        assert_eq!(a.obs, b.obs);
        assert_eq!(s1.reward, s2.reward);
    }

    #[test]
    fn test_observation_and_step_share_the_hourly_draw() {
        let config = MicrogridEnvConfig::standalone();
        let mut env = MicrogridEnv::build(&config, 11).unwrap();
        let obs = env.reset().unwrap();

        let (step, _) = env.step(&act(EnergyAction::GridOnly));
        let demand_frac =
            (step.info.flows.demand / (config.base_demand * 2.0)).max(0.0).min(1.0) as f32;
        assert!((obs.obs[1] - demand_frac).abs() < 1e-6);
    }

    #[test]
    fn test_grid_only_at_hour_zero() {
        let config = MicrogridEnvConfig::standalone();
        let mut env = MicrogridEnv::build(&config, 42).unwrap();
        env.reset().unwrap();

        let (step, _) = env.step(&act(EnergyAction::GridOnly));
        let flows = &step.info.flows;

        assert_eq!(flows.grid_purchased, flows.demand);
        assert_eq!(flows.renewable_used, 0.0);
        assert_eq!(flows.unmet_demand, 0.0);
        // Hour 0 is before sunrise.
        assert_eq!(flows.solar, 0.0);
        // Off-peak tier perturbed by at most 10%.
        assert!(flows.price >= config.grid_price_min * 0.9);
        assert!(flows.price <= config.grid_price_min * 1.1);
        // The battery is untouched.
        assert_eq!(step.info.battery_level, config.battery_capacity * 0.5);
        assert_eq!(
            step.info.total_grid_cost,
            flows.grid_purchased * flows.price
        );
    }

    #[test]
    fn test_unmet_ratio_terminates_discharge_with_empty_battery() {
        // A tiny battery cannot cover demand; discharging only must trip the
        // unmet-demand threshold. The low-critical check is disabled so the
        // unmet branch is the one that fires.
        let mut config = MicrogridEnvConfig::standalone().battery_capacity(10.0);
        config.battery_critical_low = 0.0;
        let mut env = MicrogridEnv::build(&config, 1).unwrap();
        env.reset().unwrap();

        let mut reason = None;
        for _ in 0..config.hours_per_episode {
            let (step, _) = env.step(&act(EnergyAction::DischargeOnly));
            if step.is_done() {
                reason = step.info.termination;
                break;
            }
        }
        assert_eq!(reason, Some(TerminationReason::MaxUnmetExceeded));
    }

    #[test]
    fn test_grid_only_reaches_end_of_day() {
        let mut config = MicrogridEnvConfig::standalone();
        config.battery_critical_low = 0.0;
        let mut env = MicrogridEnv::build(&config, 1).unwrap();
        env.reset().unwrap();

        let mut steps = 0;
        loop {
            let (step, record) = env.step(&act(EnergyAction::GridOnly));
            steps += 1;
            if step.is_done() {
                assert_eq!(step.info.termination, Some(TerminationReason::EndOfDay));
                assert_eq!(step.is_truncated[0], 1);
                assert_eq!(step.info.unmet_ratio, 0.0);
                assert_eq!(record.get_string("termination").unwrap(), "end_of_day");
                break;
            }
        }
        assert_eq!(steps, config.hours_per_episode);
    }

    #[test]
    fn test_battery_low_termination() {
        // Discharging with the default 5% low-critical threshold drains the
        // battery below the threshold before the unmet ratio accumulates.
        let config = MicrogridEnvConfig::standalone()
            .battery_capacity(30.0)
            .max_unmet_ratio(10.0);
        let mut env = MicrogridEnv::build(&config, 5).unwrap();
        env.reset().unwrap();

        let mut reason = None;
        for _ in 0..config.hours_per_episode {
            let (step, _) = env.step(&act(EnergyAction::DischargeOnly));
            if step.is_done() {
                reason = step.info.termination;
                break;
            }
        }
        assert_eq!(reason, Some(TerminationReason::BatteryCriticalLow));
    }

    #[test]
    #[should_panic]
    fn test_invalid_action_code_panics() {
        let config = MicrogridEnvConfig::standalone();
        let mut env = MicrogridEnv::build(&config, 0).unwrap();
        env.reset().unwrap();
        env.step(&MicrogridAct::new(7));
    }
}
