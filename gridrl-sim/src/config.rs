//! Configuration of the microgrid environment.
use crate::error::MicrogridError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Weights of the reward terms.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RewardWeights {
    /// Reward per unit of renewable energy used, relative to base demand.
    pub renewable_usage: f64,

    /// Penalty per unit of grid energy purchased, scaled by the normalized
    /// price. Negative.
    pub grid_purchase: f64,

    /// Penalty per unit of unmet demand. Negative.
    pub unmet_demand: f64,

    /// Penalty per unit of battery throughput (charge + discharge). Negative.
    pub battery_wear: f64,

    /// Fixed bonus for purchasing no grid energy during evening peak hours.
    pub peak_bonus: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            renewable_usage: 1.0,
            grid_purchase: -2.0,
            unmet_demand: -5.0,
            battery_wear: -0.1,
            peak_bonus: 0.5,
        }
    }
}

/// Configuration of [`MicrogridEnv`](crate::MicrogridEnv).
///
/// The two variants of the modeled system disagree on a few constants (wind
/// base fraction, demand noise scale, evening peak-price window). They are
/// exposed as the named presets [`standalone`](Self::standalone) and
/// [`library`](Self::library) rather than reconciled into one model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MicrogridEnvConfig {
    /// Battery capacity in kWh.
    pub battery_capacity: f64,

    /// Round-trip battery efficiency, applied to every charge and discharge
    /// flow. In (0, 1].
    pub battery_efficiency: f64,

    /// Maximum charge rate in kW.
    pub max_charge_rate: f64,

    /// Maximum discharge rate in kW.
    pub max_discharge_rate: f64,

    /// Peak solar generation in kW.
    pub max_solar: f64,

    /// Peak wind generation in kW.
    pub max_wind: f64,

    /// Base consumer demand in kW.
    pub base_demand: f64,

    /// Standard deviation of the demand noise.
    pub demand_std: f64,

    /// Scale applied to `demand_std` when sampling demand noise.
    pub demand_noise_scale: f64,

    /// Off-peak grid price in $/kWh.
    pub grid_price_min: f64,

    /// Peak grid price in $/kWh.
    pub grid_price_max: f64,

    /// Episode length in hours.
    pub hours_per_episode: u32,

    /// First hour of solar generation.
    pub sunrise: u32,

    /// Last hour of solar generation.
    pub sunset: u32,

    /// Fraction of `max_wind` generated regardless of the hour.
    pub wind_base_fraction: f64,

    /// Morning peak-price window, inclusive hour bounds.
    pub peak_morning: (u32, u32),

    /// Evening peak-price window, inclusive hour bounds. Also the window of
    /// the peak-avoidance reward bonus.
    pub peak_evening: (u32, u32),

    /// Fraction of capacity the battery holds at episode start.
    pub initial_battery_fraction: f64,

    /// Reward weights.
    pub reward: RewardWeights,

    /// Battery fraction below which the episode terminates.
    pub battery_critical_low: f64,

    /// Battery fraction above which the episode terminates.
    pub battery_critical_high: f64,

    /// Cumulative unmet-demand ratio above which the episode terminates.
    pub max_unmet_ratio: f64,
}

impl Default for MicrogridEnvConfig {
    fn default() -> Self {
        Self::standalone()
    }
}

impl MicrogridEnvConfig {
    /// Constants of the standalone training scripts.
    pub fn standalone() -> Self {
        Self {
            battery_capacity: 100.0,
            battery_efficiency: 0.95,
            max_charge_rate: 20.0,
            max_discharge_rate: 20.0,
            max_solar: 50.0,
            max_wind: 30.0,
            base_demand: 40.0,
            demand_std: 10.0,
            demand_noise_scale: 0.3,
            grid_price_min: 0.05,
            grid_price_max: 0.25,
            hours_per_episode: 24,
            sunrise: 6,
            sunset: 18,
            wind_base_fraction: 0.5,
            peak_morning: (7, 9),
            peak_evening: (18, 21),
            initial_battery_fraction: 0.5,
            reward: RewardWeights::default(),
            battery_critical_low: 0.05,
            battery_critical_high: 1.0,
            max_unmet_ratio: 0.20,
        }
    }

    /// Constants of the library environment module.
    pub fn library() -> Self {
        Self {
            demand_noise_scale: 1.0,
            wind_base_fraction: 0.6,
            peak_evening: (17, 21),
            ..Self::standalone()
        }
    }

    /// Sets the battery capacity.
    pub fn battery_capacity(mut self, v: f64) -> Self {
        self.battery_capacity = v;
        self
    }

    /// Sets the round-trip battery efficiency.
    pub fn battery_efficiency(mut self, v: f64) -> Self {
        self.battery_efficiency = v;
        self
    }

    /// Sets the base consumer demand.
    pub fn base_demand(mut self, v: f64) -> Self {
        self.base_demand = v;
        self
    }

    /// Sets the demand noise standard deviation.
    pub fn demand_std(mut self, v: f64) -> Self {
        self.demand_std = v;
        self
    }

    /// Sets the episode length in hours.
    pub fn hours_per_episode(mut self, v: u32) -> Self {
        self.hours_per_episode = v;
        self
    }

    /// Sets the reward weights.
    pub fn reward(mut self, v: RewardWeights) -> Self {
        self.reward = v;
        self
    }

    /// Sets the low-critical battery fraction.
    pub fn battery_critical_low(mut self, v: f64) -> Self {
        self.battery_critical_low = v;
        self
    }

    /// Sets the high-critical battery fraction.
    pub fn battery_critical_high(mut self, v: f64) -> Self {
        self.battery_critical_high = v;
        self
    }

    /// Sets the maximum cumulative unmet-demand ratio.
    pub fn max_unmet_ratio(mut self, v: f64) -> Self {
        self.max_unmet_ratio = v;
        self
    }

    /// Validates the configuration.
    ///
    /// A misconfigured environment invalidates a whole training run, so
    /// every violation is an error at construction time.
    pub fn validate(&self) -> Result<(), MicrogridError> {
        let err = |msg: String| Err(MicrogridError::InvalidConfig(msg));

        if self.battery_capacity <= 0.0 {
            return err(format!("battery_capacity must be positive, got {}", self.battery_capacity));
        }
        if !(self.battery_efficiency > 0.0 && self.battery_efficiency <= 1.0) {
            return err(format!("battery_efficiency must be in (0, 1], got {}", self.battery_efficiency));
        }
        if self.max_charge_rate <= 0.0 || self.max_discharge_rate <= 0.0 {
            return err("charge/discharge rates must be positive".into());
        }
        if self.max_solar <= 0.0 || self.max_wind <= 0.0 {
            return err("max_solar and max_wind must be positive".into());
        }
        if self.base_demand <= 0.0 {
            return err(format!("base_demand must be positive, got {}", self.base_demand));
        }
        if self.grid_price_max <= self.grid_price_min {
            return err("grid_price_max must exceed grid_price_min".into());
        }
        if self.hours_per_episode == 0 {
            return err("hours_per_episode must be positive".into());
        }
        if self.sunrise >= self.sunset {
            return err(format!("sunrise ({}) must precede sunset ({})", self.sunrise, self.sunset));
        }
        if !(0.0..=1.0).contains(&self.wind_base_fraction) {
            return err(format!("wind_base_fraction must be in [0, 1], got {}", self.wind_base_fraction));
        }
        if !(0.0..=1.0).contains(&self.initial_battery_fraction) {
            return err(format!(
                "initial_battery_fraction must be in [0, 1], got {}",
                self.initial_battery_fraction
            ));
        }
        if !(0.0..=1.0).contains(&self.battery_critical_low)
            || !(0.0..=1.0).contains(&self.battery_critical_high)
            || self.battery_critical_low >= self.battery_critical_high
        {
            return err("battery critical thresholds must satisfy 0 <= low < high <= 1".into());
        }
        if self.max_unmet_ratio <= 0.0 {
            return err(format!("max_unmet_ratio must be positive, got {}", self.max_unmet_ratio));
        }

        Ok(())
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MicrogridEnvConfig;

    #[test]
    fn test_presets_validate() {
        assert!(MicrogridEnvConfig::standalone().validate().is_ok());
        assert!(MicrogridEnvConfig::library().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_fail_at_construction() {
        assert!(MicrogridEnvConfig::standalone()
            .battery_capacity(0.0)
            .validate()
            .is_err());
        assert!(MicrogridEnvConfig::standalone()
            .battery_efficiency(1.5)
            .validate()
            .is_err());
        assert!(MicrogridEnvConfig::standalone()
            .base_demand(-1.0)
            .validate()
            .is_err());
        let mut sunrise_after_sunset = MicrogridEnvConfig::standalone();
        sunrise_after_sunset.sunrise = 19;
        assert!(sunrise_after_sunset.validate().is_err());
    }
}
