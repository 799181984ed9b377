//! Actions of the microgrid environment.
use crate::error::MicrogridError;
use gridrl_core::Act;
use std::convert::TryFrom;
use std::fmt;

/// The five energy-routing policies the agent chooses between each hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyAction {
    /// Serve demand from the battery only.
    DischargeOnly,

    /// Serve demand from renewables; route the surplus into the battery.
    RenewableCharge,

    /// Buy the entire demand from the grid.
    GridOnly,

    /// Serve from renewables first, then from the battery.
    RenewableThenDischarge,

    /// Serve from renewables first, then from the grid.
    RenewableThenGrid,
}

impl EnergyAction {
    /// The action code, 0..=4.
    pub fn code(self) -> i64 {
        match self {
            Self::DischargeOnly => 0,
            Self::RenewableCharge => 1,
            Self::GridOnly => 2,
            Self::RenewableThenDischarge => 3,
            Self::RenewableThenGrid => 4,
        }
    }

    /// All actions in code order.
    pub fn all() -> [EnergyAction; 5] {
        [
            Self::DischargeOnly,
            Self::RenewableCharge,
            Self::GridOnly,
            Self::RenewableThenDischarge,
            Self::RenewableThenGrid,
        ]
    }
}

impl TryFrom<i64> for EnergyAction {
    type Error = MicrogridError;

    /// Rejects out-of-range codes; action codes are never clamped.
    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::DischargeOnly),
            1 => Ok(Self::RenewableCharge),
            2 => Ok(Self::GridOnly),
            3 => Ok(Self::RenewableThenDischarge),
            4 => Ok(Self::RenewableThenGrid),
            _ => Err(MicrogridError::InvalidAction(code)),
        }
    }
}

impl fmt::Display for EnergyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DischargeOnly => "Discharge",
            Self::RenewableCharge => "Charge",
            Self::GridOnly => "Grid",
            Self::RenewableThenDischarge => "Renew+Disch",
            Self::RenewableThenGrid => "Renew+Grid",
        };
        write!(f, "{}", name)
    }
}

/// Action of [`MicrogridEnv`](crate::MicrogridEnv), as an action code.
///
/// Codes arrive from the learning stack (e.g. an argmax over network
/// outputs) and are validated when the environment converts them into an
/// [`EnergyAction`].
#[derive(Debug, Clone)]
pub struct MicrogridAct {
    /// The action code.
    pub act: i64,
}

impl MicrogridAct {
    /// Wraps an action code.
    pub fn new(act: i64) -> Self {
        Self { act }
    }
}

impl Act for MicrogridAct {
    fn len(&self) -> usize {
        1
    }
}

impl From<EnergyAction> for MicrogridAct {
    fn from(a: EnergyAction) -> Self {
        Self { act: a.code() }
    }
}

#[cfg(test)]
mod tests {
    use super::EnergyAction;
    use std::convert::TryFrom;

    #[test]
    fn test_codes_round_trip() {
        for a in EnergyAction::all().iter() {
            assert_eq!(EnergyAction::try_from(a.code()).unwrap(), *a);
        }
    }

    #[test]
    fn test_out_of_range_codes_are_rejected() {
        assert!(EnergyAction::try_from(5).is_err());
        assert!(EnergyAction::try_from(-1).is_err());
    }
}
