//! Resource management components - fuel tanks and pumps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BatteryError;

/// The six tanks of the fuel plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TankId {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl TankId {
    pub const ALL: [TankId; 6] = [TankId::A, TankId::B, TankId::C, TankId::D, TankId::E, TankId::F];

    pub fn index(self) -> usize {
        match self {
            TankId::A => 0,
            TankId::B => 1,
            TankId::C => 2,
            TankId::D => 3,
            TankId::E => 4,
            TankId::F => 5,
        }
    }
}

impl fmt::Display for TankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TankId::A => "a",
            TankId::B => "b",
            TankId::C => "c",
            TankId::D => "d",
            TankId::E => "e",
            TankId::F => "f",
        };
        f.write_str(name)
    }
}

impl FromStr for TankId {
    type Err = BatteryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(TankId::A),
            "b" => Ok(TankId::B),
            "c" => Ok(TankId::C),
            "d" => Ok(TankId::D),
            "e" => Ok(TankId::E),
            "f" => Ok(TankId::F),
            _ => Err(BatteryError::UnknownTank(s.to_string())),
        }
    }
}

/// How far a target tank has drifted from its target level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TankBand {
    Normal,
    Warning,
    Critical,
}

/// One tank. Levels are always kept within `[0, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tank {
    pub id: TankId,
    pub level: f64,
    pub max: f64,
    /// Level the operator should hold (A and B only)
    pub target: Option<f64>,
    /// Whether pumping out of this tank draws it down
    pub depletable: bool,
    /// Base consumption per minute before the difficulty multiplier
    pub loss_per_minute: f64,
}

impl Tank {
    pub const WARNING_BAND: (f64, f64) = (2250.0, 2750.0);
    pub const CRITICAL_BAND: (f64, f64) = (1000.0, 3000.0);

    pub fn headroom(&self) -> f64 {
        (self.max - self.level).max(0.0)
    }

    /// Signed distance from target, or zero for tanks without one.
    pub fn deviation(&self) -> f64 {
        self.target.map(|t| self.level - t).unwrap_or(0.0)
    }

    pub fn band(&self) -> TankBand {
        if self.level < Self::CRITICAL_BAND.0 || self.level > Self::CRITICAL_BAND.1 {
            TankBand::Critical
        } else if self.level < Self::WARNING_BAND.0 || self.level > Self::WARNING_BAND.1 {
            TankBand::Warning
        } else {
            TankBand::Normal
        }
    }

    pub fn set_level(&mut self, level: f64) {
        self.level = level.clamp(0.0, self.max);
    }

    /// Fresh plant with the standard capacities and starting levels.
    pub fn standard_plant() -> [Tank; 6] {
        let tank = |id, level, max, target, depletable, loss| Tank {
            id,
            level,
            max,
            target,
            depletable,
            loss_per_minute: loss,
        };
        [
            tank(TankId::A, 2500.0, 5000.0, Some(2500.0), true, 500.0),
            tank(TankId::B, 2500.0, 5000.0, Some(2500.0), true, 500.0),
            tank(TankId::C, 1000.0, 2000.0, None, true, 0.0),
            tank(TankId::D, 1000.0, 2000.0, None, true, 0.0),
            tank(TankId::E, 3000.0, 4000.0, None, false, 0.0),
            tank(TankId::F, 3000.0, 4000.0, None, false, 0.0),
        ]
    }
}

/// Pump number 1 through 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PumpId(u8);

impl PumpId {
    pub const COUNT: u8 = 8;

    pub fn new(id: u8) -> Result<Self, BatteryError> {
        if (1..=Self::COUNT).contains(&id) {
            Ok(Self(id))
        } else {
            Err(BatteryError::UnknownPump(id))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn all() -> impl Iterator<Item = PumpId> {
        (1..=Self::COUNT).map(PumpId)
    }
}

impl fmt::Display for PumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpState {
    Off,
    On,
    Failure,
}

/// One pump. A failed pump moves nothing, whatever the operator last set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pump {
    pub id: PumpId,
    /// Units per minute
    pub flow: f64,
    pub state: PumpState,
    pub from: TankId,
    pub to: TankId,
}

impl Pump {
    pub fn is_pumping(&self) -> bool {
        self.state == PumpState::On
    }

    pub fn is_failed(&self) -> bool {
        self.state == PumpState::Failure
    }

    pub fn standard_plant() -> [Pump; 8] {
        let pump = |id, from, to, flow| Pump {
            id: PumpId(id),
            flow,
            state: PumpState::Off,
            from,
            to,
        };
        [
            pump(1, TankId::C, TankId::A, 800.0),
            pump(2, TankId::E, TankId::A, 600.0),
            pump(3, TankId::D, TankId::B, 800.0),
            pump(4, TankId::F, TankId::B, 600.0),
            pump(5, TankId::E, TankId::C, 600.0),
            pump(6, TankId::F, TankId::D, 600.0),
            pump(7, TankId::A, TankId::B, 400.0),
            pump(8, TankId::B, TankId::A, 400.0),
        ]
    }
}
