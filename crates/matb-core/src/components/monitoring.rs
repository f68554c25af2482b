//! System monitoring components - warning lights and scale gauges.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Outcome;
use crate::error::BatteryError;
use crate::timers::Millis;

/// The six monitored indicators. F1/F2 are lights, F3-F6 are gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorLabel {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
}

impl IndicatorLabel {
    pub const ALL: [IndicatorLabel; 6] = [
        IndicatorLabel::F1,
        IndicatorLabel::F2,
        IndicatorLabel::F3,
        IndicatorLabel::F4,
        IndicatorLabel::F5,
        IndicatorLabel::F6,
    ];

    pub fn index(self) -> usize {
        match self {
            IndicatorLabel::F1 => 0,
            IndicatorLabel::F2 => 1,
            IndicatorLabel::F3 => 2,
            IndicatorLabel::F4 => 3,
            IndicatorLabel::F5 => 4,
            IndicatorLabel::F6 => 5,
        }
    }

    pub fn is_gauge(self) -> bool {
        !matches!(self, IndicatorLabel::F1 | IndicatorLabel::F2)
    }
}

impl fmt::Display for IndicatorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.index() + 1)
    }
}

impl FromStr for IndicatorLabel {
    type Err = BatteryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "F1" => Ok(IndicatorLabel::F1),
            "F2" => Ok(IndicatorLabel::F2),
            "F3" => Ok(IndicatorLabel::F3),
            "F4" => Ok(IndicatorLabel::F4),
            "F5" => Ok(IndicatorLabel::F5),
            "F6" => Ok(IndicatorLabel::F6),
            _ => Err(BatteryError::UnknownIndicator(s.to_string())),
        }
    }
}

/// Which out-of-range band an active gauge is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GaugeSide {
    Low,
    High,
}

impl GaugeSide {
    /// Inclusive level band for this side.
    pub fn band(self) -> (i32, i32) {
        match self {
            GaugeSide::Low => (Indicator::LEVEL_MIN, 2),
            GaugeSide::High => (8, Indicator::LEVEL_MAX),
        }
    }
}

/// One monitored indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub label: IndicatorLabel,
    /// Gauge level in 0..=10 (unused for lights)
    pub level: i32,
    pub event_active: bool,
    /// Band an active gauge is held in
    pub side: Option<GaugeSide>,
}

impl Indicator {
    pub const LEVEL_MIN: i32 = 0;
    pub const LEVEL_MAX: i32 = 10;
    pub const NORMAL_BAND: (i32, i32) = (3, 7);
    pub const CENTER: i32 = 5;

    pub fn new(label: IndicatorLabel) -> Self {
        Self {
            label,
            level: Self::CENTER,
            event_active: false,
            side: None,
        }
    }

    /// Whether the operator would see this indicator as abnormal.
    pub fn is_abnormal(&self) -> bool {
        if self.label.is_gauge() {
            self.level < Self::NORMAL_BAND.0 || self.level > Self::NORMAL_BAND.1
        } else {
            self.event_active
        }
    }
}

/// A single monitoring event from trigger to resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub id: u64,
    pub label: IndicatorLabel,
    pub created_at: Millis,
    pub deadline: Millis,
    pub responded: bool,
    pub response_time: Option<Millis>,
    pub outcome: Option<Outcome>,
}

impl MonitoringEvent {
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }
}
