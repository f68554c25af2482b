//! Tracking components - cursor state and control mode.

use serde::{Deserialize, Serialize};

use super::Vec2;

/// Who is steering the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    Auto,
    Manual,
}

/// Why the tracker is in manual mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualCause {
    /// Injected automation failure, recovers after continuous manual control
    AutomationFailure,
    /// Timed episode started by `force_manual_control`
    Forced,
    /// Operator switched automation off; stays manual until switched back
    Operator,
}

/// Cursor position and drift velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub position: Vec2,
    pub velocity: Vec2,
}

impl Cursor {
    /// Half-width of the playing field on each axis.
    pub const BOUND: f64 = 150.0;
    /// Half-width of the target box on each axis.
    pub const TARGET_HALF_WIDTH: f64 = 25.0;

    pub fn centered() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
        }
    }

    pub fn is_within_target(&self, half_width: f64) -> bool {
        self.position.x.abs() <= half_width && self.position.y.abs() <= half_width
    }

    /// Clamp to the field; an axis that hits the wall reverses at `restitution`.
    pub fn bounce(&mut self, bound: f64, restitution: f64) {
        if self.position.x.abs() > bound {
            self.position.x = self.position.x.clamp(-bound, bound);
            self.velocity.x = -self.velocity.x * restitution;
        }
        if self.position.y.abs() > bound {
            self.position.y = self.position.y.clamp(-bound, bound);
            self.velocity.y = -self.velocity.y * restitution;
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::centered()
    }
}
