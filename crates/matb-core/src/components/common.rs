//! Common components used across multiple tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timers::Millis;

/// The four concurrently running tasks of the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Monitoring,
    Communications,
    Resource,
    Tracking,
}

impl TaskKind {
    /// Fixed firing order used to break ties on the engine clock.
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Monitoring,
        TaskKind::Communications,
        TaskKind::Resource,
        TaskKind::Tracking,
    ];

    pub fn index(self) -> usize {
        match self {
            TaskKind::Monitoring => 0,
            TaskKind::Communications => 1,
            TaskKind::Resource => 2,
            TaskKind::Tracking => 3,
        }
    }

    /// How this task's health impact must be integrated.
    pub fn metric_kind(self) -> MetricKind {
        match self {
            TaskKind::Monitoring | TaskKind::Communications => MetricKind::Impulse,
            TaskKind::Resource | TaskKind::Tracking => MetricKind::Rate,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Monitoring => "monitoring",
            TaskKind::Communications => "communications",
            TaskKind::Resource => "resource",
            TaskKind::Tracking => "tracking",
        };
        f.write_str(name)
    }
}

/// Signal-detection outcome of one scored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Correct response to a real event
    Hit,
    /// Real event left unanswered past its deadline
    Miss,
    /// Response with no matching event
    FalseAlarm,
    /// Correctly ignored a non-event
    CorrectRejection,
    /// Finalized before its deadline without a response
    Early,
    /// Dropped without scoring
    Abandoned,
}

/// Integration semantics of a health impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Applied once, at the moment of emission
    Impulse,
    /// Health per second, integrated over elapsed time
    Rate,
}

/// One metric emission from a task simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub task: TaskKind,
    pub health_impact: f64,
    pub system_load: f64,
    pub kind: MetricKind,
    /// Engine time of the emission
    pub at: Millis,
}

impl Metric {
    pub fn impulse(task: TaskKind, health_impact: f64, system_load: f64, at: Millis) -> Self {
        Self {
            task,
            health_impact,
            system_load,
            kind: MetricKind::Impulse,
            at,
        }
    }

    pub fn rate(task: TaskKind, health_per_second: f64, system_load: f64, at: Millis) -> Self {
        Self {
            task,
            health_impact: health_per_second,
            system_load,
            kind: MetricKind::Rate,
            at,
        }
    }

    /// Neutral emission published when a task is disabled or reset.
    pub fn zero(task: TaskKind, at: Millis) -> Self {
        Self {
            task,
            health_impact: 0.0,
            system_load: 0.0,
            kind: task.metric_kind(),
            at,
        }
    }
}

/// Session-wide health and load, as read by dashboards and scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateHealthState {
    /// Cumulative health, always within [0, 100]
    pub health: f64,
    /// Instantaneous load, always within [0, 100]
    pub load: f64,
}

impl AggregateHealthState {
    pub const INITIAL_HEALTH: f64 = 100.0;

    pub fn new(health: f64) -> Self {
        Self {
            health: health.clamp(0.0, 100.0),
            load: 0.0,
        }
    }
}

impl Default for AggregateHealthState {
    fn default() -> Self {
        Self::new(Self::INITIAL_HEALTH)
    }
}

/// 2D vector for cursor position and drift velocity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn from_angle(radians: f64, magnitude: f64) -> Self {
        Self {
            x: radians.cos() * magnitude,
            y: radians.sin() * magnitude,
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::ops::Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kinds_per_task() {
        assert_eq!(TaskKind::Monitoring.metric_kind(), MetricKind::Impulse);
        assert_eq!(TaskKind::Communications.metric_kind(), MetricKind::Impulse);
        assert_eq!(TaskKind::Resource.metric_kind(), MetricKind::Rate);
        assert_eq!(TaskKind::Tracking.metric_kind(), MetricKind::Rate);
    }

    #[test]
    fn test_initial_state_clamped() {
        assert_eq!(AggregateHealthState::new(140.0).health, 100.0);
        assert_eq!(AggregateHealthState::new(-3.0).health, 0.0);
        assert_eq!(AggregateHealthState::default().load, 0.0);
    }

    #[test]
    fn test_vec2_length() {
        assert!((Vec2::new(3.0, 4.0).length() - 5.0).abs() < 1e-9);
        let v = Vec2::from_angle(0.0, 2.0);
        assert!((v.x - 2.0).abs() < 1e-9 && v.y.abs() < 1e-9);
    }
}
