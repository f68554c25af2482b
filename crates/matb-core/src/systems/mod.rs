//! Systems - logic that operates on components
//!
//! Each task simulator owns its components, its timers, its random stream
//! and an outbox of pending emissions. The engine only talks to them through
//! `TaskSimulator`.

mod aggregator;
mod communications;
mod monitoring;
mod resource;
mod scheduler;
mod tracking;

pub use aggregator::*;
pub use communications::*;
pub use monitoring::*;
pub use resource::*;
pub use scheduler::*;
pub use tracking::*;

use crate::components::{Metric, TaskKind};
use crate::config::TaskSettings;
use crate::records::Outbox;
use crate::timers::Millis;

/// Lifecycle shared by the four task simulators.
pub trait TaskSimulator {
    fn kind(&self) -> TaskKind;

    fn settings(&self) -> TaskSettings;

    /// Arm periodic ticks and the event scheduler. No-op while disabled.
    fn start(&mut self, now: Millis);

    /// Cancel every pending timer. State is kept.
    fn stop(&mut self, now: Millis);

    /// Apply new settings live. Disabling freezes the task and publishes a
    /// zero metric; re-enabling re-arms it.
    fn apply_settings(&mut self, settings: TaskSettings, now: Millis);

    /// Stop generating new events; ticks keep running.
    fn pause(&mut self);

    fn resume(&mut self, now: Millis);

    /// Return to the initial condition: events, logs, metrics and timers.
    fn reset(&mut self, now: Millis);

    /// Earliest pending timer, if any.
    fn next_due(&mut self) -> Option<Millis>;

    /// Fire the earliest timer due at or before `now`. Returns false if
    /// nothing was due.
    fn fire_due(&mut self, now: Millis) -> bool;

    /// Latest `{health_impact, system_load}`, zero while disabled.
    fn current_metric(&self, now: Millis) -> Metric;

    fn outbox(&mut self) -> &mut Outbox;
}

/// Earliest of two optional due times.
pub(crate) fn earliest(a: Option<Millis>, b: Option<Millis>) -> Option<Millis> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
