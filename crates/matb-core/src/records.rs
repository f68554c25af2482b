//! Event records, the observer interface and the in-memory recorder.
//!
//! Simulators keep their own append-only typed logs and also push every new
//! row and metric into an `Outbox`. The engine drains the outboxes after each
//! timer or operator call and forwards the contents to the aggregator and to
//! the installed `BatteryObserver`.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::components::{
    AggregateHealthState, Frequency, IndicatorLabel, Metric, Outcome, PumpId, Radio, TaskKind,
    TrackingMode,
};
use crate::timers::Millis;

/// One scored monitoring response or expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringRecord {
    /// `None` for false alarms
    pub event_id: Option<u64>,
    pub label: IndicatorLabel,
    pub outcome: Outcome,
    pub created_at: Option<Millis>,
    pub logged_at: Millis,
    pub response_time: Option<Millis>,
    pub health_impact: f64,
}

/// One finalized communications message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommsRecord {
    pub message_id: u64,
    pub callsign: String,
    pub own_callsign: bool,
    pub target_radio: Radio,
    pub target_frequency: Frequency,
    /// Radio selected when the message finalized
    pub selected_radio: Radio,
    /// Target radio's frequency when the message finalized
    pub response_frequency: Frequency,
    pub radio_ok: bool,
    pub freq_ok: bool,
    /// Offset of the first fully matching snapshot
    pub response_time: Option<Millis>,
    pub outcome: Outcome,
    pub health_impact: f64,
    pub created_at: Millis,
    pub finalized_at: Millis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceRecord {
    Sample {
        at: Millis,
        tank_a: f64,
        tank_b: f64,
        diff_a: f64,
        diff_b: f64,
        active_pumps: usize,
        failed_pumps: usize,
        corr_a: bool,
        corr_b: bool,
    },
    PumpFailure {
        at: Millis,
        pump: PumpId,
        /// Injected by the event scheduler rather than the random 1 Hz roll
        forced: bool,
        repair_at: Millis,
    },
    PumpRepaired {
        at: Millis,
        pump: PumpId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingTransition {
    AutomationFailure,
    ManualForced,
    AutoRestored,
    OperatorToggle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingRecord {
    Sample {
        at: Millis,
        rms_error: f64,
        within_target: bool,
        mode: TrackingMode,
        x: f64,
        y: f64,
    },
    Transition {
        at: Millis,
        transition: TrackingTransition,
        mode: TrackingMode,
    },
}

/// A log row from any task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", content = "row", rename_all = "snake_case")]
pub enum LogEntry {
    Monitoring(MonitoringRecord),
    Communications(CommsRecord),
    Resource(ResourceRecord),
    Tracking(TrackingRecord),
}

impl LogEntry {
    pub fn task(&self) -> TaskKind {
        match self {
            LogEntry::Monitoring(_) => TaskKind::Monitoring,
            LogEntry::Communications(_) => TaskKind::Communications,
            LogEntry::Resource(_) => TaskKind::Resource,
            LogEntry::Tracking(_) => TaskKind::Tracking,
        }
    }
}

/// Pending emissions of one simulator, drained by the engine.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    metrics: Vec<Metric>,
    logs: Vec<LogEntry>,
}

impl Outbox {
    pub fn metric(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    pub fn log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.logs.is_empty()
    }

    pub fn take(&mut self) -> (Vec<Metric>, Vec<LogEntry>) {
        (
            std::mem::take(&mut self.metrics),
            std::mem::take(&mut self.logs),
        )
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
        self.logs.clear();
    }
}

/// Receives everything the battery publishes. All methods default to no-ops.
pub trait BatteryObserver {
    fn on_log_update(&mut self, _entry: &LogEntry) {}

    fn on_metrics_update(&mut self, _metric: &Metric) {}

    fn on_health_update(&mut self, _state: AggregateHealthState) {}
}

impl<T: BatteryObserver + ?Sized> BatteryObserver for Arc<Mutex<T>> {
    fn on_log_update(&mut self, entry: &LogEntry) {
        if let Ok(mut inner) = self.lock() {
            inner.on_log_update(entry);
        }
    }

    fn on_metrics_update(&mut self, metric: &Metric) {
        if let Ok(mut inner) = self.lock() {
            inner.on_metrics_update(metric);
        }
    }

    fn on_health_update(&mut self, state: AggregateHealthState) {
        if let Ok(mut inner) = self.lock() {
            inner.on_health_update(state);
        }
    }
}

/// Observer that keeps every emission in memory.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub logs: Vec<LogEntry>,
    pub metrics: Vec<Metric>,
    pub health: Vec<AggregateHealthState>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle suitable for `Battery::set_observer`.
    pub fn shared() -> Arc<Mutex<Recorder>> {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn outcomes(&self, task: TaskKind) -> Vec<Outcome> {
        self.logs
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Monitoring(r) if task == TaskKind::Monitoring => Some(r.outcome),
                LogEntry::Communications(r) if task == TaskKind::Communications => {
                    Some(r.outcome)
                }
                _ => None,
            })
            .collect()
    }

    pub fn last_health(&self) -> Option<AggregateHealthState> {
        self.health.last().copied()
    }
}

impl BatteryObserver for Recorder {
    fn on_log_update(&mut self, entry: &LogEntry) {
        self.logs.push(entry.clone());
    }

    fn on_metrics_update(&mut self, metric: &Metric) {
        self.metrics.push(*metric);
    }

    fn on_health_update(&mut self, state: AggregateHealthState) {
        self.health.push(state);
    }
}
