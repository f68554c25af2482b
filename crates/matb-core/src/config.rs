//! Battery configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! changes. Task settings (`events_per_minute`, `difficulty`, `enabled`) can
//! also be swapped at runtime through `Battery::set_task_settings`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::components::{Cursor, MessageCatalog, TaskKind};
use crate::error::BatteryError;
use crate::timers::Millis;

/// Per-task knobs the operator or experimenter may change at any time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    pub events_per_minute: f64,
    /// 0 (easiest) to 10 (hardest)
    pub difficulty: f64,
    pub enabled: bool,
}

impl TaskSettings {
    pub fn new(events_per_minute: f64, difficulty: f64) -> Self {
        Self {
            events_per_minute,
            difficulty,
            enabled: true,
        }
    }

    pub fn validate(&self) -> Result<(), BatteryError> {
        if !(self.events_per_minute > 0.0) || !self.events_per_minute.is_finite() {
            return Err(BatteryError::InvalidEventRate(self.events_per_minute));
        }
        if !(0.0..=10.0).contains(&self.difficulty) {
            return Err(BatteryError::InvalidDifficulty(self.difficulty));
        }
        Ok(())
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self::new(3.0, 4.0)
    }
}

/// Jitter applied to a scheduler's mean inter-event delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub jitter_min: f64,
    pub jitter_max: f64,
    /// Floor on any single delay
    pub min_delay_ms: Millis,
}

impl SchedulerConfig {
    pub fn new(jitter_min: f64, jitter_max: f64, min_delay_ms: Millis) -> Self {
        Self {
            jitter_min,
            jitter_max,
            min_delay_ms,
        }
    }

    pub fn validate(&self) -> Result<(), BatteryError> {
        let ordered = self.jitter_min <= self.jitter_max;
        if !ordered || self.jitter_min <= 0.0 || !self.jitter_max.is_finite() {
            return Err(BatteryError::InvalidJitter {
                min: self.jitter_min,
                max: self.jitter_max,
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(0.8, 1.2, 0)
    }
}

fn positive_period(field: &'static str, ms: Millis) -> Result<(), BatteryError> {
    if ms == 0 {
        return Err(BatteryError::InvalidPeriod(field));
    }
    Ok(())
}

fn in_range(
    field: &'static str,
    value: f64,
    range: std::ops::RangeInclusive<f64>,
) -> Result<(), BatteryError> {
    if !range.contains(&value) {
        return Err(BatteryError::InvalidParameter { field, value });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub cycle_ms: Millis,
    pub initial_health: f64,
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), BatteryError> {
        positive_period("aggregator.cycle_ms", self.cycle_ms)?;
        in_range("aggregator.initial_health", self.initial_health, 0.0..=100.0)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cycle_ms: 100,
            initial_health: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub settings: TaskSettings,
    pub scheduler: SchedulerConfig,
    pub response_window_ms: Millis,
    pub debounce_ms: Millis,
    /// Repeated false alarms on one label inside this window count once
    pub false_alarm_merge_ms: Millis,
    pub gauge_tick_ms: Millis,
    pub hit_impact: f64,
    pub miss_impact: f64,
    pub false_alarm_impact: f64,
    pub load_per_active: f64,
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<(), BatteryError> {
        positive_period("monitoring.gauge_tick_ms", self.gauge_tick_ms)?;
        positive_period("monitoring.response_window_ms", self.response_window_ms)
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            settings: TaskSettings::new(3.0, 4.0),
            scheduler: SchedulerConfig::new(0.8, 1.2, 0),
            response_window_ms: 5_000,
            debounce_ms: 250,
            false_alarm_merge_ms: 500,
            gauge_tick_ms: 1_000,
            hit_impact: 2.0,
            miss_impact: -5.0,
            false_alarm_impact: -5.0,
            load_per_active: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommsConfig {
    pub settings: TaskSettings,
    pub scheduler: SchedulerConfig,
    /// Response window at difficulty 0
    pub base_window_ms: Millis,
    /// Window shrink per difficulty point
    pub window_step_ms: Millis,
    pub min_window_ms: Millis,
    /// Own-ship call probability at difficulty 0
    pub own_call_chance: f64,
    pub own_call_chance_step: f64,
    pub min_own_call_chance: f64,
    pub hit_impact: f64,
    pub miss_impact: f64,
    pub false_alarm_impact: f64,
    pub correct_rejection_impact: f64,
    /// How long a finalization impulse stays on the metric stream
    pub impulse_display_ms: Millis,
    /// A message still active this long after its deadline is abandoned
    pub stale_after_ms: Millis,
    pub own_load: f64,
    pub other_load: f64,
    pub catalog: MessageCatalog,
}

impl CommsConfig {
    pub fn response_window_ms(&self, difficulty: f64) -> Millis {
        let shrink = (self.window_step_ms as f64 * difficulty.max(0.0)) as Millis;
        self.base_window_ms
            .saturating_sub(shrink)
            .max(self.min_window_ms)
    }

    pub fn validate(&self) -> Result<(), BatteryError> {
        positive_period("communications.min_window_ms", self.min_window_ms)?;
        in_range(
            "communications.min_own_call_chance",
            self.min_own_call_chance,
            0.0..=1.0,
        )?;
        in_range("communications.own_call_chance", self.own_call_chance, 0.0..=1.0)?;
        in_range(
            "communications.own_call_chance_step",
            self.own_call_chance_step,
            0.0..=1.0,
        )?;
        self.catalog.validate()
    }

    pub fn own_call_probability(&self, difficulty: f64) -> f64 {
        (self.own_call_chance - self.own_call_chance_step * difficulty)
            .max(self.min_own_call_chance)
            .clamp(0.0, 1.0)
    }
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            settings: TaskSettings::new(2.1, 4.0),
            scheduler: SchedulerConfig::new(0.5, 1.0, 3_000),
            base_window_ms: 10_000,
            window_step_ms: 500,
            min_window_ms: 5_000,
            own_call_chance: 0.35,
            own_call_chance_step: 0.02,
            min_own_call_chance: 0.1,
            hit_impact: 10.0,
            miss_impact: -5.0,
            false_alarm_impact: -10.0,
            correct_rejection_impact: 5.0,
            impulse_display_ms: 250,
            stale_after_ms: 15_000,
            own_load: 20.0,
            other_load: 10.0,
            catalog: MessageCatalog::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub settings: TaskSettings,
    pub scheduler: SchedulerConfig,
    pub tick_ms: Millis,
    /// Tank loss multiplier at difficulty 0 and 10
    pub loss_multiplier_min: f64,
    pub loss_multiplier_max: f64,
    /// Per healthy pump, per check
    pub random_failure_chance: f64,
    pub failure_check_ms: Millis,
    pub repair_min_ms: Millis,
    pub repair_max_ms: Millis,
    /// A/B count as correct within this distance of target
    pub tolerance: f64,
    pub sample_ms: Millis,
    /// Feed a deviation-based health rate into the aggregator
    pub deviation_scoring: bool,
}

impl ResourceConfig {
    pub fn validate(&self) -> Result<(), BatteryError> {
        positive_period("resource.tick_ms", self.tick_ms)?;
        positive_period("resource.failure_check_ms", self.failure_check_ms)?;
        positive_period("resource.sample_ms", self.sample_ms)?;
        in_range("resource.loss_multiplier_min", self.loss_multiplier_min, 0.0..=f64::MAX)?;
        in_range(
            "resource.loss_multiplier_max",
            self.loss_multiplier_max,
            self.loss_multiplier_min..=f64::MAX,
        )?;
        in_range(
            "resource.random_failure_chance",
            self.random_failure_chance,
            0.0..=1.0,
        )?;
        in_range("resource.tolerance", self.tolerance, 0.0..=f64::MAX)?;
        if self.repair_min_ms > self.repair_max_ms {
            return Err(BatteryError::InvalidParameter {
                field: "resource.repair_min_ms",
                value: self.repair_min_ms as f64,
            });
        }
        Ok(())
    }

    pub fn loss_multiplier(&self, difficulty: f64) -> f64 {
        let t = (difficulty / 10.0).clamp(0.0, 1.0);
        self.loss_multiplier_min + (self.loss_multiplier_max - self.loss_multiplier_min) * t
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            settings: TaskSettings::new(3.0, 1.0),
            scheduler: SchedulerConfig::new(0.85, 1.15, 0),
            tick_ms: 100,
            loss_multiplier_min: 0.25,
            loss_multiplier_max: 0.75,
            random_failure_chance: 0.01,
            failure_check_ms: 1_000,
            repair_min_ms: 5_000,
            repair_max_ms: 15_000,
            tolerance: 250.0,
            sample_ms: 1_000,
            deviation_scoring: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub settings: TaskSettings,
    pub scheduler: SchedulerConfig,
    pub tick_ms: Millis,
    pub target_half_width: f64,
    pub bound: f64,
    pub restitution: f64,
    /// Continuous manual control needed to recover from an automation failure
    pub recovery_ms: Millis,
    /// Health per second while manual, gained inside the target and lost outside
    pub health_rate: f64,
    pub load_inside: f64,
    pub load_outside: f64,
    pub sample_ms: Millis,
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), BatteryError> {
        positive_period("tracking.tick_ms", self.tick_ms)?;
        positive_period("tracking.sample_ms", self.sample_ms)?;
        in_range("tracking.bound", self.bound, f64::MIN_POSITIVE..=f64::MAX)?;
        in_range("tracking.target_half_width", self.target_half_width, 0.0..=self.bound)?;
        in_range("tracking.restitution", self.restitution, 0.0..=1.0)?;
        in_range("tracking.health_rate", self.health_rate, 0.0..=f64::MAX)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            settings: TaskSettings::new(1.5, 4.0),
            scheduler: SchedulerConfig::new(0.7, 1.3, 0),
            tick_ms: 16,
            target_half_width: Cursor::TARGET_HALF_WIDTH,
            bound: Cursor::BOUND,
            restitution: 0.8,
            recovery_ms: 5_000,
            health_rate: 0.5,
            load_inside: 15.0,
            load_outside: 30.0,
            sample_ms: 1_000,
        }
    }
}

/// Complete battery configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Session seed; `None` draws one from entropy at construction
    pub seed: Option<u64>,
    pub aggregator: AggregatorConfig,
    pub monitoring: MonitoringConfig,
    pub communications: CommsConfig,
    pub resource: ResourceConfig,
    pub tracking: TrackingConfig,
}

impl BatteryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, BatteryError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BatteryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| BatteryError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), BatteryError> {
        for task in TaskKind::ALL {
            self.settings(task).validate()?;
            self.scheduler(task).validate()?;
        }
        self.aggregator.validate()?;
        self.monitoring.validate()?;
        self.communications.validate()?;
        self.resource.validate()?;
        self.tracking.validate()
    }

    pub fn settings(&self, task: TaskKind) -> &TaskSettings {
        match task {
            TaskKind::Monitoring => &self.monitoring.settings,
            TaskKind::Communications => &self.communications.settings,
            TaskKind::Resource => &self.resource.settings,
            TaskKind::Tracking => &self.tracking.settings,
        }
    }

    pub fn settings_mut(&mut self, task: TaskKind) -> &mut TaskSettings {
        match task {
            TaskKind::Monitoring => &mut self.monitoring.settings,
            TaskKind::Communications => &mut self.communications.settings,
            TaskKind::Resource => &mut self.resource.settings,
            TaskKind::Tracking => &mut self.tracking.settings,
        }
    }

    pub fn scheduler(&self, task: TaskKind) -> &SchedulerConfig {
        match task {
            TaskKind::Monitoring => &self.monitoring.scheduler,
            TaskKind::Communications => &self.communications.scheduler,
            TaskKind::Resource => &self.resource.scheduler,
            TaskKind::Tracking => &self.tracking.scheduler,
        }
    }
}
