//! Battery engine - main entry point for running a session
//!
//! `Battery` owns the virtual clock, the four task simulators and the
//! health/load aggregator. `update(delta)` fires every due timer in time
//! order, forwarding each simulator's emissions to the aggregator and the
//! observer before the next timer runs.

use crate::components::*;
use crate::config::{BatteryConfig, TaskSettings};
use crate::error::BatteryError;
use crate::records::BatteryObserver;
use crate::rng::{entropy_seed, task_rng};
use crate::systems::*;
use crate::timers::Millis;

/// Where the next due timer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Task(TaskKind),
    Aggregator,
}

/// Main battery engine
pub struct Battery {
    config: BatteryConfig,
    seed: u64,
    /// Virtual clock in milliseconds since construction
    now: Millis,
    running: bool,
    time_scale: f64,
    /// Sub-millisecond remainder of scaled updates
    carry: f64,

    monitoring: MonitoringSimulator,
    communications: CommsSimulator,
    resource: ResourceSimulator,
    tracking: TrackingSimulator,
    aggregator: HealthAggregator,

    observer: Option<Box<dyn BatteryObserver + Send>>,
}

impl Battery {
    /// Build a stopped battery. Fails on an invalid configuration.
    pub fn new(config: BatteryConfig) -> Result<Self, BatteryError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(entropy_seed);
        log::info!("battery created with seed {}", seed);

        Ok(Self {
            seed,
            now: 0,
            running: false,
            time_scale: 1.0,
            carry: 0.0,
            monitoring: MonitoringSimulator::new(
                config.monitoring.clone(),
                task_rng(seed, TaskKind::Monitoring),
            ),
            communications: CommsSimulator::new(
                config.communications.clone(),
                task_rng(seed, TaskKind::Communications),
            ),
            resource: ResourceSimulator::new(
                config.resource.clone(),
                task_rng(seed, TaskKind::Resource),
            ),
            tracking: TrackingSimulator::new(
                config.tracking.clone(),
                task_rng(seed, TaskKind::Tracking),
            ),
            aggregator: HealthAggregator::new(config.aggregator.clone()),
            observer: None,
            config,
        })
    }

    /// Start every enabled task and reset health.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        let now = self.now;
        for task in TaskKind::ALL {
            self.simulator_mut(task).start(now);
        }
        self.aggregator.start(now);
        self.flush();
        self.publish_health();
    }

    /// Cancel every pending timer. State and logs are kept.
    pub fn stop(&mut self) {
        self.running = false;
        let now = self.now;
        for task in TaskKind::ALL {
            self.simulator_mut(task).stop(now);
        }
        self.aggregator.stop();
        self.flush();
    }

    /// Reinitialize all four tasks and the aggregator.
    pub fn reset(&mut self) {
        let now = self.now;
        for task in TaskKind::ALL {
            self.simulator_mut(task).reset(now);
        }
        if self.running {
            self.aggregator.start(now);
        } else {
            self.aggregator
                .reset_health(self.config.aggregator.initial_health, now);
        }
        self.flush();
        self.publish_health();
        log::info!("battery reset at {} ms", now);
    }

    /// Advance by `delta_ms` of wall time, scaled by the time scale.
    pub fn update(&mut self, delta_ms: Millis) {
        let scaled = delta_ms as f64 * self.time_scale + self.carry;
        let whole = scaled.floor();
        self.carry = scaled - whole;
        self.advance_to(self.now + whole as Millis);
    }

    /// Fire every timer due up to `t` in time order, then set the clock to `t`.
    pub fn advance_to(&mut self, t: Millis) {
        // Emissions from direct simulator access since the last call.
        self.flush();
        if !self.running {
            self.now = self.now.max(t);
            return;
        }
        while let Some((due, source)) = self.next_due(t) {
            self.now = self.now.max(due);
            let now = self.now;
            let fired = match source {
                Source::Task(task) => self.simulator_mut(task).fire_due(now),
                Source::Aggregator => match self.aggregator.fire_due(now) {
                    Some(_) => {
                        self.publish_metrics();
                        self.publish_health();
                        true
                    }
                    None => false,
                },
            };
            self.flush();
            if !fired {
                log::warn!("timer due at {} ms did not fire", due);
                break;
            }
        }
        self.now = self.now.max(t);
    }

    /// Earliest timer due at or before `limit`. Ties go to the first source
    /// in task order, aggregator last.
    fn next_due(&mut self, limit: Millis) -> Option<(Millis, Source)> {
        let mut best: Option<(Millis, Source)> = None;
        for task in TaskKind::ALL {
            if let Some(due) = self.simulator_mut(task).next_due() {
                if due <= limit && best.map_or(true, |(b, _)| due < b) {
                    best = Some((due, Source::Task(task)));
                }
            }
        }
        if let Some(due) = self.aggregator.next_due() {
            if due <= limit && best.map_or(true, |(b, _)| due < b) {
                best = Some((due, Source::Aggregator));
            }
        }
        best
    }

    /// Forward pending logs and metrics from every simulator.
    fn flush(&mut self) {
        let now = self.now;
        for task in TaskKind::ALL {
            let (metrics, logs) = self.simulator_mut(task).outbox().take();
            for metric in &metrics {
                self.aggregator.observe(metric, now);
            }
            if let Some(observer) = self.observer.as_mut() {
                for entry in &logs {
                    observer.on_log_update(entry);
                }
                for metric in &metrics {
                    observer.on_metrics_update(metric);
                }
            }
        }
    }

    fn publish_health(&mut self) {
        let state = self.aggregator.state();
        if let Some(observer) = self.observer.as_mut() {
            observer.on_health_update(state);
        }
    }

    /// Every task's current metric, once per aggregation cycle.
    fn publish_metrics(&mut self) {
        let Some(observer) = self.observer.as_mut() else {
            return;
        };
        let now = self.now;
        let sims: [&dyn TaskSimulator; 4] = [
            &self.monitoring,
            &self.communications,
            &self.resource,
            &self.tracking,
        ];
        for sim in sims {
            observer.on_metrics_update(&sim.current_metric(now));
        }
    }

    fn simulator_mut(&mut self, task: TaskKind) -> &mut dyn TaskSimulator {
        match task {
            TaskKind::Monitoring => &mut self.monitoring,
            TaskKind::Communications => &mut self.communications,
            TaskKind::Resource => &mut self.resource,
            TaskKind::Tracking => &mut self.tracking,
        }
    }

    // --- Configuration ---

    /// Apply new settings to one task without restarting it.
    pub fn set_task_settings(
        &mut self,
        task: TaskKind,
        settings: TaskSettings,
    ) -> Result<(), BatteryError> {
        if let Err(err) = settings.validate() {
            log::warn!("rejected {} settings: {}", task, err);
            return Err(err);
        }
        *self.config.settings_mut(task) = settings;
        let now = self.now;
        self.simulator_mut(task).apply_settings(settings, now);
        self.flush();
        Ok(())
    }

    pub fn task_settings(&self, task: TaskKind) -> TaskSettings {
        *self.config.settings(task)
    }

    /// Stop generating new events for one task. Ticks and pending
    /// deadlines keep running.
    pub fn pause_task(&mut self, task: TaskKind) {
        self.simulator_mut(task).pause();
    }

    pub fn resume_task(&mut self, task: TaskKind) {
        let now = self.now;
        self.simulator_mut(task).resume(now);
    }

    /// Return one task to its initial condition.
    pub fn reset_task(&mut self, task: TaskKind) {
        let now = self.now;
        self.simulator_mut(task).reset(now);
        self.flush();
    }

    /// Set time scale (1.0 = real-time, 2.0 = 2x speed, etc.)
    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = scale.max(0.0);
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    // --- Operator input ---

    /// Monitoring response on one indicator.
    pub fn respond(&mut self, label: IndicatorLabel) -> Option<Outcome> {
        let outcome = self.monitoring.respond(label, self.now);
        self.flush();
        outcome
    }

    pub fn select_radio(&mut self, radio: Radio) {
        self.communications.select_radio(radio, self.now);
        self.flush();
    }

    pub fn set_frequency(&mut self, radio: Radio, frequency: Frequency) {
        self.communications.set_frequency(radio, frequency, self.now);
        self.flush();
    }

    pub fn cycle_radio(&mut self, delta: i32) {
        self.communications.cycle_radio(delta, self.now);
        self.flush();
    }

    pub fn step_frequency(&mut self, radio: Radio, steps: i32) {
        self.communications.step_frequency(radio, steps, self.now);
        self.flush();
    }

    pub fn clear_active_message(&mut self) -> Option<u64> {
        let id = self.communications.clear_active_message(self.now);
        self.flush();
        id
    }

    pub fn toggle_pump(&mut self, pump: PumpId) -> bool {
        let toggled = self.resource.toggle_pump(pump, self.now);
        self.flush();
        toggled
    }

    pub fn move_pointer(&mut self, dx: f64, dy: f64) {
        self.tracking.move_pointer(dx, dy, self.now);
        self.flush();
    }

    pub fn toggle_automation(&mut self) -> TrackingMode {
        let mode = self.tracking.toggle_automation(self.now);
        self.flush();
        mode
    }

    pub fn force_manual_control(&mut self, duration_ms: Millis, difficulty: f64) -> bool {
        let forced = self
            .tracking
            .force_manual_control(duration_ms, difficulty, self.now);
        self.flush();
        forced
    }

    // --- Direct event injection ---

    pub fn trigger_monitoring_event(&mut self, label: Option<IndicatorLabel>) -> Option<u64> {
        let id = self.monitoring.trigger_event(label, self.now);
        self.flush();
        id
    }

    pub fn inject_message(&mut self, template: MessageTemplate) -> Option<u64> {
        let id = self.communications.enqueue(template, self.now);
        self.flush();
        id
    }

    pub fn fail_pump(&mut self, pump: PumpId) -> bool {
        let failed = self.resource.fail_pump(pump, true, self.now);
        self.flush();
        failed
    }

    pub fn trigger_automation_failure(&mut self) -> bool {
        let failed = self.tracking.automation_failure(self.now);
        self.flush();
        failed
    }

    // --- Aggregate state ---

    pub fn current_health(&self) -> f64 {
        self.aggregator.current_health()
    }

    pub fn current_load(&self) -> f64 {
        self.aggregator.current_load()
    }

    pub fn state(&self) -> AggregateHealthState {
        self.aggregator.state()
    }

    /// Set health to `initial` and load to zero, dropping pending impulses.
    pub fn reset_health(&mut self, initial: f64) {
        self.aggregator.reset_health(initial, self.now);
        self.publish_health();
    }

    // --- Accessors ---

    pub fn set_observer(&mut self, observer: Box<dyn BatteryObserver + Send>) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    pub fn monitoring(&self) -> &MonitoringSimulator {
        &self.monitoring
    }

    pub fn communications(&self) -> &CommsSimulator {
        &self.communications
    }

    pub fn resource(&self) -> &ResourceSimulator {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut ResourceSimulator {
        &mut self.resource
    }

    pub fn tracking(&self) -> &TrackingSimulator {
        &self.tracking
    }

    pub fn tracking_mut(&mut self) -> &mut TrackingSimulator {
        &mut self.tracking
    }

    pub fn aggregator(&self) -> &HealthAggregator {
        &self.aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Recorder;

    fn quiet_config() -> BatteryConfig {
        let mut config = BatteryConfig::default().with_seed(42);
        for task in TaskKind::ALL {
            config.settings_mut(task).events_per_minute = 0.01;
        }
        config.resource.random_failure_chance = 0.0;
        config
    }

    #[test]
    fn test_engine_creation() {
        let battery = Battery::new(quiet_config()).unwrap();
        assert_eq!(battery.now(), 0);
        assert_eq!(battery.seed(), 42);
        assert!(!battery.is_running());
        assert_eq!(battery.current_health(), 100.0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = quiet_config();
        config.monitoring.settings.events_per_minute = 0.0;
        assert!(Battery::new(config).is_err());
    }

    #[test]
    fn test_stopped_engine_only_moves_clock() {
        let mut battery = Battery::new(quiet_config()).unwrap();
        battery.update(10_000);
        assert_eq!(battery.now(), 10_000);
        assert_eq!(battery.aggregator().cycles(), 0);
    }

    #[test]
    fn test_aggregator_cycles_every_100ms() {
        let mut battery = Battery::new(quiet_config()).unwrap();
        battery.start();
        for _ in 0..60 {
            battery.update(16);
        }
        assert_eq!(battery.now(), 960);
        assert_eq!(battery.aggregator().cycles(), 9);
    }

    #[test]
    fn test_time_scale() {
        let mut battery = Battery::new(quiet_config()).unwrap();
        battery.set_time_scale(2.5);
        battery.update(3);
        battery.update(3);
        assert_eq!(battery.now(), 15);
    }

    #[test]
    fn test_observer_sees_impulse_and_health() {
        let mut battery = Battery::new(quiet_config()).unwrap();
        let recorder = Recorder::shared();
        battery.set_observer(Box::new(recorder.clone()));
        battery.start();

        battery.update(1_000);
        battery.respond(IndicatorLabel::F2);
        battery.update(200);

        assert!((battery.current_health() - 95.0).abs() < 1e-9);
        let recorder = recorder.lock().unwrap();
        assert_eq!(
            recorder.outcomes(TaskKind::Monitoring),
            vec![Outcome::FalseAlarm]
        );
        assert!(recorder.metrics.iter().any(|m| m.health_impact == -5.0));
        assert!(!recorder.health.is_empty());
    }

    #[test]
    fn test_metrics_published_every_cycle() {
        let mut battery = Battery::new(quiet_config()).unwrap();
        let recorder = Recorder::shared();
        battery.set_observer(Box::new(recorder.clone()));
        battery.start();
        battery.update(500);

        let recorder = recorder.lock().unwrap();
        for task in TaskKind::ALL {
            let count = recorder.metrics.iter().filter(|m| m.task == task).count();
            assert!(count >= 5, "{} published {} metrics", task, count);
        }
    }

    #[test]
    fn test_disable_ignores_input_and_zeroes_metric() {
        let mut battery = Battery::new(quiet_config()).unwrap();
        battery.start();
        battery.toggle_automation();
        battery.update(100);
        assert_eq!(battery.current_load(), 15.0);

        let mut settings = battery.task_settings(TaskKind::Tracking);
        settings.enabled = false;
        battery.set_task_settings(TaskKind::Tracking, settings).unwrap();
        battery.update(100);
        assert_eq!(battery.current_load(), 0.0);
        assert_eq!(battery.aggregator().rate(TaskKind::Tracking), 0.0);
        assert_eq!(battery.toggle_automation(), TrackingMode::Manual);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut battery = Battery::new(quiet_config()).unwrap();
        let result = battery.set_task_settings(TaskKind::Resource, TaskSettings::new(-1.0, 3.0));
        assert!(matches!(result, Err(BatteryError::InvalidEventRate(_))));
        assert_eq!(battery.task_settings(TaskKind::Resource).events_per_minute, 0.01);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut battery = Battery::new(quiet_config()).unwrap();
        battery.start();
        battery.trigger_monitoring_event(Some(IndicatorLabel::F1));
        battery.update(6_000);
        assert!(battery.current_health() < 100.0);

        battery.reset();
        assert_eq!(battery.current_health(), 100.0);
        assert_eq!(battery.current_load(), 0.0);
        assert!(battery.monitoring().log().is_empty());
        battery.update(10_000);
        assert_eq!(battery.current_health(), 100.0);
    }
}
