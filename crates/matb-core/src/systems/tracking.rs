//! Tracking simulator - 2D cursor drift with automatic correction and
//! injected automation failures.

use rand::Rng;
use std::f64::consts::TAU;

use super::{earliest, EventScheduler, TaskSimulator};
use crate::components::{Cursor, ManualCause, Metric, TaskKind, TrackingMode, Vec2};
use crate::config::{TaskSettings, TrackingConfig};
use crate::records::{LogEntry, Outbox, TrackingRecord, TrackingTransition};
use crate::rng::SimRng;
use crate::timers::{Millis, TimerSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingTimer {
    Tick,
    Sample,
    /// End of a manual episode; carries the episode number it belongs to
    Restore(u64),
}

// Per-tick drift constants.
const DRIFT_SPEED: f64 = 0.4;
const RANDOM_ACCEL: f64 = 0.15;
const MAX_DRIFT: f64 = 1.5;
const AUTO_PULL: f64 = 0.05;
const AUTO_DAMPING: f64 = 0.9;
const MANUAL_DAMPING: f64 = 0.98;

pub struct TrackingSimulator {
    config: TrackingConfig,
    settings: TaskSettings,
    cursor: Cursor,
    mode: TrackingMode,
    cause: Option<ManualCause>,
    /// Difficulty of the current forced episode
    episode_difficulty: Option<f64>,
    /// Bumped on every mode change; stale restore timers compare against it
    episode: u64,
    /// When the current timed episode hands control back
    restore_at: Option<Millis>,
    log: Vec<TrackingRecord>,
    last_metric: Option<(f64, f64)>,
    timers: TimerSet<TrackingTimer>,
    scheduler: EventScheduler,
    rng: SimRng,
    running: bool,
    outbox: Outbox,
}

impl TrackingSimulator {
    pub fn new(config: TrackingConfig, rng: SimRng) -> Self {
        let settings = config.settings;
        let scheduler = EventScheduler::new(config.scheduler);
        Self {
            config,
            settings,
            cursor: Cursor::centered(),
            mode: TrackingMode::Auto,
            cause: None,
            episode_difficulty: None,
            episode: 0,
            restore_at: None,
            log: Vec::new(),
            last_metric: None,
            timers: TimerSet::new(),
            scheduler,
            rng,
            running: false,
            outbox: Outbox::default(),
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn manual_cause(&self) -> Option<ManualCause> {
        self.cause
    }

    pub fn log(&self) -> &[TrackingRecord] {
        &self.log
    }

    pub fn is_within_target(&self) -> bool {
        self.cursor.is_within_target(self.config.target_half_width)
    }

    /// Health per second: earned inside the target and lost outside it, and
    /// only while under manual control.
    pub fn health_rate(&self) -> f64 {
        match self.mode {
            TrackingMode::Auto => 0.0,
            TrackingMode::Manual if self.is_within_target() => self.config.health_rate,
            TrackingMode::Manual => -self.config.health_rate,
        }
    }

    pub fn system_load(&self) -> f64 {
        match self.mode {
            TrackingMode::Auto => 0.0,
            TrackingMode::Manual if self.is_within_target() => self.config.load_inside,
            TrackingMode::Manual => self.config.load_outside,
        }
    }

    /// Place the cursor directly, clamped to the field.
    pub fn set_position(&mut self, position: Vec2, now: Millis) {
        let bound = self.config.bound;
        self.cursor.position = Vec2::new(
            position.x.clamp(-bound, bound),
            position.y.clamp(-bound, bound),
        );
        self.publish(now, false);
    }

    /// Operator steering. Ignored while automation is in control.
    pub fn move_pointer(&mut self, dx: f64, dy: f64, now: Millis) {
        if !self.settings.enabled || self.mode == TrackingMode::Auto {
            return;
        }
        let target = self.cursor.position + Vec2::new(dx, dy);
        self.set_position(target, now);
    }

    /// Operator switch between automatic and manual control. Returns the
    /// new mode.
    pub fn toggle_automation(&mut self, now: Millis) -> TrackingMode {
        if !self.settings.enabled {
            return self.mode;
        }
        match self.mode {
            TrackingMode::Auto => self.enter_manual(ManualCause::Operator, None, now),
            TrackingMode::Manual => self.restore_auto(TrackingTransition::OperatorToggle, now),
        }
        self.mode
    }

    /// Start a timed manual episode. Returns false when already manual.
    pub fn force_manual_control(
        &mut self,
        duration_ms: Millis,
        difficulty: f64,
        now: Millis,
    ) -> bool {
        if !self.settings.enabled || self.mode == TrackingMode::Manual {
            return false;
        }
        self.enter_manual(ManualCause::Forced, Some(difficulty.clamp(0.0, 10.0)), now);
        self.arm_restore(now + duration_ms);
        true
    }

    /// Scheduler trigger: automation fails and the operator must take over.
    pub fn automation_failure(&mut self, now: Millis) -> bool {
        if !self.settings.enabled || self.mode == TrackingMode::Manual {
            return false;
        }
        self.enter_manual(ManualCause::AutomationFailure, None, now);
        self.arm_restore(now + self.config.recovery_ms);
        true
    }

    fn arm_restore(&mut self, at: Millis) {
        self.restore_at = Some(at);
        self.timers.arm(TrackingTimer::Restore(self.episode), at);
    }

    fn enter_manual(&mut self, cause: ManualCause, difficulty: Option<f64>, now: Millis) {
        self.episode += 1;
        self.restore_at = None;
        self.mode = TrackingMode::Manual;
        self.cause = Some(cause);
        self.episode_difficulty = difficulty;

        let push = 0.1 * self.difficulty() / 5.0;
        let angle = self.rng.gen_range(0.0..TAU);
        self.cursor.velocity = Vec2::from_angle(angle, push);

        let transition = match cause {
            ManualCause::AutomationFailure => TrackingTransition::AutomationFailure,
            ManualCause::Forced => TrackingTransition::ManualForced,
            ManualCause::Operator => TrackingTransition::OperatorToggle,
        };
        log::info!("tracking switched to manual: {:?}", transition);
        self.transition(transition, now);
    }

    fn restore_auto(&mut self, transition: TrackingTransition, now: Millis) {
        self.episode += 1;
        self.restore_at = None;
        self.mode = TrackingMode::Auto;
        self.cause = None;
        self.episode_difficulty = None;
        self.cursor.velocity = Vec2::ZERO;
        log::info!("tracking back to auto: {:?}", transition);
        self.transition(transition, now);
    }

    fn transition(&mut self, transition: TrackingTransition, now: Millis) {
        self.record(TrackingRecord::Transition {
            at: now,
            transition,
            mode: self.mode,
        });
        self.publish(now, false);
    }

    fn difficulty(&self) -> f64 {
        self.episode_difficulty.unwrap_or(self.settings.difficulty)
    }

    /// One physics tick.
    pub fn step(&mut self) {
        let d = self.difficulty();
        let multiplier = match self.mode {
            TrackingMode::Auto => 1.0,
            TrackingMode::Manual => 0.25 + (d / 10.0) * 1.25,
        };
        let noise = match self.mode {
            TrackingMode::Auto => RANDOM_ACCEL,
            TrackingMode::Manual => RANDOM_ACCEL * multiplier * (1.0 + d / 20.0),
        };
        let limit = MAX_DRIFT * multiplier;

        let mut v = self.cursor.velocity;
        v.x = (v.x + (self.rng.gen::<f64>() - 0.5) * noise).clamp(-limit, limit);
        v.y = (v.y + (self.rng.gen::<f64>() - 0.5) * noise).clamp(-limit, limit);

        let position = self.cursor.position + v * (DRIFT_SPEED * multiplier);
        match self.mode {
            TrackingMode::Auto => {
                v = (v + position * -AUTO_PULL) * AUTO_DAMPING;
            }
            TrackingMode::Manual => {
                v = v * MANUAL_DAMPING;
                let half = self.config.target_half_width;
                if position.x.abs() > half || position.y.abs() > half {
                    let assist = (0.2 - d / 100.0).max(0.0);
                    v = v + position * (-assist / 100.0);
                }
            }
        }

        self.cursor.position = position;
        self.cursor.velocity = v;
        self.cursor.bounce(self.config.bound, self.config.restitution);
    }

    fn sample(&mut self, now: Millis) {
        let p = self.cursor.position;
        self.record(TrackingRecord::Sample {
            at: now,
            rms_error: p.length(),
            within_target: self.is_within_target(),
            mode: self.mode,
            x: p.x,
            y: p.y,
        });
    }

    fn record(&mut self, row: TrackingRecord) {
        self.outbox.log(LogEntry::Tracking(row.clone()));
        self.log.push(row);
    }

    fn publish(&mut self, now: Millis, force: bool) {
        let current = (self.health_rate(), self.system_load());
        if force || self.last_metric != Some(current) {
            self.last_metric = Some(current);
            self.outbox
                .metric(Metric::rate(TaskKind::Tracking, current.0, current.1, now));
        }
    }

    fn arm_periodic(&mut self, now: Millis) {
        self.timers.arm(TrackingTimer::Tick, now + self.config.tick_ms);
        self.timers.arm(TrackingTimer::Sample, now + self.config.sample_ms);
        // A timed episode resumes with whatever time it had left.
        if let Some(at) = self.restore_at {
            self.timers.arm(TrackingTimer::Restore(self.episode), at.max(now));
        }
        self.scheduler
            .schedule(now, self.settings.events_per_minute, &mut self.rng);
        self.publish(now, true);
    }
}

impl TaskSimulator for TrackingSimulator {
    fn kind(&self) -> TaskKind {
        TaskKind::Tracking
    }

    fn settings(&self) -> TaskSettings {
        self.settings
    }

    fn start(&mut self, now: Millis) {
        self.running = true;
        if !self.settings.enabled {
            return;
        }
        self.timers.clear();
        self.arm_periodic(now);
    }

    fn stop(&mut self, _now: Millis) {
        self.running = false;
        self.timers.clear();
        self.scheduler.stop();
    }

    fn apply_settings(&mut self, settings: TaskSettings, now: Millis) {
        let was_enabled = self.settings.enabled;
        self.settings = settings;
        match (was_enabled, settings.enabled) {
            (true, false) => {
                self.timers.clear();
                self.scheduler.stop();
                self.last_metric = None;
                self.outbox.metric(Metric::zero(TaskKind::Tracking, now));
            }
            (false, true) if self.running => self.start(now),
            (true, true) => {
                self.scheduler
                    .set_rate(now, settings.events_per_minute, &mut self.rng);
            }
            _ => {}
        }
    }

    fn pause(&mut self) {
        self.scheduler.pause();
    }

    fn resume(&mut self, now: Millis) {
        self.scheduler.resume(now, &mut self.rng);
    }

    fn reset(&mut self, now: Millis) {
        self.timers.clear();
        self.scheduler.stop();
        self.cursor = Cursor::centered();
        self.mode = TrackingMode::Auto;
        self.cause = None;
        self.episode_difficulty = None;
        self.episode += 1;
        self.restore_at = None;
        self.log.clear();
        self.last_metric = None;
        self.outbox.clear();
        self.outbox.metric(Metric::zero(TaskKind::Tracking, now));
        if self.running && self.settings.enabled {
            self.arm_periodic(now);
        }
    }

    fn next_due(&mut self) -> Option<Millis> {
        earliest(self.timers.next_due(), self.scheduler.next_due())
    }

    fn fire_due(&mut self, now: Millis) -> bool {
        let timer_due = self.timers.next_due().filter(|&due| due <= now);
        let trigger_due = self.scheduler.next_due().filter(|&due| due <= now);

        if let Some(due) = trigger_due {
            if timer_due.map_or(true, |t| due < t) {
                if self.scheduler.poll(now, &mut self.rng) && !self.automation_failure(now) {
                    log::debug!("tracking already manual, failure skipped");
                }
                return true;
            }
        }

        match self.timers.pop_due(now) {
            Some((_, TrackingTimer::Tick)) => {
                self.step();
                self.publish(now, false);
                self.timers.arm(TrackingTimer::Tick, now + self.config.tick_ms);
            }
            Some((_, TrackingTimer::Sample)) => {
                self.sample(now);
                self.timers.arm(TrackingTimer::Sample, now + self.config.sample_ms);
            }
            Some((_, TrackingTimer::Restore(episode))) => {
                // Operator-selected manual mode never auto-restores.
                let timed = matches!(
                    self.cause,
                    Some(ManualCause::AutomationFailure | ManualCause::Forced)
                );
                if episode == self.episode && timed {
                    self.restore_auto(TrackingTransition::AutoRestored, now);
                }
            }
            None => return false,
        }
        true
    }

    fn current_metric(&self, now: Millis) -> Metric {
        if !self.settings.enabled {
            return Metric::zero(TaskKind::Tracking, now);
        }
        Metric::rate(TaskKind::Tracking, self.health_rate(), self.system_load(), now)
    }

    fn outbox(&mut self) -> &mut Outbox {
        &mut self.outbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::task_rng;

    fn simulator() -> TrackingSimulator {
        let mut config = TrackingConfig::default();
        config.settings.events_per_minute = 0.01;
        let mut sim = TrackingSimulator::new(config, task_rng(11, TaskKind::Tracking));
        sim.start(0);
        sim
    }

    fn run_until(sim: &mut TrackingSimulator, t: Millis) {
        while let Some(due) = sim.next_due() {
            if due > t {
                break;
            }
            sim.fire_due(due);
        }
    }

    #[test]
    fn test_auto_mode_recenters() {
        let mut sim = simulator();
        sim.set_position(Vec2::new(100.0, -60.0), 0);
        let start = sim.cursor().position.length();
        for _ in 0..300 {
            sim.step();
        }
        let end = sim.cursor().position.length();
        assert!(end < start / 10.0, "from {start} to {end}");
        assert!(sim.is_within_target());
    }

    #[test]
    fn test_cursor_stays_in_bounds() {
        let mut sim = simulator();
        sim.force_manual_control(600_000, 10.0, 0);
        sim.set_position(Vec2::new(149.0, -149.0), 0);
        sim.cursor.velocity = Vec2::new(5.0, -5.0);
        for _ in 0..20_000 {
            sim.step();
            let p = sim.cursor().position;
            assert!(p.x.abs() <= 150.0 && p.y.abs() <= 150.0);
        }
        sim.move_pointer(1_000.0, -1_000.0, 0);
        let p = sim.cursor().position;
        assert_eq!((p.x, p.y), (150.0, -150.0));
    }

    #[test]
    fn test_manual_rates_and_load() {
        let mut sim = simulator();
        assert_eq!(sim.health_rate(), 0.0);
        assert_eq!(sim.system_load(), 0.0);

        assert_eq!(sim.toggle_automation(0), TrackingMode::Manual);
        sim.set_position(Vec2::new(10.0, 10.0), 0);
        assert_eq!(sim.health_rate(), 0.5);
        assert_eq!(sim.system_load(), 15.0);

        sim.move_pointer(30.0, 0.0, 0);
        assert_eq!(sim.health_rate(), -0.5);
        assert_eq!(sim.system_load(), 30.0);
    }

    #[test]
    fn test_automation_failure_recovers_after_five_seconds() {
        let mut sim = simulator();
        run_until(&mut sim, 1_000);
        assert!(sim.automation_failure(1_000));
        assert!(!sim.automation_failure(1_500));
        assert_eq!(sim.mode(), TrackingMode::Manual);

        run_until(&mut sim, 5_999);
        assert_eq!(sim.mode(), TrackingMode::Manual);
        run_until(&mut sim, 6_000);
        assert_eq!(sim.mode(), TrackingMode::Auto);

        let transitions: Vec<TrackingTransition> = sim
            .log()
            .iter()
            .filter_map(|r| match r {
                TrackingRecord::Transition { transition, .. } => Some(*transition),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                TrackingTransition::AutomationFailure,
                TrackingTransition::AutoRestored
            ]
        );
    }

    #[test]
    fn test_force_manual_control() {
        let mut sim = simulator();
        assert!(sim.force_manual_control(2_000, 8.0, 0));
        assert!(!sim.force_manual_control(2_000, 8.0, 100));
        assert_eq!(sim.manual_cause(), Some(ManualCause::Forced));
        run_until(&mut sim, 2_000);
        assert_eq!(sim.mode(), TrackingMode::Auto);
    }

    #[test]
    fn test_forced_episode_survives_disable_and_reenable() {
        let mut sim = simulator();
        assert!(sim.force_manual_control(2_000, 5.0, 0));

        let mut settings = sim.settings();
        settings.enabled = false;
        sim.apply_settings(settings, 500);
        settings.enabled = true;
        sim.apply_settings(settings, 500);

        run_until(&mut sim, 1_999);
        assert_eq!(sim.mode(), TrackingMode::Manual);
        run_until(&mut sim, 2_000);
        assert_eq!(sim.mode(), TrackingMode::Auto);
    }

    #[test]
    fn test_failure_restore_keeps_remaining_time_across_restart() {
        let mut sim = simulator();
        assert!(sim.automation_failure(1_000));
        sim.stop(3_000);
        sim.start(3_000);

        run_until(&mut sim, 5_999);
        assert_eq!(sim.mode(), TrackingMode::Manual);
        run_until(&mut sim, 6_000);
        assert_eq!(sim.mode(), TrackingMode::Auto);
    }

    #[test]
    fn test_operator_toggle_cancels_pending_restore() {
        let mut sim = simulator();
        sim.automation_failure(0);
        // operator takes back auto, then switches manual again themselves
        sim.toggle_automation(1_000);
        sim.toggle_automation(2_000);
        run_until(&mut sim, 10_000);
        assert_eq!(sim.mode(), TrackingMode::Manual);
        assert_eq!(sim.manual_cause(), Some(ManualCause::Operator));
    }

    #[test]
    fn test_samples_once_per_second() {
        let mut sim = simulator();
        run_until(&mut sim, 3_000);
        let samples = sim
            .log()
            .iter()
            .filter(|r| matches!(r, TrackingRecord::Sample { .. }))
            .count();
        assert_eq!(samples, 3);
    }
}
