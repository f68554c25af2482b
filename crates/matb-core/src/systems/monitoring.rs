//! System monitoring simulator - fault injection, gauge drift and response
//! scoring for the six indicators.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

use super::{earliest, EventScheduler, TaskSimulator};
use crate::components::{
    GaugeSide, Indicator, IndicatorLabel, Metric, MonitoringEvent, Outcome, TaskKind,
};
use crate::config::{MonitoringConfig, TaskSettings};
use crate::records::{LogEntry, MonitoringRecord, Outbox};
use crate::rng::SimRng;
use crate::timers::{Millis, TimerId, TimerSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringTimer {
    GaugeTick,
    Deadline(u64),
}

pub struct MonitoringSimulator {
    config: MonitoringConfig,
    settings: TaskSettings,
    indicators: [Indicator; 6],
    /// Every event ever triggered, in trigger order
    events: Vec<MonitoringEvent>,
    /// Active event per label
    active: HashMap<IndicatorLabel, (u64, TimerId)>,
    log: Vec<MonitoringRecord>,
    last_press: HashMap<IndicatorLabel, Millis>,
    last_false_alarm: HashMap<IndicatorLabel, Millis>,
    timers: TimerSet<MonitoringTimer>,
    scheduler: EventScheduler,
    rng: SimRng,
    running: bool,
    next_event_id: u64,
    outbox: Outbox,
}

impl MonitoringSimulator {
    pub fn new(config: MonitoringConfig, rng: SimRng) -> Self {
        let settings = config.settings;
        let scheduler = EventScheduler::new(config.scheduler);
        Self {
            config,
            settings,
            indicators: IndicatorLabel::ALL.map(Indicator::new),
            events: Vec::new(),
            active: HashMap::new(),
            log: Vec::new(),
            last_press: HashMap::new(),
            last_false_alarm: HashMap::new(),
            timers: TimerSet::new(),
            scheduler,
            rng,
            running: false,
            next_event_id: 1,
            outbox: Outbox::default(),
        }
    }

    pub fn indicator(&self, label: IndicatorLabel) -> &Indicator {
        &self.indicators[label.index()]
    }

    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    /// Labels with an active event, in label order.
    pub fn active_labels(&self) -> Vec<IndicatorLabel> {
        IndicatorLabel::ALL
            .into_iter()
            .filter(|label| self.active.contains_key(label))
            .collect()
    }

    pub fn events(&self) -> &[MonitoringEvent] {
        &self.events
    }

    pub fn log(&self) -> &[MonitoringRecord] {
        &self.log
    }

    pub fn system_load(&self) -> f64 {
        self.config.load_per_active * self.active.len() as f64
    }

    /// Activate an event on `label`, or on a random idle indicator when
    /// `label` is `None`. Returns the event id, or `None` if the requested
    /// indicator is busy, nothing is idle or the task is disabled.
    pub fn trigger_event(&mut self, label: Option<IndicatorLabel>, now: Millis) -> Option<u64> {
        if !self.settings.enabled {
            return None;
        }
        let label = match label {
            Some(label) if self.active.contains_key(&label) => return None,
            Some(label) => label,
            None => {
                let idle: Vec<IndicatorLabel> = IndicatorLabel::ALL
                    .into_iter()
                    .filter(|label| !self.active.contains_key(label))
                    .collect();
                *idle.choose(&mut self.rng)?
            }
        };

        let id = self.next_event_id;
        self.next_event_id += 1;

        let indicator = &mut self.indicators[label.index()];
        indicator.event_active = true;
        if label.is_gauge() {
            let side = if indicator.level > Indicator::CENTER {
                GaugeSide::High
            } else if indicator.level < Indicator::CENTER {
                GaugeSide::Low
            } else if self.rng.gen_bool(0.5) {
                GaugeSide::High
            } else {
                GaugeSide::Low
            };
            indicator.level = match side {
                GaugeSide::High => indicator.level.max(8),
                GaugeSide::Low => indicator.level.min(2),
            };
            indicator.side = Some(side);
        }

        let deadline = now + self.config.response_window_ms;
        let timer = self.timers.arm(MonitoringTimer::Deadline(id), deadline);
        self.active.insert(label, (id, timer));
        self.events.push(MonitoringEvent {
            id,
            label,
            created_at: now,
            deadline,
            responded: false,
            response_time: None,
            outcome: None,
        });
        log::debug!("monitoring event {} on {} until {} ms", id, label, deadline);

        self.outbox
            .metric(Metric::impulse(TaskKind::Monitoring, 0.0, self.system_load(), now));
        Some(id)
    }

    /// Operator pressed `label`. Returns the scored outcome, or `None` when
    /// the press was ignored (disabled task, debounce or merged false alarm).
    pub fn respond(&mut self, label: IndicatorLabel, now: Millis) -> Option<Outcome> {
        if !self.settings.enabled {
            return None;
        }
        if let Some(&last) = self.last_press.get(&label) {
            if now.saturating_sub(last) < self.config.debounce_ms {
                return None;
            }
        }
        self.last_press.insert(label, now);

        match self.active.remove(&label) {
            Some((id, timer)) => {
                self.timers.cancel(timer);
                self.resolve(id, Outcome::Hit, now);
                Some(Outcome::Hit)
            }
            None => {
                if let Some(&last) = self.last_false_alarm.get(&label) {
                    if now.saturating_sub(last) < self.config.false_alarm_merge_ms {
                        log::debug!("merging repeated false alarm on {}", label);
                        return None;
                    }
                }
                self.last_false_alarm.insert(label, now);
                let impact = self.config.false_alarm_impact;
                self.record(MonitoringRecord {
                    event_id: None,
                    label,
                    outcome: Outcome::FalseAlarm,
                    created_at: None,
                    logged_at: now,
                    response_time: None,
                    health_impact: impact,
                });
                self.outbox.metric(Metric::impulse(
                    TaskKind::Monitoring,
                    impact,
                    self.system_load(),
                    now,
                ));
                Some(Outcome::FalseAlarm)
            }
        }
    }

    /// Score an active event exactly once and return its indicator to normal.
    fn resolve(&mut self, id: u64, outcome: Outcome, now: Millis) {
        let Some(event) = self.events.iter_mut().rev().find(|e| e.id == id) else {
            return;
        };
        if event.is_resolved() {
            return;
        }
        let response_time = (outcome == Outcome::Hit).then(|| now - event.created_at);
        event.responded = outcome == Outcome::Hit;
        event.response_time = response_time;
        event.outcome = Some(outcome);
        let label = event.label;
        let created_at = event.created_at;
        self.active.remove(&label);

        let indicator = &mut self.indicators[label.index()];
        indicator.event_active = false;
        indicator.side = None;
        if label.is_gauge() {
            indicator.level = Indicator::CENTER;
        }

        let impact = match outcome {
            Outcome::Hit => self.config.hit_impact,
            _ => self.config.miss_impact,
        };
        log::info!("monitoring {} on {}: {:?}", id, label, outcome);
        self.record(MonitoringRecord {
            event_id: Some(id),
            label,
            outcome,
            created_at: Some(created_at),
            logged_at: now,
            response_time,
            health_impact: impact,
        });
        self.outbox.metric(Metric::impulse(
            TaskKind::Monitoring,
            impact,
            self.system_load(),
            now,
        ));
    }

    fn record(&mut self, row: MonitoringRecord) {
        self.outbox.log(LogEntry::Monitoring(row.clone()));
        self.log.push(row);
    }

    /// 1 Hz random walk: idle gauges wander inside the normal band, active
    /// ones inside their forced band.
    fn tick_gauges(&mut self) {
        for indicator in self.indicators.iter_mut().filter(|i| i.label.is_gauge()) {
            let (lo, hi, step) = match indicator.side {
                Some(side) if indicator.event_active => {
                    let (lo, hi) = side.band();
                    (lo, hi, 1)
                }
                _ => (Indicator::NORMAL_BAND.0, Indicator::NORMAL_BAND.1, 2),
            };
            let delta = self.rng.gen_range(-step..=step);
            indicator.level = (indicator.level + delta).clamp(lo, hi);
        }
    }

    fn arm_periodic(&mut self, now: Millis) {
        self.timers
            .arm(MonitoringTimer::GaugeTick, now + self.config.gauge_tick_ms);
        self.scheduler
            .schedule(now, self.settings.events_per_minute, &mut self.rng);
    }

    /// Re-arm deadlines of events that were active when the task froze.
    fn rearm_deadlines(&mut self, now: Millis) {
        let labels: Vec<IndicatorLabel> = self.active.keys().copied().collect();
        for label in labels {
            if let Some(&(id, _)) = self.active.get(&label) {
                let deadline = self
                    .events
                    .iter()
                    .find(|e| e.id == id)
                    .map(|e| e.deadline.max(now))
                    .unwrap_or(now);
                let timer = self.timers.arm(MonitoringTimer::Deadline(id), deadline);
                self.active.insert(label, (id, timer));
            }
        }
    }
}

impl TaskSimulator for MonitoringSimulator {
    fn kind(&self) -> TaskKind {
        TaskKind::Monitoring
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
        self.rearm_deadlines(now);
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
                self.outbox.metric(Metric::zero(TaskKind::Monitoring, now));
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
        self.indicators = IndicatorLabel::ALL.map(Indicator::new);
        self.events.clear();
        self.active.clear();
        self.log.clear();
        self.last_press.clear();
        self.last_false_alarm.clear();
        self.outbox.clear();
        self.outbox.metric(Metric::zero(TaskKind::Monitoring, now));
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
                if self.scheduler.poll(now, &mut self.rng)
                    && self.trigger_event(None, now).is_none()
                {
                    log::debug!("monitoring trigger skipped, no idle indicator");
                }
                return true;
            }
        }

        match self.timers.pop_due(now) {
            Some((_, MonitoringTimer::GaugeTick)) => {
                self.tick_gauges();
                self.timers
                    .arm(MonitoringTimer::GaugeTick, now + self.config.gauge_tick_ms);
                true
            }
            Some((_, MonitoringTimer::Deadline(id))) => {
                // A hit may already have resolved this event.
                if self.active.values().any(|&(active, _)| active == id) {
                    self.resolve(id, Outcome::Miss, now);
                }
                true
            }
            None => false,
        }
    }

    fn current_metric(&self, now: Millis) -> Metric {
        if !self.settings.enabled {
            return Metric::zero(TaskKind::Monitoring, now);
        }
        Metric::impulse(TaskKind::Monitoring, 0.0, self.system_load(), now)
    }

    fn outbox(&mut self) -> &mut Outbox {
        &mut self.outbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::task_rng;

    fn simulator() -> MonitoringSimulator {
        let mut config = MonitoringConfig::default();
        config.settings.events_per_minute = 0.5;
        let mut sim = MonitoringSimulator::new(config, task_rng(1, TaskKind::Monitoring));
        sim.start(0);
        sim
    }

    fn run_until(sim: &mut MonitoringSimulator, t: Millis) {
        while let Some(due) = sim.next_due() {
            if due > t {
                break;
            }
            sim.fire_due(due);
        }
    }

    #[test]
    fn test_hit_records_response_time() {
        let mut sim = simulator();
        let id = sim.trigger_event(Some(IndicatorLabel::F3), 0).unwrap();
        assert!(sim.indicator(IndicatorLabel::F3).is_abnormal());

        assert_eq!(sim.respond(IndicatorLabel::F3, 1_200), Some(Outcome::Hit));
        let row = sim.log().last().unwrap();
        assert_eq!(row.event_id, Some(id));
        assert_eq!(row.outcome, Outcome::Hit);
        assert_eq!(row.response_time, Some(1_200));
        assert!(sim.active_labels().is_empty());
    }

    #[test]
    fn test_unanswered_event_misses_at_deadline() {
        let mut sim = simulator();
        sim.trigger_event(Some(IndicatorLabel::F1), 100).unwrap();
        run_until(&mut sim, 5_099);
        assert_eq!(sim.active_labels(), vec![IndicatorLabel::F1]);

        run_until(&mut sim, 5_100);
        let misses: Vec<_> = sim
            .log()
            .iter()
            .filter(|r| r.outcome == Outcome::Miss)
            .collect();
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].logged_at, 5_100);
        assert_eq!(misses[0].health_impact, -5.0);
        assert!(!sim.indicator(IndicatorLabel::F1).event_active);
    }

    #[test]
    fn test_late_deadline_after_hit_is_noop() {
        let mut sim = simulator();
        sim.trigger_event(Some(IndicatorLabel::F2), 0).unwrap();
        sim.respond(IndicatorLabel::F2, 4_999);
        run_until(&mut sim, 10_000);
        let outcomes: Vec<_> = sim.log().iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Hit]);
    }

    #[test]
    fn test_false_alarm_debounce_and_merge() {
        let mut sim = simulator();
        assert_eq!(sim.respond(IndicatorLabel::F4, 1_000), Some(Outcome::FalseAlarm));
        // inside the debounce window
        assert_eq!(sim.respond(IndicatorLabel::F4, 1_100), None);
        // past debounce but inside the merge window
        assert_eq!(sim.respond(IndicatorLabel::F4, 1_400), None);
        assert_eq!(sim.respond(IndicatorLabel::F4, 2_000), Some(Outcome::FalseAlarm));
        // other labels are independent
        assert_eq!(sim.respond(IndicatorLabel::F5, 2_000), Some(Outcome::FalseAlarm));

        let (metrics, _) = sim.outbox().take();
        let impulses: f64 = metrics.iter().map(|m| m.health_impact).sum();
        assert_eq!(impulses, -15.0);
    }

    #[test]
    fn test_false_alarm_merge_window_is_exclusive() {
        let mut sim = simulator();
        assert_eq!(sim.respond(IndicatorLabel::F6, 1_000), Some(Outcome::FalseAlarm));
        assert_eq!(sim.respond(IndicatorLabel::F6, 1_499), None);

        assert_eq!(sim.respond(IndicatorLabel::F1, 1_000), Some(Outcome::FalseAlarm));
        // a full merge window later the press counts again
        assert_eq!(sim.respond(IndicatorLabel::F1, 1_500), Some(Outcome::FalseAlarm));

        let false_alarms = sim
            .log()
            .iter()
            .filter(|r| r.outcome == Outcome::FalseAlarm)
            .count();
        assert_eq!(false_alarms, 3);
    }

    #[test]
    fn test_gauge_forced_to_leaning_side() {
        let mut sim = simulator();
        sim.indicators[IndicatorLabel::F4.index()].level = 6;
        sim.indicators[IndicatorLabel::F5.index()].level = 3;
        sim.trigger_event(Some(IndicatorLabel::F4), 0);
        sim.trigger_event(Some(IndicatorLabel::F5), 0);
        assert_eq!(sim.indicator(IndicatorLabel::F4).level, 8);
        assert_eq!(sim.indicator(IndicatorLabel::F4).side, Some(GaugeSide::High));
        assert_eq!(sim.indicator(IndicatorLabel::F5).level, 2);
        assert_eq!(sim.indicator(IndicatorLabel::F5).side, Some(GaugeSide::Low));
    }

    #[test]
    fn test_gauges_stay_in_band() {
        let mut sim = simulator();
        sim.trigger_event(Some(IndicatorLabel::F6), 0);
        sim.indicators[IndicatorLabel::F6.index()].level = 9;
        sim.indicators[IndicatorLabel::F6.index()].side = Some(GaugeSide::High);
        for _ in 0..50 {
            sim.tick_gauges();
            let f6 = sim.indicator(IndicatorLabel::F6).level;
            assert!((8..=10).contains(&f6));
            for label in [IndicatorLabel::F3, IndicatorLabel::F4, IndicatorLabel::F5] {
                let level = sim.indicator(label).level;
                assert!((3..=7).contains(&level), "{label} at {level}");
            }
        }
    }

    #[test]
    fn test_busy_indicator_not_retriggered() {
        let mut sim = simulator();
        assert!(sim.trigger_event(Some(IndicatorLabel::F1), 0).is_some());
        assert!(sim.trigger_event(Some(IndicatorLabel::F1), 10).is_none());
        for label in IndicatorLabel::ALL {
            sim.trigger_event(Some(label), 20);
        }
        assert_eq!(sim.system_load(), 30.0);
        assert!(sim.trigger_event(None, 30).is_none());
    }

    #[test]
    fn test_disabled_task_ignores_input() {
        let mut sim = simulator();
        let mut settings = sim.settings();
        settings.enabled = false;
        sim.apply_settings(settings, 0);
        assert_eq!(sim.respond(IndicatorLabel::F1, 500), None);
        assert!(sim.trigger_event(None, 500).is_none());
        assert_eq!(sim.next_due(), None);
    }

    #[test]
    fn test_reset_drops_stale_deadlines() {
        let mut sim = simulator();
        sim.trigger_event(Some(IndicatorLabel::F2), 0);
        sim.reset(1_000);
        run_until(&mut sim, 20_000);
        assert!(sim.log().iter().all(|r| r.event_id != Some(1)));
        assert!(sim.events().iter().all(|e| e.id != 1));
    }
}
