//! Health/load aggregator.
//!
//! Folds the four task metric streams into one cumulative health score and
//! one instantaneous load. Impulses are banked the moment they arrive and
//! applied once on the next cycle. Rates are integrated piecewise: every
//! rate change first accrues the old rate over the time it was in force, so
//! nothing depends on the order metrics arrive in or on cycle alignment.

use crate::components::{AggregateHealthState, Metric, MetricKind, TaskKind};
use crate::config::AggregatorConfig;
use crate::timers::Millis;

#[derive(Debug, Clone)]
pub struct HealthAggregator {
    config: AggregatorConfig,
    state: AggregateHealthState,
    /// Health delta accrued since the last cycle
    pending: f64,
    rates: [f64; 4],
    loads: [f64; 4],
    accrued_until: Millis,
    next_cycle: Option<Millis>,
    cycles: u64,
}

impl HealthAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        let state = AggregateHealthState::new(config.initial_health);
        Self {
            config,
            state,
            pending: 0.0,
            rates: [0.0; 4],
            loads: [0.0; 4],
            accrued_until: 0,
            next_cycle: None,
            cycles: 0,
        }
    }

    /// Reset to the configured initial health and start cycling.
    pub fn start(&mut self, now: Millis) {
        self.rates = [0.0; 4];
        self.loads = [0.0; 4];
        self.reset_health(self.config.initial_health, now);
        self.next_cycle = Some(now + self.config.cycle_ms.max(1));
    }

    pub fn stop(&mut self) {
        self.next_cycle = None;
    }

    /// Take in the latest emission of one task.
    pub fn observe(&mut self, metric: &Metric, now: Millis) {
        let i = metric.task.index();
        match metric.kind {
            MetricKind::Impulse => {
                self.pending += metric.health_impact;
            }
            MetricKind::Rate => {
                self.accrue(now);
                self.rates[i] = metric.health_impact;
            }
        }
        self.loads[i] = metric.system_load;
    }

    /// Apply everything accrued so far and recompute load.
    pub fn cycle(&mut self, now: Millis) -> AggregateHealthState {
        self.accrue(now);
        self.state.health = (self.state.health + self.pending).clamp(0.0, 100.0);
        self.pending = 0.0;
        self.state.load = self.loads.iter().sum::<f64>().clamp(0.0, 100.0);
        self.cycles += 1;
        self.state
    }

    /// Set health to `initial`, load to zero and drop anything pending.
    pub fn reset_health(&mut self, initial: f64, now: Millis) {
        self.state = AggregateHealthState::new(initial);
        self.pending = 0.0;
        self.accrued_until = now;
    }

    pub fn current_health(&self) -> f64 {
        self.state.health
    }

    pub fn current_load(&self) -> f64 {
        self.state.load
    }

    pub fn state(&self) -> AggregateHealthState {
        self.state
    }

    /// Current per-second rate of one task.
    pub fn rate(&self, task: TaskKind) -> f64 {
        self.rates[task.index()]
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn next_due(&self) -> Option<Millis> {
        self.next_cycle
    }

    /// Run the cycle if it is due. Returns the new state when it ran.
    pub fn fire_due(&mut self, now: Millis) -> Option<AggregateHealthState> {
        match self.next_cycle {
            Some(due) if due <= now => {
                self.next_cycle = Some(due + self.config.cycle_ms.max(1));
                Some(self.cycle(now))
            }
            _ => None,
        }
    }

    fn accrue(&mut self, now: Millis) {
        if now > self.accrued_until {
            let seconds = (now - self.accrued_until) as f64 / 1000.0;
            self.pending += self.rates.iter().sum::<f64>() * seconds;
            self.accrued_until = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> HealthAggregator {
        let mut aggregator = HealthAggregator::new(AggregatorConfig::default());
        aggregator.start(0);
        aggregator
    }

    #[test]
    fn test_impulse_applied_once() {
        let mut agg = started();
        agg.observe(&Metric::impulse(TaskKind::Monitoring, -5.0, 0.0, 50), 50);
        assert_eq!(agg.cycle(100).health, 95.0);
        assert_eq!(agg.cycle(200).health, 95.0);
    }

    #[test]
    fn test_rate_integrated_over_elapsed_time() {
        let mut agg = started();
        agg.observe(&Metric::rate(TaskKind::Tracking, 0.5, 15.0, 0), 0);
        agg.observe(&Metric::impulse(TaskKind::Monitoring, -10.0, 0.0, 0), 0);
        let state = agg.cycle(16);
        assert!((state.health - (90.0 + 0.008)).abs() < 1e-9);
        assert_eq!(state.load, 15.0);
    }

    #[test]
    fn test_rate_change_accrues_old_rate_first() {
        let mut agg = started();
        agg.observe(&Metric::impulse(TaskKind::Communications, -50.0, 0.0, 0), 0);
        agg.cycle(0);
        agg.observe(&Metric::rate(TaskKind::Resource, 1.0, 0.0, 0), 0);
        agg.observe(&Metric::rate(TaskKind::Resource, -1.0, 0.0, 500), 500);
        // +0.5 over the first half second, -0.5 over the second
        let state = agg.cycle(1_000);
        assert!((state.health - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_health_and_load_clamped() {
        let mut agg = started();
        agg.observe(&Metric::impulse(TaskKind::Communications, 10.0, 80.0, 0), 0);
        agg.observe(&Metric::rate(TaskKind::Tracking, -0.5, 30.0, 0), 0);
        let state = agg.cycle(10);
        assert_eq!(state.health, 100.0);
        assert_eq!(state.load, 100.0);

        agg.observe(&Metric::impulse(TaskKind::Monitoring, -500.0, 0.0, 10), 10);
        assert_eq!(agg.cycle(20).health, 0.0);
    }

    #[test]
    fn test_reset_health_clears_pending() {
        let mut agg = started();
        agg.observe(&Metric::impulse(TaskKind::Monitoring, -5.0, 10.0, 0), 0);
        agg.cycle(100);
        agg.observe(&Metric::impulse(TaskKind::Monitoring, -5.0, 10.0, 150), 150);
        agg.reset_health(100.0, 150);
        assert_eq!(agg.current_health(), 100.0);
        assert_eq!(agg.current_load(), 0.0);
        assert_eq!(agg.cycle(200).health, 100.0);
    }

    #[test]
    fn test_cycle_timer() {
        let mut agg = started();
        assert_eq!(agg.next_due(), Some(100));
        assert!(agg.fire_due(99).is_none());
        assert!(agg.fire_due(100).is_some());
        assert_eq!(agg.next_due(), Some(200));
        agg.stop();
        assert_eq!(agg.next_due(), None);
    }
}
