//! Resource management simulator - fuel flow between six tanks through eight
//! pumps, with random and scheduled pump failures.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

use super::{earliest, EventScheduler, TaskSimulator};
use crate::components::{Metric, Pump, PumpId, PumpState, Tank, TankBand, TankId, TaskKind};
use crate::config::{ResourceConfig, TaskSettings};
use crate::records::{LogEntry, Outbox, ResourceRecord};
use crate::rng::SimRng;
use crate::timers::{Millis, TimerSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceTimer {
    Tick,
    FailureCheck,
    Sample,
    Repair(PumpId),
}

/// Fuel moved by one pump over `dt_seconds`, limited by what the source
/// holds and what the destination can take.
pub fn pump_transfer(pump: &Pump, from: &Tank, to: &Tank, dt_seconds: f64) -> f64 {
    if !pump.is_pumping() {
        return 0.0;
    }
    let wanted = pump.flow / 60.0 * dt_seconds;
    let available = if from.depletable { from.level } else { wanted };
    wanted.min(available).min(to.headroom()).max(0.0)
}

/// Health per second contributed by one target tank when deviation scoring
/// is on.
pub fn deviation_rate(deviation: f64) -> f64 {
    match deviation.abs() {
        d if d <= 100.0 => 0.5,
        d if d <= 250.0 => 0.25,
        d if d <= 500.0 => 0.0,
        _ => -1.0,
    }
}

pub struct ResourceSimulator {
    config: ResourceConfig,
    settings: TaskSettings,
    tanks: [Tank; 6],
    pumps: [Pump; 8],
    /// Failed pumps and their repair times
    failures: BTreeMap<PumpId, Millis>,
    log: Vec<ResourceRecord>,
    last_tick: Millis,
    last_metric: Option<(f64, f64)>,
    timers: TimerSet<ResourceTimer>,
    scheduler: EventScheduler,
    rng: SimRng,
    running: bool,
    outbox: Outbox,
}

impl ResourceSimulator {
    pub fn new(config: ResourceConfig, rng: SimRng) -> Self {
        let settings = config.settings;
        let scheduler = EventScheduler::new(config.scheduler);
        Self {
            config,
            settings,
            tanks: Tank::standard_plant(),
            pumps: Pump::standard_plant(),
            failures: BTreeMap::new(),
            log: Vec::new(),
            last_tick: 0,
            last_metric: None,
            timers: TimerSet::new(),
            scheduler,
            rng,
            running: false,
            outbox: Outbox::default(),
        }
    }

    pub fn tank(&self, id: TankId) -> &Tank {
        &self.tanks[id.index()]
    }

    pub fn tank_mut(&mut self, id: TankId) -> &mut Tank {
        &mut self.tanks[id.index()]
    }

    pub fn tanks(&self) -> &[Tank] {
        &self.tanks
    }

    pub fn pump(&self, id: PumpId) -> &Pump {
        &self.pumps[id.index()]
    }

    pub fn pumps(&self) -> &[Pump] {
        &self.pumps
    }

    pub fn failed_pumps(&self) -> Vec<PumpId> {
        self.failures.keys().copied().collect()
    }

    pub fn log(&self) -> &[ResourceRecord] {
        &self.log
    }

    pub fn system_load(&self) -> f64 {
        let failed = (self.failures.len() as f64 * 2.5).min(10.0);
        let off_band = [TankId::A, TankId::B]
            .into_iter()
            .filter(|&id| self.tank(id).band() != TankBand::Normal)
            .count();
        failed + 5.0 * off_band as f64
    }

    /// Health per second fed to the aggregator. Zero unless deviation scoring
    /// is switched on.
    pub fn health_rate(&self) -> f64 {
        if !self.config.deviation_scoring {
            return 0.0;
        }
        [TankId::A, TankId::B]
            .into_iter()
            .map(|id| deviation_rate(self.tank(id).deviation()))
            .sum()
    }

    /// Flip a pump between on and off. Failed pumps and disabled tasks
    /// reject the toggle.
    pub fn toggle_pump(&mut self, id: PumpId, now: Millis) -> bool {
        if !self.settings.enabled {
            return false;
        }
        let pump = &mut self.pumps[id.index()];
        pump.state = match pump.state {
            PumpState::Off => PumpState::On,
            PumpState::On => PumpState::Off,
            PumpState::Failure => {
                log::debug!("pump {} is failed, toggle rejected", id);
                return false;
            }
        };
        self.publish(now, false);
        true
    }

    /// Advance the fluid model by `dt_seconds`.
    pub fn advance(&mut self, dt_seconds: f64) {
        let multiplier = self.config.loss_multiplier(self.settings.difficulty);
        for tank in self
            .tanks
            .iter_mut()
            .filter(|t| t.depletable && t.loss_per_minute > 0.0)
        {
            let loss = tank.loss_per_minute * multiplier / 60.0 * dt_seconds;
            tank.set_level(tank.level - loss);
        }

        for pump in &self.pumps {
            let (from, to) = (pump.from.index(), pump.to.index());
            let amount = pump_transfer(pump, &self.tanks[from], &self.tanks[to], dt_seconds);
            if amount <= 0.0 {
                continue;
            }
            if self.tanks[from].depletable {
                let level = self.tanks[from].level - amount;
                self.tanks[from].set_level(level);
            }
            let level = self.tanks[to].level + amount;
            self.tanks[to].set_level(level);
        }
    }

    /// Put a healthy pump into failure and schedule its repair.
    pub fn fail_pump(&mut self, id: PumpId, forced: bool, now: Millis) -> bool {
        if self.failures.contains_key(&id) {
            return false;
        }
        let (lo, hi) = (self.config.repair_min_ms, self.config.repair_max_ms);
        let repair_at = now + self.rng.gen_range(lo..=hi.max(lo));
        self.pumps[id.index()].state = PumpState::Failure;
        self.failures.insert(id, repair_at);
        self.timers.arm(ResourceTimer::Repair(id), repair_at);
        log::info!("pump {} failed, repair at {} ms", id, repair_at);
        self.record(ResourceRecord::PumpFailure {
            at: now,
            pump: id,
            forced,
            repair_at,
        });
        self.publish(now, false);
        true
    }

    fn repair_pump(&mut self, id: PumpId, now: Millis) {
        // Already repaired by a reset.
        if self.failures.remove(&id).is_none() {
            return;
        }
        self.pumps[id.index()].state = PumpState::Off;
        log::info!("pump {} repaired", id);
        self.record(ResourceRecord::PumpRepaired { at: now, pump: id });
        self.publish(now, false);
    }

    fn healthy_pumps(&self) -> Vec<PumpId> {
        PumpId::all()
            .filter(|id| !self.failures.contains_key(id))
            .collect()
    }

    fn random_failures(&mut self, now: Millis) {
        for id in self.healthy_pumps() {
            if self.rng.gen_bool(self.config.random_failure_chance.clamp(0.0, 1.0)) {
                self.fail_pump(id, false, now);
            }
        }
    }

    fn forced_failure(&mut self, now: Millis) {
        let healthy = self.healthy_pumps();
        match healthy.choose(&mut self.rng) {
            Some(&id) => {
                self.fail_pump(id, true, now);
            }
            None => log::debug!("no healthy pump to fail"),
        }
    }

    fn sample(&mut self, now: Millis) {
        let (a, b) = (self.tank(TankId::A), self.tank(TankId::B));
        let (diff_a, diff_b) = (a.deviation(), b.deviation());
        let row = ResourceRecord::Sample {
            at: now,
            tank_a: a.level,
            tank_b: b.level,
            diff_a,
            diff_b,
            active_pumps: self.pumps.iter().filter(|p| p.is_pumping()).count(),
            failed_pumps: self.failures.len(),
            corr_a: diff_a.abs() <= self.config.tolerance,
            corr_b: diff_b.abs() <= self.config.tolerance,
        };
        self.record(row);
    }

    fn record(&mut self, row: ResourceRecord) {
        self.outbox.log(LogEntry::Resource(row.clone()));
        self.log.push(row);
    }

    /// Emit the rate metric when it changed, or always when `force` is set.
    fn publish(&mut self, now: Millis, force: bool) {
        let current = (self.health_rate(), self.system_load());
        if force || self.last_metric != Some(current) {
            self.last_metric = Some(current);
            self.outbox
                .metric(Metric::rate(TaskKind::Resource, current.0, current.1, now));
        }
    }

    fn arm_periodic(&mut self, now: Millis) {
        self.last_tick = now;
        self.timers.arm(ResourceTimer::Tick, now + self.config.tick_ms);
        self.timers
            .arm(ResourceTimer::FailureCheck, now + self.config.failure_check_ms);
        self.timers.arm(ResourceTimer::Sample, now + self.config.sample_ms);
        for (&id, &repair_at) in &self.failures {
            self.timers.arm(ResourceTimer::Repair(id), repair_at.max(now));
        }
        self.scheduler
            .schedule(now, self.settings.events_per_minute, &mut self.rng);
        self.publish(now, true);
    }
}

impl TaskSimulator for ResourceSimulator {
    fn kind(&self) -> TaskKind {
        TaskKind::Resource
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
                self.outbox.metric(Metric::zero(TaskKind::Resource, now));
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
        self.tanks = Tank::standard_plant();
        self.pumps = Pump::standard_plant();
        self.failures.clear();
        self.log.clear();
        self.last_metric = None;
        self.outbox.clear();
        self.outbox.metric(Metric::zero(TaskKind::Resource, now));
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
                if self.scheduler.poll(now, &mut self.rng) {
                    self.forced_failure(now);
                }
                return true;
            }
        }

        match self.timers.pop_due(now) {
            Some((_, ResourceTimer::Tick)) => {
                let dt = now.saturating_sub(self.last_tick) as f64 / 1000.0;
                self.last_tick = now;
                self.advance(dt);
                self.publish(now, false);
                self.timers.arm(ResourceTimer::Tick, now + self.config.tick_ms);
            }
            Some((_, ResourceTimer::FailureCheck)) => {
                self.random_failures(now);
                self.timers
                    .arm(ResourceTimer::FailureCheck, now + self.config.failure_check_ms);
            }
            Some((_, ResourceTimer::Sample)) => {
                self.sample(now);
                self.timers.arm(ResourceTimer::Sample, now + self.config.sample_ms);
            }
            Some((_, ResourceTimer::Repair(id))) => self.repair_pump(id, now),
            None => return false,
        }
        true
    }

    fn current_metric(&self, now: Millis) -> Metric {
        if !self.settings.enabled {
            return Metric::zero(TaskKind::Resource, now);
        }
        Metric::rate(TaskKind::Resource, self.health_rate(), self.system_load(), now)
    }

    fn outbox(&mut self) -> &mut Outbox {
        &mut self.outbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::task_rng;

    fn simulator(config: ResourceConfig) -> ResourceSimulator {
        ResourceSimulator::new(config, task_rng(5, TaskKind::Resource))
    }

    fn pump(n: u8) -> PumpId {
        PumpId::new(n).unwrap()
    }

    #[test]
    fn test_pump_three_transfer_one_second() {
        let mut sim = simulator(ResourceConfig::default());
        sim.tank_mut(TankId::B).loss_per_minute = 0.0;
        assert!(sim.toggle_pump(pump(3), 0));
        sim.advance(1.0);

        let moved = 800.0 / 60.0;
        assert!((sim.tank(TankId::D).level - (1000.0 - moved)).abs() < 1e-9);
        assert!((sim.tank(TankId::B).level - (2500.0 + moved)).abs() < 1e-9);
    }

    #[test]
    fn test_failed_pump_moves_nothing() {
        let mut sim = simulator(ResourceConfig::default());
        sim.tank_mut(TankId::B).loss_per_minute = 0.0;
        sim.toggle_pump(pump(3), 0);
        assert!(sim.fail_pump(pump(3), false, 0));
        assert!(!sim.toggle_pump(pump(3), 10));
        for _ in 0..50 {
            sim.advance(0.1);
        }
        assert_eq!(sim.tank(TankId::D).level, 1000.0);
        assert_eq!(sim.tank(TankId::B).level, 2500.0);
    }

    #[test]
    fn test_levels_stay_within_capacity() {
        let mut sim = simulator(ResourceConfig::default());
        for n in [1, 2, 5, 6, 8] {
            sim.toggle_pump(pump(n), 0);
        }
        for _ in 0..6_000 {
            sim.advance(0.1);
            for tank in sim.tanks() {
                assert!(tank.level >= 0.0 && tank.level <= tank.max, "{:?}", tank);
            }
        }
        // A is fed far faster than it drains
        assert_eq!(sim.tank(TankId::A).level, 5000.0);
        // non-depletable supply never drops
        assert_eq!(sim.tank(TankId::E).level, 3000.0);
    }

    #[test]
    fn test_loss_scales_with_difficulty() {
        let mut config = ResourceConfig::default();
        config.settings.difficulty = 10.0;
        let mut sim = simulator(config);
        sim.advance(60.0);
        // 500/min at 0.75
        assert!((sim.tank(TankId::A).level - 2125.0).abs() < 1e-9);
        assert_eq!(sim.tank(TankId::C).level, 1000.0);
    }

    #[test]
    fn test_repair_restores_off_once() {
        let mut config = ResourceConfig::default();
        config.random_failure_chance = 0.0;
        config.settings.events_per_minute = 0.01;
        let mut sim = simulator(config);
        sim.start(0);
        sim.fail_pump(pump(7), true, 0);
        assert!(!sim.fail_pump(pump(7), true, 10));

        while let Some(due) = sim.next_due() {
            if due > 16_000 {
                break;
            }
            sim.fire_due(due);
        }
        assert_eq!(sim.pump(pump(7)).state, PumpState::Off);
        let repairs = sim
            .log()
            .iter()
            .filter(|r| matches!(r, ResourceRecord::PumpRepaired { .. }))
            .count();
        assert_eq!(repairs, 1);
    }

    #[test]
    fn test_reset_drops_pending_repair() {
        let mut config = ResourceConfig::default();
        config.random_failure_chance = 0.0;
        config.settings.events_per_minute = 0.01;
        let repair_max = config.repair_max_ms;
        let mut sim = simulator(config);
        sim.start(0);
        sim.toggle_pump(pump(2), 0);
        assert!(sim.fail_pump(pump(2), true, 0));

        sim.reset(1_000);
        while let Some(due) = sim.next_due() {
            if due > repair_max + 1_000 {
                break;
            }
            sim.fire_due(due);
        }
        // a repair for a pump the reset already cleared does nothing
        sim.repair_pump(pump(2), repair_max + 1_000);

        assert!(sim
            .log()
            .iter()
            .all(|r| !matches!(r, ResourceRecord::PumpRepaired { .. })));
        assert!(sim.failed_pumps().is_empty());
        assert!(sim.pumps().iter().all(|p| p.state == PumpState::Off));
    }

    #[test]
    fn test_system_load() {
        let mut sim = simulator(ResourceConfig::default());
        assert_eq!(sim.system_load(), 0.0);
        sim.tank_mut(TankId::A).set_level(2000.0);
        sim.fail_pump(pump(1), false, 0);
        assert_eq!(sim.system_load(), 7.5);
        for n in 2..=6 {
            sim.fail_pump(pump(n), false, 0);
        }
        assert_eq!(sim.system_load(), 15.0);
    }

    #[test]
    fn test_deviation_scoring() {
        assert_eq!(deviation_rate(50.0), 0.5);
        assert_eq!(deviation_rate(-200.0), 0.25);
        assert_eq!(deviation_rate(400.0), 0.0);
        assert_eq!(deviation_rate(900.0), -1.0);

        let mut config = ResourceConfig::default();
        assert_eq!(simulator(config.clone()).health_rate(), 0.0);
        config.deviation_scoring = true;
        assert_eq!(simulator(config).health_rate(), 1.0);
    }

    #[test]
    fn test_samples_tag_correctness() {
        let mut config = ResourceConfig::default();
        config.random_failure_chance = 0.0;
        let mut sim = simulator(config);
        sim.start(0);
        sim.tank_mut(TankId::B).set_level(2900.0);
        while let Some(due) = sim.next_due() {
            if due > 1_000 {
                break;
            }
            sim.fire_due(due);
        }
        let sample = sim
            .log()
            .iter()
            .find(|r| matches!(r, ResourceRecord::Sample { .. }))
            .cloned();
        match sample {
            Some(ResourceRecord::Sample { corr_a, corr_b, .. }) => {
                assert!(corr_a);
                assert!(!corr_b);
            }
            other => panic!("expected a sample, got {:?}", other),
        }
    }
}
