//! Jittered event scheduler - one per task.
//!
//! Pure timing: the scheduler only knows when the next event is due. The
//! owning simulator asks `poll(now)` and runs its own trigger logic when it
//! returns true.

use rand::Rng;

use crate::config::SchedulerConfig;
use crate::timers::Millis;

#[derive(Debug, Clone)]
pub struct EventScheduler {
    config: SchedulerConfig,
    events_per_minute: f64,
    next_due: Option<Millis>,
    active: bool,
    paused: bool,
    fired: u64,
}

impl EventScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            events_per_minute: 0.0,
            next_due: None,
            active: false,
            paused: false,
            fired: 0,
        }
    }

    /// Delay until the next event for the current rate, or `None` if the
    /// rate cannot be scheduled.
    pub fn draw_delay<R: Rng>(&self, rng: &mut R) -> Option<Millis> {
        let epm = self.events_per_minute;
        if !(epm > 0.0) || !epm.is_finite() {
            return None;
        }
        let base = 60_000.0 / epm;
        let (lo, hi) = (self.config.jitter_min, self.config.jitter_max);
        let jitter = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        let delay = (base * jitter).round().max(self.config.min_delay_ms as f64);
        Some((delay as Millis).max(1))
    }

    /// Start (or restart) firing at `events_per_minute`. Declines and stays
    /// stopped for a non-positive rate.
    pub fn schedule<R: Rng>(
        &mut self,
        now: Millis,
        events_per_minute: f64,
        rng: &mut R,
    ) -> Option<Millis> {
        self.events_per_minute = events_per_minute;
        match self.draw_delay(rng) {
            Some(delay) => {
                self.active = true;
                self.paused = false;
                self.next_due = Some(now + delay);
                log::debug!(
                    "scheduler armed at {} ms ({} epm)",
                    now + delay,
                    events_per_minute
                );
                self.next_due
            }
            None => {
                log::warn!(
                    "declining to schedule at {} events per minute",
                    events_per_minute
                );
                self.stop();
                None
            }
        }
    }

    /// Change the rate. A running scheduler re-arms from `now`.
    pub fn set_rate<R: Rng>(&mut self, now: Millis, events_per_minute: f64, rng: &mut R) {
        if self.active && !self.paused {
            self.schedule(now, events_per_minute, rng);
        } else {
            self.events_per_minute = events_per_minute;
        }
    }

    /// Returns true exactly once per due event and re-arms for the next one.
    pub fn poll<R: Rng>(&mut self, now: Millis, rng: &mut R) -> bool {
        if !self.active || self.paused {
            return false;
        }
        match self.next_due {
            Some(due) if due <= now => {
                self.fired += 1;
                self.next_due = self.draw_delay(rng).map(|delay| now + delay);
                true
            }
            _ => false,
        }
    }

    /// After stop, `poll` never returns true until `schedule` is called again.
    pub fn stop(&mut self) {
        self.active = false;
        self.paused = false;
        self.next_due = None;
    }

    pub fn pause(&mut self) {
        if self.active {
            self.paused = true;
            self.next_due = None;
        }
    }

    pub fn resume<R: Rng>(&mut self, now: Millis, rng: &mut R) {
        if self.active && self.paused {
            self.paused = false;
            self.next_due = self.draw_delay(rng).map(|delay| now + delay);
        }
    }

    pub fn next_due(&self) -> Option<Millis> {
        if self.active && !self.paused {
            self.next_due
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn events_per_minute(&self) -> f64 {
        self.events_per_minute
    }
}
