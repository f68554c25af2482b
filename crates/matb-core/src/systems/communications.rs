//! Communications simulator - radio call queue, snapshot capture and
//! signal-detection scoring.
//!
//! One message plays at a time. Operator control changes append snapshots to
//! the active message; an own-ship message finalizes as a hit the moment the
//! panel matches its target. Otherwise the message finalizes when both its
//! playback and its response window are over, and the outcome is decided
//! from its own snapshots only.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;

use super::{earliest, EventScheduler, TaskSimulator};
use crate::components::{
    CommsMessage, Frequency, MessageState, MessageTemplate, Metric, Outcome, Radio, RadioPanel,
    Snapshot, TaskKind,
};
use crate::config::{CommsConfig, TaskSettings};
use crate::records::{CommsRecord, LogEntry, Outbox};
use crate::rng::SimRng;
use crate::timers::{Millis, TimerSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsTimer {
    PlaybackEnd(u64),
    Finalize(u64),
    /// Safety net for a message that outlived its deadline
    Stale(u64),
    /// End of the on-screen window of the last impulse
    ClearImpulse,
}

pub struct CommsSimulator {
    config: CommsConfig,
    settings: TaskSettings,
    panel: RadioPanel,
    queue: VecDeque<CommsMessage>,
    active: Option<CommsMessage>,
    history: Vec<CommsMessage>,
    log: Vec<CommsRecord>,
    /// Impulse still shown on the metric stream
    displayed_impact: f64,
    timers: TimerSet<CommsTimer>,
    scheduler: EventScheduler,
    rng: SimRng,
    running: bool,
    next_message_id: u64,
    outbox: Outbox,
}

impl CommsSimulator {
    pub fn new(config: CommsConfig, rng: SimRng) -> Self {
        let settings = config.settings;
        let scheduler = EventScheduler::new(config.scheduler);
        Self {
            config,
            settings,
            panel: RadioPanel::default(),
            queue: VecDeque::new(),
            active: None,
            history: Vec::new(),
            log: Vec::new(),
            displayed_impact: 0.0,
            timers: TimerSet::new(),
            scheduler,
            rng,
            running: false,
            next_message_id: 1,
            outbox: Outbox::default(),
        }
    }

    pub fn panel(&self) -> &RadioPanel {
        &self.panel
    }

    pub fn active_message(&self) -> Option<&CommsMessage> {
        self.active.as_ref()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Finalized and abandoned messages, oldest first.
    pub fn history(&self) -> &[CommsMessage] {
        &self.history
    }

    pub fn log(&self) -> &[CommsRecord] {
        &self.log
    }

    pub fn system_load(&self) -> f64 {
        match &self.active {
            Some(m) if m.own_callsign => self.config.own_load,
            Some(_) => self.config.other_load,
            None => 0.0,
        }
    }

    /// Scheduler trigger: draw a call and queue it.
    pub fn trigger_message(&mut self, now: Millis) -> Option<u64> {
        let own = self
            .rng
            .gen_bool(self.config.own_call_probability(self.settings.difficulty));
        let template = self.pick_template(own)?;
        self.enqueue(template, now)
    }

    /// Prefer calls whose target differs from what the radio is already on.
    fn pick_template(&mut self, own: bool) -> Option<MessageTemplate> {
        let catalog = &self.config.catalog;
        let class: Vec<&MessageTemplate> = catalog
            .templates
            .iter()
            .filter(|t| catalog.is_own(t) == own)
            .collect();
        let fresh: Vec<&MessageTemplate> = class
            .iter()
            .copied()
            .filter(|t| self.panel.frequency(t.radio) != t.frequency)
            .collect();
        let pool = if fresh.is_empty() { &class } else { &fresh };
        pool.choose(&mut self.rng).map(|t| (*t).clone())
    }

    /// Queue a message. The response deadline is fixed now, from the
    /// current difficulty.
    pub fn enqueue(&mut self, template: MessageTemplate, now: Millis) -> Option<u64> {
        if !self.settings.enabled {
            return None;
        }
        let id = self.next_message_id;
        self.next_message_id += 1;
        let window = self.config.response_window_ms(self.settings.difficulty);
        let own_callsign = template.callsign == self.config.catalog.own_callsign;
        self.queue.push_back(CommsMessage {
            id,
            callsign: template.callsign,
            own_callsign,
            target_radio: template.radio,
            target_frequency: template.frequency,
            playback_ms: template.playback_ms,
            created_at: now,
            response_deadline: now + window,
            started_at: None,
            state: MessageState::Queued,
            snapshots: Vec::new(),
            outcome: None,
        });
        log::debug!("comms message {} queued, deadline {} ms", id, now + window);
        self.start_next(now);
        Some(id)
    }

    fn start_next(&mut self, now: Millis) {
        if self.active.is_some() {
            return;
        }
        let Some(mut message) = self.queue.pop_front() else {
            return;
        };
        message.state = MessageState::Playing;
        message.started_at = Some(now);
        message.snapshots.push(Snapshot::capture(0, &self.panel));
        self.timers
            .arm(CommsTimer::PlaybackEnd(message.id), now + message.playback_ms);
        let stale_at = message.response_deadline.max(now) + self.config.stale_after_ms;
        self.timers.arm(CommsTimer::Stale(message.id), stale_at);
        log::info!(
            "comms playing {} for {} on {} {}",
            message.id,
            message.callsign,
            message.target_radio,
            message.target_frequency
        );
        self.active = Some(message);
        self.outbox.metric(Metric::impulse(
            TaskKind::Communications,
            0.0,
            self.system_load(),
            now,
        ));
    }

    pub fn select_radio(&mut self, radio: Radio, now: Millis) {
        if !self.settings.enabled {
            return;
        }
        self.panel.selected = radio;
        self.on_control_change(now);
    }

    pub fn set_frequency(&mut self, radio: Radio, frequency: Frequency, now: Millis) {
        if !self.settings.enabled {
            return;
        }
        self.panel.set_frequency(radio, frequency);
        self.on_control_change(now);
    }

    /// Move the selection through NAV1, NAV2, COM1, COM2, wrapping.
    pub fn cycle_radio(&mut self, delta: i32, now: Millis) {
        let next = self.panel.selected.cycle(delta);
        self.select_radio(next, now);
    }

    /// Tune `radio` by whole 25 kHz steps.
    pub fn step_frequency(&mut self, radio: Radio, steps: i32, now: Millis) {
        let next = self.panel.frequency(radio).stepped(steps);
        self.set_frequency(radio, next, now);
    }

    fn on_control_change(&mut self, now: Millis) {
        let panel = self.panel;
        let Some(message) = self.active.as_mut() else {
            return;
        };
        let offset = now.saturating_sub(message.started_at.unwrap_or(now));
        message.snapshots.push(Snapshot::capture(offset, &panel));
        if message.own_callsign && panel.matches(message.target_radio, message.target_frequency) {
            let id = message.id;
            self.finalize(id, now);
        }
    }

    /// Score and retire the active message. Stale ids are ignored.
    fn finalize(&mut self, id: u64, now: Millis) {
        let panel = self.panel;
        let live = self
            .active
            .as_ref()
            .is_some_and(|m| m.id == id && !m.is_finalized());
        if !live {
            return;
        }
        let Some(mut message) = self.active.take() else {
            return;
        };
        let started_at = message.started_at.unwrap_or(now);
        message
            .snapshots
            .push(Snapshot::capture(now.saturating_sub(started_at), &panel));

        let first_match = message.first_match().map(|s| s.offset_ms);
        let outcome = if message.own_callsign {
            if first_match.is_some() {
                Outcome::Hit
            } else if now >= message.response_deadline {
                Outcome::Miss
            } else {
                Outcome::Early
            }
        } else if message.controls_changed() {
            Outcome::FalseAlarm
        } else {
            Outcome::CorrectRejection
        };
        let impact = match outcome {
            Outcome::Hit => self.config.hit_impact,
            Outcome::Miss => self.config.miss_impact,
            Outcome::FalseAlarm => self.config.false_alarm_impact,
            Outcome::CorrectRejection => self.config.correct_rejection_impact,
            _ => 0.0,
        };
        log::info!("comms message {} finalized: {:?}", id, outcome);
        self.retire(message, outcome, impact, first_match, now);
        self.displayed_impact = impact;
        self.timers.cancel_kind(CommsTimer::ClearImpulse);
        self.timers
            .arm(CommsTimer::ClearImpulse, now + self.config.impulse_display_ms);
        self.outbox.metric(Metric::impulse(
            TaskKind::Communications,
            impact,
            self.system_load(),
            now,
        ));
        self.start_next(now);
    }

    /// Drop the active message without scoring it.
    pub fn clear_active_message(&mut self, now: Millis) -> Option<u64> {
        let message = self.active.take()?;
        let id = message.id;
        log::warn!("comms message {} abandoned", id);
        self.retire(message, Outcome::Abandoned, 0.0, None, now);
        self.outbox.metric(Metric::impulse(
            TaskKind::Communications,
            0.0,
            self.system_load(),
            now,
        ));
        self.start_next(now);
        Some(id)
    }

    fn retire(
        &mut self,
        mut message: CommsMessage,
        outcome: Outcome,
        impact: f64,
        response_time: Option<Millis>,
        now: Millis,
    ) {
        let id = message.id;
        for timer in [
            CommsTimer::PlaybackEnd(id),
            CommsTimer::Finalize(id),
            CommsTimer::Stale(id),
        ] {
            self.timers.cancel_kind(timer);
        }
        message.state = MessageState::Finalized;
        message.outcome = Some(outcome);

        let selected_radio = self.panel.selected;
        let response_frequency = self.panel.frequency(message.target_radio);
        let row = CommsRecord {
            message_id: id,
            callsign: message.callsign.clone(),
            own_callsign: message.own_callsign,
            target_radio: message.target_radio,
            target_frequency: message.target_frequency,
            selected_radio,
            response_frequency,
            radio_ok: selected_radio == message.target_radio,
            freq_ok: response_frequency == message.target_frequency,
            response_time,
            outcome,
            health_impact: impact,
            created_at: message.created_at,
            finalized_at: now,
        };
        self.outbox.log(LogEntry::Communications(row.clone()));
        self.log.push(row);
        self.history.push(message);
    }

    fn on_playback_end(&mut self, id: u64, now: Millis) {
        let Some(message) = self.active.as_mut().filter(|m| m.id == id) else {
            return;
        };
        if message.state != MessageState::Playing {
            return;
        }
        message.state = MessageState::AwaitingResponse;
        let deadline = message.response_deadline;
        if deadline <= now {
            self.finalize(id, now);
        } else {
            self.timers.arm(CommsTimer::Finalize(id), deadline);
        }
    }

    fn arm_periodic(&mut self, now: Millis) {
        self.scheduler
            .schedule(now, self.settings.events_per_minute, &mut self.rng);
    }

    /// Re-arm the active message's pending timers after a freeze.
    fn rearm_active(&mut self, now: Millis) {
        let Some(message) = &self.active else {
            return;
        };
        let id = message.id;
        let stale_at = message.response_deadline.max(now) + self.config.stale_after_ms;
        match message.state {
            MessageState::Playing => {
                let end = message.started_at.unwrap_or(now) + message.playback_ms;
                self.timers.arm(CommsTimer::PlaybackEnd(id), end.max(now));
            }
            MessageState::AwaitingResponse => {
                let deadline = message.response_deadline.max(now);
                self.timers.arm(CommsTimer::Finalize(id), deadline);
            }
            _ => {}
        }
        self.timers.arm(CommsTimer::Stale(id), stale_at);
    }
}

impl TaskSimulator for CommsSimulator {
    fn kind(&self) -> TaskKind {
        TaskKind::Communications
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
        self.rearm_active(now);
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
                self.displayed_impact = 0.0;
                self.outbox.metric(Metric::zero(TaskKind::Communications, now));
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
        self.panel = RadioPanel::default();
        self.queue.clear();
        self.active = None;
        self.history.clear();
        self.log.clear();
        self.displayed_impact = 0.0;
        self.outbox.clear();
        self.outbox.metric(Metric::zero(TaskKind::Communications, now));
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
                    self.trigger_message(now);
                }
                return true;
            }
        }

        match self.timers.pop_due(now) {
            Some((_, CommsTimer::PlaybackEnd(id))) => self.on_playback_end(id, now),
            Some((_, CommsTimer::Finalize(id))) => self.finalize(id, now),
            Some((_, CommsTimer::Stale(id))) => {
                if self.active.as_ref().is_some_and(|m| m.id == id) {
                    self.clear_active_message(now);
                }
            }
            Some((_, CommsTimer::ClearImpulse)) => {
                self.displayed_impact = 0.0;
                self.outbox.metric(Metric::impulse(
                    TaskKind::Communications,
                    0.0,
                    self.system_load(),
                    now,
                ));
            }
            None => return false,
        }
        true
    }

    /// The last impulse stays visible for the display window.
    fn current_metric(&self, now: Millis) -> Metric {
        if !self.settings.enabled {
            return Metric::zero(TaskKind::Communications, now);
        }
        Metric::impulse(
            TaskKind::Communications,
            self.displayed_impact,
            self.system_load(),
            now,
        )
    }

    fn outbox(&mut self) -> &mut Outbox {
        &mut self.outbox
    }
}
