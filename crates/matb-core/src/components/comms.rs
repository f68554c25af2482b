//! Communications components - radios, frequencies, messages and snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Outcome;
use crate::error::BatteryError;
use crate::timers::Millis;

/// Tunable radios, in the order the operator cycles through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Radio {
    Nav1,
    Nav2,
    Com1,
    Com2,
}

impl Radio {
    pub const ALL: [Radio; 4] = [Radio::Nav1, Radio::Nav2, Radio::Com1, Radio::Com2];

    pub fn index(self) -> usize {
        match self {
            Radio::Nav1 => 0,
            Radio::Nav2 => 1,
            Radio::Com1 => 2,
            Radio::Com2 => 3,
        }
    }

    /// Neighbour in cycling order, wrapping at both ends.
    pub fn cycle(self, delta: i32) -> Radio {
        let len = Self::ALL.len() as i32;
        let idx = (self.index() as i32 + delta).rem_euclid(len);
        Self::ALL[idx as usize]
    }
}

impl fmt::Display for Radio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Radio::Nav1 => "NAV1",
            Radio::Nav2 => "NAV2",
            Radio::Com1 => "COM1",
            Radio::Com2 => "COM2",
        };
        f.write_str(name)
    }
}

impl FromStr for Radio {
    type Err = BatteryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NAV1" => Ok(Radio::Nav1),
            "NAV2" => Ok(Radio::Nav2),
            "COM1" => Ok(Radio::Com1),
            "COM2" => Ok(Radio::Com2),
            _ => Err(BatteryError::UnknownRadio(s.to_string())),
        }
    }
}

/// Radio frequency stored as whole kilohertz, displayed as `MHz.kHz`.
///
/// Integer storage keeps comparisons exact after any number of 25 kHz steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Frequency(pub u32);

impl Frequency {
    /// Size of one tuning step.
    pub const STEP_KHZ: u32 = 25;

    pub fn from_khz(khz: u32) -> Self {
        Self(khz)
    }

    /// Move by whole tuning steps, saturating at both ends.
    pub fn stepped(self, steps: i32) -> Self {
        let delta = steps as i64 * Self::STEP_KHZ as i64;
        let khz = (self.0 as i64 + delta).clamp(0, u32::MAX as i64);
        Self(khz as u32)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

impl FromStr for Frequency {
    type Err = BatteryError;

    /// Accepts `126.450`, `126.45` and the file-name style `126-450`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BatteryError::InvalidFrequency(s.to_string());
        let text = s.trim().replace('-', ".");
        let (mhz, khz) = match text.split_once('.') {
            Some((mhz, khz)) => (mhz, khz),
            None => (text.as_str(), ""),
        };
        if mhz.is_empty() || khz.len() > 3 || !khz.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let mhz: u32 = mhz.parse().map_err(|_| invalid())?;
        let mut khz_digits = khz.to_string();
        while khz_digits.len() < 3 {
            khz_digits.push('0');
        }
        let khz: u32 = khz_digits.parse().map_err(|_| invalid())?;
        mhz.checked_mul(1000)
            .and_then(|v| v.checked_add(khz))
            .map(Frequency)
            .ok_or_else(invalid)
    }
}

/// Operator control state: selected radio plus the frequency of every radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioPanel {
    pub selected: Radio,
    pub frequencies: [Frequency; 4],
}

impl RadioPanel {
    pub fn frequency(&self, radio: Radio) -> Frequency {
        self.frequencies[radio.index()]
    }

    pub fn set_frequency(&mut self, radio: Radio, frequency: Frequency) {
        self.frequencies[radio.index()] = frequency;
    }

    /// Selected radio is the target radio and it is tuned to the target.
    pub fn matches(&self, radio: Radio, frequency: Frequency) -> bool {
        self.selected == radio && self.frequency(radio) == frequency
    }
}

impl Default for RadioPanel {
    fn default() -> Self {
        Self {
            selected: Radio::Nav1,
            frequencies: [
                Frequency(112_500),
                Frequency(112_500),
                Frequency(118_325),
                Frequency(120_775),
            ],
        }
    }
}

/// Operator control state captured while a message is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Milliseconds since the message started playing
    pub offset_ms: Millis,
    pub selected_radio: Radio,
    pub frequencies: [Frequency; 4],
}

impl Snapshot {
    pub fn capture(offset_ms: Millis, panel: &RadioPanel) -> Self {
        Self {
            offset_ms,
            selected_radio: panel.selected,
            frequencies: panel.frequencies,
        }
    }

    pub fn frequency(&self, radio: Radio) -> Frequency {
        self.frequencies[radio.index()]
    }

    pub fn matches(&self, radio: Radio, frequency: Frequency) -> bool {
        self.selected_radio == radio && self.frequency(radio) == frequency
    }

    /// Any control differs from `prev`.
    pub fn differs_from(&self, prev: &Snapshot) -> bool {
        self.selected_radio != prev.selected_radio || self.frequencies != prev.frequencies
    }
}

/// One recorded radio call the battery can play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub callsign: String,
    pub radio: Radio,
    pub frequency: Frequency,
    pub playback_ms: Millis,
}

/// Every call the battery may play, split by whether it addresses own ship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCatalog {
    pub own_callsign: String,
    pub templates: Vec<MessageTemplate>,
}

impl MessageCatalog {
    pub const OWN_CALLSIGN: &'static str = "NASA504";
    pub const OTHER_CALLSIGNS: [&'static str; 4] = ["A33395", "CITRUS211", "AC5171", "SK580"];
    pub const DEFAULT_PLAYBACK_MS: Millis = 4_000;

    pub fn is_own(&self, template: &MessageTemplate) -> bool {
        template.callsign == self.own_callsign
    }

    pub fn own_templates(&self) -> impl Iterator<Item = &MessageTemplate> {
        self.templates.iter().filter(|t| self.is_own(t))
    }

    pub fn other_templates(&self) -> impl Iterator<Item = &MessageTemplate> {
        self.templates.iter().filter(|t| !self.is_own(t))
    }

    /// Reject a catalog that cannot serve both call classes.
    pub fn validate(&self) -> Result<(), BatteryError> {
        if self.own_templates().next().is_none() {
            return Err(BatteryError::EmptyCatalog("own-ship"));
        }
        if self.other_templates().next().is_none() {
            return Err(BatteryError::EmptyCatalog("other-ship"));
        }
        Ok(())
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let targets: [(Radio, u32); 14] = [
            (Radio::Nav1, 109_250),
            (Radio::Nav1, 111_700),
            (Radio::Nav1, 114_350),
            (Radio::Nav2, 110_450),
            (Radio::Nav2, 113_150),
            (Radio::Nav2, 116_800),
            (Radio::Com1, 121_550),
            (Radio::Com1, 124_875),
            (Radio::Com1, 126_450),
            (Radio::Com1, 130_225),
            (Radio::Com2, 119_125),
            (Radio::Com2, 123_775),
            (Radio::Com2, 127_650),
            (Radio::Com2, 133_300),
        ];

        let callsigns = std::iter::once(Self::OWN_CALLSIGN).chain(Self::OTHER_CALLSIGNS);
        let templates = callsigns
            .flat_map(|callsign| {
                targets.iter().map(move |&(radio, khz)| MessageTemplate {
                    callsign: callsign.to_string(),
                    radio,
                    frequency: Frequency(khz),
                    playback_ms: Self::DEFAULT_PLAYBACK_MS,
                })
            })
            .collect();

        Self {
            own_callsign: Self::OWN_CALLSIGN.to_string(),
            templates,
        }
    }
}

/// Lifecycle of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Queued,
    Playing,
    /// Playback over, waiting out the response window
    AwaitingResponse,
    Finalized,
}

/// One radio call from enqueue to final scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommsMessage {
    pub id: u64,
    pub callsign: String,
    pub own_callsign: bool,
    pub target_radio: Radio,
    pub target_frequency: Frequency,
    pub playback_ms: Millis,
    pub created_at: Millis,
    pub response_deadline: Millis,
    pub started_at: Option<Millis>,
    pub state: MessageState,
    pub snapshots: Vec<Snapshot>,
    pub outcome: Option<Outcome>,
}

impl CommsMessage {
    pub fn is_finalized(&self) -> bool {
        self.state == MessageState::Finalized
    }

    /// First snapshot with the target radio selected and tuned.
    pub fn first_match(&self) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .find(|s| s.matches(self.target_radio, self.target_frequency))
    }

    /// Whether the operator touched any control during this message.
    pub fn controls_changed(&self) -> bool {
        self.snapshots
            .windows(2)
            .any(|pair| pair[1].differs_from(&pair[0]))
    }
}
