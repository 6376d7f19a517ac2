//! Per-channel hardware image
//!
//! Each channel of the coprocessor owns an input pin, an edge-detect
//! selection, two match registers with their latches, two flags used by
//! event dispatch, and a pending service-request/link state. Handlers
//! reprogram this image; the surrounding dispatcher turns it into events.

use crate::time;

/// Channel number of one coprocessor engine pair.
///
/// Valid numbers are 0-31 (engine A) and 64-95 (engine B), matching the
/// host-facing register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelId(u8);

/// Number of channels across both engines.
pub const CHANNEL_COUNT: usize = 64;

impl ChannelId {
    /// Validate a raw channel number.
    pub const fn new(raw: u8) -> Option<Self> {
        match raw {
            0..=31 | 64..=95 => Some(Self(raw)),
            _ => None,
        }
    }

    /// The raw channel number.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Dense index into a [`ChannelBank`].
    pub const fn index(self) -> usize {
        if self.0 < 32 {
            self.0 as usize
        } else {
            (self.0 - 32) as usize
        }
    }
}

/// Timer counter a channel's action units are clocked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockSource {
    #[default]
    Timer1,
    Timer2,
}

/// Pin transition selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EdgeDetect {
    /// No transitions detected.
    #[default]
    Disabled,
    /// Low-to-high transitions only.
    Rising,
    /// High-to-low transitions only.
    Falling,
    /// Either transition.
    Any,
}

impl EdgeDetect {
    /// Whether a pin change from `from` to `to` matches this selection.
    pub const fn matches(self, from: bool, to: bool) -> bool {
        match self {
            EdgeDetect::Disabled => false,
            EdgeDetect::Rising => !from && to,
            EdgeDetect::Falling => from && !to,
            EdgeDetect::Any => from != to,
        }
    }
}

/// Channel service mode, selecting how matches and transitions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceMode {
    /// One match register in use; transitions detected at any time. Match A
    /// requests service when it fires (the slow-mode period-overflow tick).
    #[default]
    SingleMatch,
    /// Windowed detection: match A opens the window without requesting
    /// service, transitions are only latched while the window is open, and
    /// match B (window close) requests service if the transition never came.
    Windowed,
    /// Transitions detected at any time, no blocking on matches. Used by the
    /// home and index monitors.
    EitherNonBlocking,
}

/// Host service request codes, written to a channel's request register and
/// consumed on the next dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceRequest {
    /// Arm the channel and establish the initial edge polarity.
    Init,
    /// Atomically snapshot and clear the windowing error flags.
    LatchAndClearErrors,
}

impl ServiceRequest {
    /// The raw request-register code.
    pub const fn code(self) -> u8 {
        match self {
            ServiceRequest::Init => 1,
            ServiceRequest::LatchAndClearErrors => 7,
        }
    }
}

/// Channel service priority. Dispatch serves higher priorities first;
/// `Disabled` channels are never served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    #[default]
    Disabled,
    Low,
    Middle,
    High,
}

/// The hardware state of one channel.
///
/// Fields are public: handlers and the dispatcher both manipulate the image
/// directly, the way microcode and hardware share channel registers.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelHw {
    /// Current input pin level.
    pub pin: bool,
    /// Which pin transitions are detected.
    pub detect: EdgeDetect,
    /// How matches and transitions combine into service requests.
    pub service_mode: ServiceMode,
    /// Timer the action units capture from and match against.
    pub clock: ClockSource,
    /// Armed match A time, if any.
    pub match_a: Option<u32>,
    /// Armed match B time, if any.
    pub match_b: Option<u32>,
    /// A detected transition is waiting for service.
    pub transition_latch: bool,
    /// Match A has fired.
    pub match_a_latch: bool,
    /// Match B has fired.
    pub match_b_latch: bool,
    /// Captured time of the last transition or match A fire.
    pub capture: u32,
    /// A self-addressed link is waiting for redelivery.
    pub link_pending: bool,
    /// Pending host service request.
    pub request: Option<ServiceRequest>,
    /// Pending channel interrupt toward the host.
    pub interrupt: bool,
    /// Dispatch flag 0 (decoder: fast mode; index: expected first edge).
    pub flag0: bool,
    /// Dispatch flag 1 (decoder: next edge is falling).
    pub flag1: bool,
    /// Event handling enabled (set by the Init handlers).
    pub enabled: bool,
    /// Service priority assigned by the host.
    pub priority: Priority,
}

impl ChannelHw {
    /// Disarm both match registers, ending any window in progress.
    pub fn disable_match_detection(&mut self) {
        self.match_a = None;
        self.match_b = None;
    }

    /// Negate all pending transition and match events.
    pub fn clear_all_latches(&mut self) {
        self.transition_latch = false;
        self.match_a_latch = false;
        self.match_b_latch = false;
    }

    pub fn clear_transition_latch(&mut self) {
        self.transition_latch = false;
    }

    pub fn clear_match_a_latch(&mut self) {
        self.match_a_latch = false;
    }

    /// Consume a pending link redelivery.
    pub fn clear_link(&mut self) {
        self.link_pending = false;
    }

    /// Post a link to this channel; the dispatcher redelivers it on a later
    /// scheduling opportunity.
    pub fn post_link(&mut self) {
        self.link_pending = true;
    }

    /// Arm match A at an absolute timer value.
    pub fn arm_match_a(&mut self, at: u32) {
        self.match_a = Some(time::wrap(at));
    }

    /// Arm match B at an absolute timer value.
    pub fn arm_match_b(&mut self, at: u32) {
        self.match_b = Some(time::wrap(at));
    }

    /// Raise the channel interrupt toward the host.
    pub fn request_interrupt(&mut self) {
        self.interrupt = true;
    }

    /// Enable event handling on this channel.
    pub fn enable(&mut self) {
        self.enabled = true;
    }
}

/// All channels of an engine pair.
#[derive(Debug, Clone)]
pub struct ChannelBank {
    channels: [ChannelHw; CHANNEL_COUNT],
}

impl Default for ChannelBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBank {
    pub fn new() -> Self {
        Self {
            channels: core::array::from_fn(|_| ChannelHw::default()),
        }
    }
}

impl core::ops::Index<ChannelId> for ChannelBank {
    type Output = ChannelHw;

    fn index(&self, chan: ChannelId) -> &ChannelHw {
        &self.channels[chan.index()]
    }
}

impl core::ops::IndexMut<ChannelId> for ChannelBank {
    fn index_mut(&mut self, chan: ChannelId) -> &mut ChannelHw {
        &mut self.channels[chan.index()]
    }
}

/// Per-invocation execution context passed into every handler.
///
/// Carries the serviced channel and the working edge-time registers, so
/// handlers are functions of (context, channel bank, parameter block) with
/// no ambient state.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventContext {
    /// The channel being serviced.
    pub chan: ChannelId,
    /// Current value of the channel's timer.
    pub now: u32,
    /// Working edge time; seeded with the channel's capture register.
    pub capture_a: u32,
    /// Working window-close time.
    pub capture_b: u32,
}

impl EventContext {
    pub fn new(chan: ChannelId, now: u32, capture: u32) -> Self {
        Self {
            chan,
            now: time::wrap(now),
            capture_a: time::wrap(capture),
            capture_b: 0,
        }
    }
}

/// An event fired that the entry table does not expect.
///
/// This signals a dispatcher/configuration inconsistency rather than a
/// recoverable runtime condition; the dispatcher routes it to its fault
/// trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceError {
    /// Channel whose event had no matching entry.
    pub chan: ChannelId,
}
