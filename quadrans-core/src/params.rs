//! Shared parameter block
//!
//! One block per primary/secondary channel pair, also read by the home and
//! index monitors. The handlers are the only writers at runtime; the host
//! driver reads and writes fields between activations.

use crate::channel::ChannelId;
use crate::time::Split32;

/// Counting direction and speed class.
///
/// Encodes both the sign and the fast/slow magnitude: fast mode counts four
/// positions per detected edge because only one transition per electrical
/// cycle is monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    #[default]
    Increment,
    Decrement,
    IncrementFast,
    DecrementFast,
}

impl Direction {
    /// Position counter change per detected edge.
    pub const fn delta(self) -> i32 {
        match self {
            Direction::Increment => 1,
            Direction::Decrement => -1,
            Direction::IncrementFast => 4,
            Direction::DecrementFast => -4,
        }
    }

    /// Whether this direction decrements the counters.
    pub const fn is_reverse(self) -> bool {
        matches!(self, Direction::Decrement | Direction::DecrementFast)
    }

    /// The fast-magnitude direction with the same sign.
    pub const fn fast(self) -> Self {
        if self.is_reverse() {
            Direction::DecrementFast
        } else {
            Direction::IncrementFast
        }
    }

    /// The slow-magnitude direction with the same sign.
    pub const fn slow(self) -> Self {
        if self.is_reverse() {
            Direction::Decrement
        } else {
            Direction::Increment
        }
    }
}

/// Which phase channel a handler is running on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseRole {
    /// Phase A channel.
    Primary,
    /// Phase B channel.
    Secondary,
}

/// Decoder speed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Periods may exceed the 24-bit counter range; no windowing, the
    /// period-overflow match keeps the accumulator live.
    #[default]
    Slow,
    /// Both phases monitored, windowed detection, one count per edge.
    Normal,
    /// Single phase monitored, four counts per edge.
    Fast,
}

/// Current mode plus the two transient per-edge indicator bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeStatus {
    pub mode: Mode,
    /// The last processed edge was a leading edge.
    pub leading_edge: bool,
    /// The last processed edge switched the decoder fast-to-normal.
    pub fast_to_normal: bool,
}

impl ModeStatus {
    /// Enter a mode, clearing both indicator bits.
    pub fn set(&mut self, mode: Mode) {
        self.mode = mode;
        self.leading_edge = false;
        self.fast_to_normal = false;
    }

    pub fn is(&self, mode: Mode) -> bool {
        self.mode == mode
    }
}

/// Live snapshot of the phase pin levels plus the reference convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinStates {
    phase_a: bool,
    phase_b: bool,
    /// Both pins are high (rather than low) at the reference state where the
    /// index pulse occurs.
    reference_high: bool,
}

impl PinStates {
    pub const fn new(reference_high: bool) -> Self {
        Self {
            phase_a: false,
            phase_b: false,
            reference_high,
        }
    }

    pub const fn phase_a(&self) -> bool {
        self.phase_a
    }

    pub const fn phase_b(&self) -> bool {
        self.phase_b
    }

    pub const fn reference_high(&self) -> bool {
        self.reference_high
    }

    /// Record the level of one phase pin.
    pub fn set_phase(&mut self, role: PhaseRole, high: bool) {
        match role {
            PhaseRole::Primary => self.phase_a = high,
            PhaseRole::Secondary => self.phase_b = high,
        }
    }

    /// Whether the snapshot sits at the reference state that closes a full
    /// electrical cycle (the leading edge).
    pub const fn at_reference(&self) -> bool {
        self.phase_a == self.reference_high && self.phase_b == self.reference_high
    }
}

/// Decoder options set by the host at configuration time.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Options {
    /// Reset `pc` to zero when `|pc| >= pc_max` at a leading edge.
    pub pc_max_reset: bool,
    /// Raise a channel interrupt when `pc` hits a configured trigger value.
    pub pc_interrupt: bool,
    /// Run without windowed detection in normal and fast mode.
    pub windowing_disabled: bool,
}

/// Windowing-violation flags, live and latched copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorFlags {
    windowing: bool,
}

impl ErrorFlags {
    /// An expected edge did not arrive inside its detection window.
    pub const fn windowing(&self) -> bool {
        self.windowing
    }

    pub fn set_windowing(&mut self) {
        self.windowing = true;
    }

    pub const fn is_clear(&self) -> bool {
        !self.windowing
    }

    pub fn clear(&mut self) {
        self.windowing = false;
    }
}

/// The shared parameter block.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParamBlock {
    /// Position counter, stepped by `direction` on every detected edge.
    pub pc: i32,
    /// Revolution counter, maintained by the index monitor.
    pub rc: i32,
    /// Time between the last two leading edges. Published whole, only at a
    /// leading edge.
    pub period: Split32,
    /// Running accumulator carrying sub-period progress between slow-mode
    /// overflow matches.
    pub period_accum: Split32,
    /// Position counter bound; `pc` resets when `|pc| >= pc_max` if enabled.
    pub pc_max: u32,
    /// First position value that raises a channel interrupt.
    pub pc_interrupt1: i32,
    /// Second position value that raises a channel interrupt.
    pub pc_interrupt2: i32,
    /// Period below which slow mode hands over to normal mode.
    pub slow_normal_threshold: u32,
    /// Period above which normal mode falls back to slow mode.
    pub normal_slow_threshold: u32,
    /// Period below which normal mode hands over to fast mode.
    pub normal_fast_threshold: u32,
    /// Period above which fast mode falls back to normal mode.
    pub fast_normal_threshold: u32,
    /// Time of the last leading edge (or overflow-accumulation point).
    pub last_leading_edge: u32,
    /// Time of the last processed edge, real or estimated.
    pub last_edge: u32,
    /// Secondary position counter for an external speed-controller consumer.
    pub pc_sc: i32,
    /// Current counting direction and speed class.
    pub direction: Direction,
    /// Direction latched at the first index transition; `None` until one has
    /// been recorded since initialization.
    pub last_direction: Option<Direction>,
    /// Live phase pin snapshot plus the reference convention.
    pub pins: PinStates,
    /// Current mode and per-edge indicator bits.
    pub mode: ModeStatus,
    /// Host-configured options.
    pub options: Options,
    /// Window-open offset as a raw 9.23 fraction of the expected period.
    pub ratio1: i32,
    /// Window-close offset as a raw 9.23 fraction, stored minus 1.0.
    pub ratio2: i32,
    /// Phase A channel number.
    pub phase_a_chan: ChannelId,
    /// Phase B channel number.
    pub phase_b_chan: ChannelId,
    /// Live windowing-violation flags.
    pub error_flags: ErrorFlags,
    /// Snapshot taken by the latch-and-clear service request.
    pub error_flags_latched: ErrorFlags,
    /// A leading edge has been observed since initialization; gates mode
    /// evaluation until a valid period baseline exists.
    pub found_leading_edge: bool,
}

impl ParamBlock {
    /// A zeroed block for the given phase channels and pin convention.
    pub fn new(phase_a_chan: ChannelId, phase_b_chan: ChannelId, reference_high: bool) -> Self {
        Self {
            pc: 0,
            rc: 0,
            period: Split32::ZERO,
            period_accum: Split32::ZERO,
            pc_max: 0,
            pc_interrupt1: 0,
            pc_interrupt2: 0,
            slow_normal_threshold: 0,
            normal_slow_threshold: 0,
            normal_fast_threshold: 0,
            fast_normal_threshold: 0,
            last_leading_edge: 0,
            last_edge: 0,
            pc_sc: 0,
            direction: Direction::Increment,
            last_direction: None,
            pins: PinStates::new(reference_high),
            mode: ModeStatus::default(),
            options: Options::default(),
            ratio1: 0,
            ratio2: 0,
            phase_a_chan,
            phase_b_chan,
            error_flags: ErrorFlags::default(),
            error_flags_latched: ErrorFlags::default(),
            found_leading_edge: false,
        }
    }
}
