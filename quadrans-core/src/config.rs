//! Host configuration
//!
//! The host supplies speed thresholds in rpm together with the counts per
//! revolution and timer frequency; validation converts them into the raw
//! 24-bit tick thresholds the decoder compares periods against, and packs
//! everything into a fresh parameter block.

use fixed::types::I9F23;

use crate::channel::{ChannelId, ClockSource};
use crate::decoder::QuadDecoder;
use crate::params::{Options, ParamBlock};
use crate::time::{FRACTION_ONE, TICK_MASK};

/// Which phase-pin state marks the reference point of an electrical cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PinConvention {
    /// Both phase pins are low when the index pulse occurs.
    #[default]
    BothLowAtReference,
    /// Both phase pins are high when the index pulse occurs.
    BothHighAtReference,
}

/// Home signal transition to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HomeTransition {
    #[default]
    LowHigh,
    HighLow,
    Any,
}

/// Index pulse polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexPulse {
    /// The pulse is a high interval; its first transition is rising.
    #[default]
    Positive,
    /// The pulse is a low interval; its first transition is falling.
    Negative,
}

/// Whether the index monitor resets the position counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexPcReset {
    #[default]
    NoReset,
    Reset,
}

/// Speed thresholds for the three-mode hysteresis.
///
/// Values are in rpm when `counts_per_rev` is non-zero, otherwise raw timer
/// ticks per electrical cycle. Distinct rising/falling thresholds prevent
/// chatter at the mode boundaries. All-zero thresholds keep the decoder in
/// slow mode permanently.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeedThresholds {
    pub slow_normal: u32,
    pub normal_slow: u32,
    pub normal_fast: u32,
    pub fast_normal: u32,
}

/// Validated channel assignment of one decoder instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QdChannels {
    pub primary: ChannelId,
    pub secondary: ChannelId,
    pub home: Option<ChannelId>,
    pub index: Option<ChannelId>,
}

/// Invalid host-supplied configuration, rejected at setup time with the
/// channel state unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A channel number outside the 0-31 / 64-95 range.
    InvalidChannel(u8),
}

/// Full configuration of one quadrature decoder instance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QdConfig {
    /// Phase A channel number.
    pub primary: u8,
    /// Phase B channel number.
    pub secondary: u8,
    /// Home monitor channel, if the home signal is processed.
    pub home: Option<u8>,
    /// Index monitor channel, if the index signal is processed.
    pub index: Option<u8>,
    pub convention: PinConvention,
    /// Timer the phase channels capture from and match against.
    pub timer: ClockSource,
    /// Position counter bound; zero disables the automatic reset.
    pub pc_max: u32,
    pub thresholds: SpeedThresholds,
    /// Window-open offset as a fraction of the expected period, nominally
    /// between 0.5 and 0.9. Zero disables windowing.
    pub window_ratio1: I9F23,
    /// Window-close offset as a fraction of the expected period, nominally
    /// between 1.1 and 1.5. Zero disables windowing.
    pub window_ratio2: I9F23,
    pub home_transition: HomeTransition,
    pub index_pulse: IndexPulse,
    pub index_pc_reset: IndexPcReset,
    /// Frequency of the selected timer in Hz.
    pub timer_hz: u32,
    /// Position counts per revolution; zero means thresholds are raw ticks.
    pub counts_per_rev: u32,
}

impl QdConfig {
    /// A minimal configuration for the given phase channels: no home or
    /// index signal, slow mode only, windowing disabled.
    pub fn new(primary: u8, secondary: u8) -> Self {
        Self {
            primary,
            secondary,
            home: None,
            index: None,
            convention: PinConvention::default(),
            timer: ClockSource::default(),
            pc_max: 0,
            thresholds: SpeedThresholds::default(),
            window_ratio1: I9F23::ZERO,
            window_ratio2: I9F23::ZERO,
            home_transition: HomeTransition::default(),
            index_pulse: IndexPulse::default(),
            index_pc_reset: IndexPcReset::default(),
            timer_hz: 0,
            counts_per_rev: 0,
        }
    }

    /// Validate the channel assignment.
    pub fn channels(&self) -> Result<QdChannels, ConfigError> {
        let validate = |raw: u8| ChannelId::new(raw).ok_or(ConfigError::InvalidChannel(raw));
        Ok(QdChannels {
            primary: validate(self.primary)?,
            secondary: validate(self.secondary)?,
            home: self.home.map(validate).transpose()?,
            index: self.index.map(validate).transpose()?,
        })
    }

    /// Convert one rpm threshold into ticks per electrical cycle.
    ///
    /// One revolution is `counts_per_rev` position counts and a cycle is
    /// four counts, hence the final shift.
    fn threshold_ticks(&self, threshold: u32) -> u32 {
        if self.counts_per_rev == 0 || threshold == 0 {
            return threshold & TICK_MASK;
        }
        let cycle = (60 * self.timer_hz as u64) / (self.counts_per_rev as u64 * threshold as u64);
        ((cycle << 2) as u32) & TICK_MASK
    }

    /// Validate the configuration and produce a decoder with a fresh
    /// parameter block.
    pub fn build(&self) -> Result<QuadDecoder, ConfigError> {
        let chans = self.channels()?;
        let reference_high = self.convention == PinConvention::BothHighAtReference;
        let mut params = ParamBlock::new(chans.primary, chans.secondary, reference_high);

        params.pc_max = self.pc_max & TICK_MASK;
        params.slow_normal_threshold = self.threshold_ticks(self.thresholds.slow_normal);
        params.normal_slow_threshold = self.threshold_ticks(self.thresholds.normal_slow);
        params.normal_fast_threshold = self.threshold_ticks(self.thresholds.normal_fast);
        params.fast_normal_threshold = self.threshold_ticks(self.thresholds.fast_normal);

        let ratio1 = self.window_ratio1.to_bits();
        let ratio2 = self.window_ratio2.to_bits();
        params.options = Options {
            pc_max_reset: self.pc_max > 0,
            pc_interrupt: false,
            windowing_disabled: ratio1 == 0 || ratio2 == 0,
        };
        params.ratio1 = ratio1;
        // The close offset is scheduled from the end of the expected period,
        // so the stored fraction drops the whole part.
        params.ratio2 = ratio2.wrapping_sub(FRACTION_ONE);

        Ok(QuadDecoder::new(
            params,
            self.timer,
            self.home_transition,
            self.index_pulse,
            self.index_pc_reset,
        ))
    }
}
