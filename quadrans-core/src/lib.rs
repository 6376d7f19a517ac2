//! Hardware-agnostic core of the quadrature decoder function set
//!
//! This crate contains all decoder logic that does not depend on a specific
//! event source:
//!
//! - The per-channel hardware image (pin level, edge detection, match
//!   registers, latches, flags) the handlers reprogram
//! - The shared parameter block read and written by the handlers and the
//!   host driver
//! - The three cooperating state machines: the phase decoder, the home
//!   monitor and the index monitor
//! - Host configuration types with validation and rpm-to-tick conversion
//!
//! Event generation (when a match fires, when a pin transition latches, when
//! a self-link is redelivered) is the job of the surrounding dispatcher; the
//! `quadrans-sim` crate provides one for host testing.

#![no_std]
#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod decoder;
pub mod params;
pub mod time;

pub use channel::{
    ChannelBank, ChannelHw, ChannelId, ClockSource, EdgeDetect, EventContext, Priority,
    ServiceError, ServiceMode, ServiceRequest,
};
pub use config::{
    ConfigError, HomeTransition, IndexPcReset, IndexPulse, PinConvention, QdChannels, QdConfig,
    SpeedThresholds,
};
pub use decoder::QuadDecoder;
pub use params::{Direction, ErrorFlags, Mode, ModeStatus, Options, ParamBlock, PhaseRole, PinStates};
