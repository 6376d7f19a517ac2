//! Host driver API
//!
//! The calls a host CPU makes against the coprocessor to set up, steer and
//! read back a decoder instance: parameter-block writes, service requests
//! and the synchronous align operation. Runtime decoding never involves the
//! host; these calls only touch the parameter block between activations.

use quadrans_core::{
    ConfigError, ErrorFlags, Mode, Priority, QdConfig, ServiceRequest,
};

use crate::{Binding, Coprocessor, SimError};

/// Handle to one configured decoder instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QdHandle(usize);

/// Direction as reported to the host: the sign of the counting direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDirection {
    Increment,
    Decrement,
}

/// Host-visible failures of the driver calls.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The supplied configuration was rejected; channel state is unchanged.
    #[error("invalid configuration: {0:?}")]
    InvalidConfig(ConfigError),
    /// No parameter RAM left for a new function frame; no channel was armed.
    #[error("out of parameter RAM")]
    OutOfParamRam,
    /// A service request is still pending on the channel.
    #[error("channel not ready for a service request")]
    NotReady,
    /// The dispatcher hit its fault trap.
    #[error(transparent)]
    Sim(#[from] SimError),
}

impl Coprocessor {
    /// Configure a decoder instance: validate, allocate a parameter frame,
    /// bind and prioritize the channels, then arm everything with Init
    /// service requests.
    pub fn qd_init(
        &mut self,
        config: &QdConfig,
        priority: Priority,
    ) -> Result<QdHandle, HostError> {
        let channels = config.channels().map_err(HostError::InvalidConfig)?;
        let decoder = config.build().map_err(HostError::InvalidConfig)?;

        let slot = self
            .add_instance(decoder, channels)
            .ok_or(HostError::OutOfParamRam)?;

        self.bind(channels.primary, Binding::Phase(slot), priority);
        self.bind(channels.secondary, Binding::Phase(slot), priority);
        if let Some(home) = channels.home {
            self.bind(home, Binding::Home(slot), priority);
        }
        if let Some(index) = channels.index {
            self.bind(index, Binding::Index(slot), priority);
        }

        self.bank[channels.primary].request = Some(ServiceRequest::Init);
        self.bank[channels.secondary].request = Some(ServiceRequest::Init);
        if let Some(home) = channels.home {
            self.bank[home].request = Some(ServiceRequest::Init);
        }
        if let Some(index) = channels.index {
            self.bank[index].request = Some(ServiceRequest::Init);
        }
        self.drain()?;

        Ok(QdHandle(slot))
    }

    /// Take all channels of an instance out of service.
    pub fn qd_disable(&mut self, handle: QdHandle) {
        for chan in self.bound_channels(handle) {
            self.bank[chan].priority = Priority::Disabled;
        }
    }

    /// Put the channels of an instance back into service.
    pub fn qd_enable(&mut self, handle: QdHandle, priority: Priority) -> Result<(), HostError> {
        for chan in self.bound_channels(handle) {
            self.bank[chan].priority = priority;
        }
        // anything latched while disabled is served now
        self.drain()?;
        Ok(())
    }

    /// Re-initialize the phase channels and adjust the position counter so
    /// that leading-edge positions are multiples of four, compensating for
    /// whichever of the four quadrature states was initial.
    ///
    /// Synchronous from the host's view: returns after the handlers ran.
    pub fn qd_align(&mut self, handle: QdHandle, pc: i32) -> Result<(), HostError> {
        let channels = self.instance(handle.0).channels;
        self.bank[channels.primary].request = Some(ServiceRequest::Init);
        self.bank[channels.secondary].request = Some(ServiceRequest::Init);
        self.drain()?;

        let pins = self.instance(handle.0).decoder.params().pins;
        let (a, b, reference) = (pins.phase_a(), pins.phase_b(), pins.reference_high());
        let adjust = if a == b {
            if a == reference {
                0
            } else {
                2
            }
        } else if a != reference {
            1
        } else {
            -1
        };

        let params = self.instance_mut(handle.0).decoder.params_mut();
        params.pc = pc + adjust;
        params.pc_sc = 0;
        Ok(())
    }

    /// Trigger the latch-and-clear of the windowing error flags.
    pub fn qd_latch_and_clear_errors(&mut self, handle: QdHandle) -> Result<(), HostError> {
        let primary = self.instance(handle.0).channels.primary;
        if self.bank[primary].request.is_some() {
            return Err(HostError::NotReady);
        }
        self.bank[primary].request = Some(ServiceRequest::LatchAndClearErrors);
        self.drain()?;
        Ok(())
    }

    pub fn qd_pc(&self, handle: QdHandle) -> i32 {
        self.instance(handle.0).decoder.params().pc
    }

    pub fn qd_pc_sc(&self, handle: QdHandle) -> i32 {
        self.instance(handle.0).decoder.params().pc_sc
    }

    pub fn qd_rc(&self, handle: QdHandle) -> i32 {
        self.instance(handle.0).decoder.params().rc
    }

    pub fn qd_direction(&self, handle: QdHandle) -> RotationDirection {
        if self.instance(handle.0).decoder.params().direction.is_reverse() {
            RotationDirection::Decrement
        } else {
            RotationDirection::Increment
        }
    }

    pub fn qd_mode(&self, handle: QdHandle) -> Mode {
        self.instance(handle.0).decoder.params().mode.mode
    }

    /// Time of the last detected (or estimated) transition.
    pub fn qd_last_edge(&self, handle: QdHandle) -> u32 {
        self.instance(handle.0).decoder.params().last_edge
    }

    /// The full 32-bit period between the last two leading edges.
    pub fn qd_period(&self, handle: QdHandle) -> u32 {
        self.instance(handle.0).decoder.params().period.value()
    }

    pub fn qd_pin_a(&self, handle: QdHandle) -> bool {
        self.instance(handle.0).decoder.params().pins.phase_a()
    }

    pub fn qd_pin_b(&self, handle: QdHandle) -> bool {
        self.instance(handle.0).decoder.params().pins.phase_b()
    }

    pub fn qd_error_flags(&self, handle: QdHandle) -> ErrorFlags {
        self.instance(handle.0).decoder.params().error_flags
    }

    pub fn qd_latched_error_flags(&self, handle: QdHandle) -> ErrorFlags {
        self.instance(handle.0).decoder.params().error_flags_latched
    }

    pub fn qd_set_pc(&mut self, handle: QdHandle, pc: i32) {
        self.instance_mut(handle.0).decoder.params_mut().pc = pc;
    }

    pub fn qd_set_rc(&mut self, handle: QdHandle, rc: i32) {
        self.instance_mut(handle.0).decoder.params_mut().rc = rc;
    }

    pub fn qd_set_pc_interrupts(&mut self, handle: QdHandle, first: i32, second: i32) {
        let params = self.instance_mut(handle.0).decoder.params_mut();
        params.pc_interrupt1 = first;
        params.pc_interrupt2 = second;
    }

    pub fn qd_enable_pc_interrupts(&mut self, handle: QdHandle) {
        self.instance_mut(handle.0)
            .decoder
            .params_mut()
            .options
            .pc_interrupt = true;
    }

    pub fn qd_disable_pc_interrupts(&mut self, handle: QdHandle) {
        self.instance_mut(handle.0)
            .decoder
            .params_mut()
            .options
            .pc_interrupt = false;
    }

    /// Force the decoder back to slow mode.
    pub fn qd_set_slow_mode(&mut self, handle: QdHandle) {
        self.instance_mut(handle.0)
            .decoder
            .params_mut()
            .mode
            .set(Mode::Slow);
    }

    fn bound_channels(&self, handle: QdHandle) -> Vec<quadrans_core::ChannelId> {
        let channels = self.instance(handle.0).channels;
        let mut all = vec![channels.primary, channels.secondary];
        all.extend(channels.home);
        all.extend(channels.index);
        all
    }
}
