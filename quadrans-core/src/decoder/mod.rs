//! The quadrature decoder function set
//!
//! One [`QuadDecoder`] owns the parameter block shared by its primary and
//! secondary phase channels and, optionally, the home and index monitor
//! channels. The three `service_*` entry points mirror the function entry
//! tables: the dispatcher calls the one matching the serviced channel's
//! binding, and the decoder classifies the event into a handler from the
//! channel's latches, flags and pin state. Event combinations with no entry
//! are a dispatcher/configuration inconsistency and come back as
//! [`ServiceError`].

mod edge;
mod home;
mod index;

use crate::channel::{
    ChannelBank, ChannelId, ClockSource, EdgeDetect, EventContext, ServiceError, ServiceMode,
    ServiceRequest,
};
use crate::config::{HomeTransition, IndexPcReset, IndexPulse};
use crate::params::{Mode, ParamBlock, PhaseRole};
use crate::time;

/// The decoder instance: shared parameter block plus the configuration-time
/// function modes of its channels.
#[derive(Debug, Clone)]
pub struct QuadDecoder {
    params: ParamBlock,
    timer: ClockSource,
    home_transition: HomeTransition,
    index_pulse: IndexPulse,
    index_pc_reset: IndexPcReset,
}

impl QuadDecoder {
    pub fn new(
        params: ParamBlock,
        timer: ClockSource,
        home_transition: HomeTransition,
        index_pulse: IndexPulse,
        index_pc_reset: IndexPcReset,
    ) -> Self {
        Self {
            params,
            timer,
            home_transition,
            index_pulse,
            index_pc_reset,
        }
    }

    /// The shared parameter block.
    pub fn params(&self) -> &ParamBlock {
        &self.params
    }

    /// Host write access to the parameter block, for use between
    /// activations only.
    pub fn params_mut(&mut self) -> &mut ParamBlock {
        &mut self.params
    }

    /// The (primary, secondary) phase channel pair.
    pub fn phase_channels(&self) -> (ChannelId, ChannelId) {
        (self.params.phase_a_chan, self.params.phase_b_chan)
    }

    /// Which phase a channel serves; the secondary role is the default for
    /// any channel that is not the configured phase A channel.
    fn phase_role(&self, chan: ChannelId) -> PhaseRole {
        if chan == self.params.phase_a_chan {
            PhaseRole::Primary
        } else {
            PhaseRole::Secondary
        }
    }

    /// Entry table of the phase decoder channels.
    pub fn service_phase(
        &mut self,
        ctx: &mut EventContext,
        bank: &mut ChannelBank,
    ) -> Result<(), ServiceError> {
        if let Some(request) = bank[ctx.chan].request.take() {
            match request {
                ServiceRequest::Init => self.phase_init(ctx, bank),
                ServiceRequest::LatchAndClearErrors => self.latch_and_clear_errors(),
            }
            return Ok(());
        }

        let (link, m1, m2, flag0, flag1) = {
            let hw = &bank[ctx.chan];
            (
                hw.link_pending,
                hw.match_a_latch,
                hw.transition_latch || hw.match_b_latch,
                hw.flag0,
                hw.flag1,
            )
        };
        if link {
            // no link entries exist for the phase decoder
            bank[ctx.chan].clear_link();
            return Err(ServiceError { chan: ctx.chan });
        }
        match (m1, m2, flag0, flag1) {
            (_, true, false, false) => self.slow_normal_rising_edge(ctx, bank),
            (_, true, false, true) => self.slow_normal_falling_edge(ctx, bank),
            (_, true, true, _) => self.fast_mode_edge(ctx, bank),
            (true, false, false, _) => self.period_overflow(ctx, bank),
            _ => return Err(ServiceError { chan: ctx.chan }),
        }
        Ok(())
    }

    /// Phase channel initialization: capture the current pin level to pick
    /// the first expected edge, reset the counters and arm the slow-mode
    /// period-overflow match.
    fn phase_init(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        let role = self.phase_role(ctx.chan);
        let timer = self.timer;
        let hw = &mut bank[ctx.chan];
        hw.clock = timer;
        hw.service_mode = ServiceMode::SingleMatch;
        hw.clear_all_latches();
        self.params.last_leading_edge = ctx.now;

        if hw.pin {
            hw.detect = EdgeDetect::Falling;
            hw.flag1 = true;
            self.params.pins.set_phase(role, true);
        } else {
            hw.detect = EdgeDetect::Rising;
            hw.flag1 = false;
            self.params.pins.set_phase(role, false);
        }

        self.params.pc = 0;
        self.params.mode.set(Mode::Slow);
        self.params.period_accum.clear();
        hw.flag0 = false;
        self.params.found_leading_edge = false;

        ctx.capture_a = time::add(self.params.last_leading_edge, time::HALF_RANGE);
        hw.arm_match_a(ctx.capture_a);
        hw.enable();
    }

    /// Latch the error flags and clear the working copy.
    fn latch_and_clear_errors(&mut self) {
        self.params.error_flags_latched = self.params.error_flags;
        self.params.error_flags.clear();
    }
}
