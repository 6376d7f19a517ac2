//! Home monitor
//!
//! Watches an absolute reference input on its own channel. On the
//! configured transition it re-arms immediately and zeroes both counters.
//! It never touches the period or direction state.

use crate::channel::{
    ChannelBank, ClockSource, EdgeDetect, EventContext, ServiceError, ServiceMode, ServiceRequest,
};
use crate::config::HomeTransition;

impl super::QuadDecoder {
    /// Entry table of the home monitor channel.
    pub fn service_home(
        &mut self,
        ctx: &mut EventContext,
        bank: &mut ChannelBank,
    ) -> Result<(), ServiceError> {
        if let Some(request) = bank[ctx.chan].request.take() {
            return match request {
                ServiceRequest::Init => {
                    self.home_init(ctx, bank);
                    Ok(())
                }
                _ => Err(ServiceError { chan: ctx.chan }),
            };
        }

        let hw = &mut bank[ctx.chan];
        if hw.link_pending {
            hw.clear_link();
            return Err(ServiceError { chan: ctx.chan });
        }
        if hw.transition_latch || hw.match_b_latch {
            self.home_transition_detected(ctx, bank);
            Ok(())
        } else {
            Err(ServiceError { chan: ctx.chan })
        }
    }

    fn home_init(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        let transition = self.home_transition;
        let hw = &mut bank[ctx.chan];
        hw.detect = match transition {
            HomeTransition::LowHigh => EdgeDetect::Rising,
            HomeTransition::HighLow => EdgeDetect::Falling,
            HomeTransition::Any => EdgeDetect::Any,
        };
        hw.service_mode = ServiceMode::EitherNonBlocking;
        hw.clock = ClockSource::Timer1;
        hw.clear_all_latches();
        hw.enable();
    }

    fn home_transition_detected(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        // re-arm immediately for further transitions
        bank[ctx.chan].clear_transition_latch();
        self.params.rc = 0;
        self.params.pc = 0;
    }
}
