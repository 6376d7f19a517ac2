//! Index monitor
//!
//! Watches the once-per-revolution marker pulse on its own channel and
//! keeps the revolution counter in step with the decoder. Both pulse edges
//! must synchronize against the decoder's leading-edge indication; when the
//! decoder has not caught up yet the handler posts a link to its own
//! channel and retries on redelivery instead of blocking or polling.

use crate::channel::{
    ChannelBank, ClockSource, EdgeDetect, EventContext, ServiceError, ServiceMode, ServiceRequest,
};
use crate::config::{IndexPcReset, IndexPulse};
use crate::params::Mode;

impl super::QuadDecoder {
    /// Entry table of the index monitor channel.
    ///
    /// Transitions are classified as the pulse's first or second edge by
    /// comparing the pin level against flag 0 (the configured polarity).
    pub fn service_index(
        &mut self,
        ctx: &mut EventContext,
        bank: &mut ChannelBank,
    ) -> Result<(), ServiceError> {
        if let Some(request) = bank[ctx.chan].request.take() {
            return match request {
                ServiceRequest::Init => {
                    self.index_init(ctx, bank);
                    Ok(())
                }
                _ => Err(ServiceError { chan: ctx.chan }),
            };
        }

        let (link, m1, m2, first) = {
            let hw = &bank[ctx.chan];
            (
                hw.link_pending,
                hw.match_a_latch,
                hw.transition_latch || hw.match_b_latch,
                hw.pin != hw.flag0,
            )
        };
        match (link, m1, m2) {
            (false, _, true) => {
                if first {
                    self.index_first_transition(ctx, bank);
                } else {
                    self.index_second_transition(ctx, bank);
                }
                Ok(())
            }
            (true, false, false) => {
                if first {
                    self.index_first_link(ctx, bank);
                } else {
                    self.index_second_link(ctx, bank);
                }
                Ok(())
            }
            // A transition racing its own link redelivery takes the
            // first-transition entry.
            (true, false, true) => {
                self.index_first_transition(ctx, bank);
                Ok(())
            }
            _ => Err(ServiceError { chan: ctx.chan }),
        }
    }

    fn index_init(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        let pulse = self.index_pulse;
        let hw = &mut bank[ctx.chan];
        hw.detect = EdgeDetect::Any;
        hw.service_mode = ServiceMode::EitherNonBlocking;
        hw.clock = ClockSource::Timer1;
        hw.clear_all_latches();
        match pulse {
            IndexPulse::Positive => {
                hw.flag0 = false;
                if hw.pin {
                    // already inside the pulse: the upcoming second edge has
                    // no recorded first-edge direction
                    self.params.last_direction = None;
                }
            }
            IndexPulse::Negative => {
                hw.flag0 = true;
                if !hw.pin {
                    self.params.last_direction = None;
                }
            }
        }
        self.params.rc = 0;
        hw.enable();
    }

    fn index_first_transition(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        bank[ctx.chan].clear_transition_latch();
        self.index_first_common(ctx, bank);
    }

    fn index_first_link(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        bank[ctx.chan].clear_link();
        self.index_first_common(ctx, bank);
    }

    fn index_second_transition(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        bank[ctx.chan].clear_transition_latch();
        // the first second-edge after init has no first-edge direction: skip
        if self.params.last_direction.is_some() {
            self.index_second_common(ctx, bank);
        }
    }

    fn index_second_link(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        bank[ctx.chan].clear_link();
        self.index_second_common(ctx, bank);
    }

    fn index_first_common(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        if !self.params.mode.leading_edge {
            // The first transition cannot precede the leading edge; wait for
            // the decoder to catch up.
            bank[ctx.chan].post_link();
            return;
        }

        let pulse = self.index_pulse;
        let pc_reset = self.index_pc_reset;
        let p = &mut self.params;

        if pc_reset == IndexPcReset::Reset {
            p.pc = if p.mode.fast_to_normal {
                // This transition coincides with the edge that switched the
                // decoder fast-to-normal; the next decoder edge is not
                // scheduled, so zero would lose that edge's count.
                p.direction.delta()
            } else {
                0
            };
        }

        if p.direction.is_reverse() {
            p.rc -= 1;
        } else {
            p.rc += 1;
        }
        p.last_direction = Some(p.direction);

        if p.mode.is(Mode::Fast) {
            p.mode.leading_edge = false;
        }

        let slow = p.mode.is(Mode::Slow);
        let hw = &mut bank[ctx.chan];
        if slow {
            hw.detect = EdgeDetect::Any;
        } else {
            // Outside slow mode only the pulse's own first edge re-triggers,
            // to avoid spurious detections near the reference state.
            hw.detect = match pulse {
                IndexPulse::Positive => EdgeDetect::Rising,
                IndexPulse::Negative => EdgeDetect::Falling,
            };
            hw.clear_all_latches();
        }
    }

    fn index_second_common(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        if self.params.mode.leading_edge {
            // The second transition cannot precede the first decoder edge
            // after the leading edge; wait until the indication clears.
            bank[ctx.chan].post_link();
            return;
        }
        let p = &mut self.params;
        if p.last_direction != Some(p.direction) {
            // The direction changed during the pulse: the marker was entered
            // and left in different directions, adjust the revolution count
            // for the re-crossing.
            if p.direction.is_reverse() {
                p.rc -= 1;
            } else {
                p.rc += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelId;
    use crate::config::QdConfig;
    use crate::decoder::QuadDecoder;
    use crate::params::Direction;

    const INDEX_CHAN: u8 = 4;

    fn chan(raw: u8) -> ChannelId {
        ChannelId::new(raw).unwrap()
    }

    fn index_decoder(pulse: IndexPulse, pc_reset: IndexPcReset) -> (QuadDecoder, ChannelBank) {
        let config = QdConfig {
            index: Some(INDEX_CHAN),
            index_pulse: pulse,
            index_pc_reset: pc_reset,
            ..QdConfig::new(1, 2)
        };
        let mut decoder = config.build().unwrap();
        let mut bank = ChannelBank::new();
        bank[chan(INDEX_CHAN)].request = Some(ServiceRequest::Init);
        let mut ctx = EventContext::new(chan(INDEX_CHAN), 0, 0);
        decoder.service_index(&mut ctx, &mut bank).unwrap();
        (decoder, bank)
    }

    fn index_edge(decoder: &mut QuadDecoder, bank: &mut ChannelBank, level: bool, at: u32) {
        let hw = &mut bank[chan(INDEX_CHAN)];
        hw.pin = level;
        hw.transition_latch = true;
        hw.capture = at;
        let mut ctx = EventContext::new(chan(INDEX_CHAN), at, at);
        decoder.service_index(&mut ctx, bank).unwrap();
    }

    fn deliver_link(decoder: &mut QuadDecoder, bank: &mut ChannelBank, at: u32) {
        assert!(bank[chan(INDEX_CHAN)].link_pending);
        let mut ctx = EventContext::new(chan(INDEX_CHAN), at, at);
        decoder.service_index(&mut ctx, bank).unwrap();
    }

    #[test]
    fn test_first_edge_before_leading_edge_defers() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Positive, IndexPcReset::NoReset);
        index_edge(&mut decoder, &mut bank, true, 100);

        // deferred: nothing counted, link posted to self
        assert_eq!(decoder.params().rc, 0);
        assert!(bank[chan(INDEX_CHAN)].link_pending);

        // decoder still not caught up: redelivery defers again
        deliver_link(&mut decoder, &mut bank, 110);
        assert!(bank[chan(INDEX_CHAN)].link_pending);

        // once the leading edge is reached, redelivery completes the count
        decoder.params_mut().mode.leading_edge = true;
        deliver_link(&mut decoder, &mut bank, 120);
        assert!(!bank[chan(INDEX_CHAN)].link_pending);
        assert_eq!(decoder.params().rc, 1);
        assert_eq!(decoder.params().last_direction, Some(Direction::Increment));
    }

    #[test]
    fn test_first_edge_counts_by_direction_sign() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Positive, IndexPcReset::NoReset);
        decoder.params_mut().mode.leading_edge = true;
        decoder.params_mut().direction = Direction::DecrementFast;
        index_edge(&mut decoder, &mut bank, true, 100);
        assert_eq!(decoder.params().rc, -1);
        assert_eq!(
            decoder.params().last_direction,
            Some(Direction::DecrementFast)
        );
    }

    #[test]
    fn test_pc_reset_on_first_edge() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Positive, IndexPcReset::Reset);
        decoder.params_mut().mode.leading_edge = true;
        decoder.params_mut().pc = 42;
        index_edge(&mut decoder, &mut bank, true, 100);
        assert_eq!(decoder.params().pc, 0);
    }

    #[test]
    fn test_pc_reset_accounts_for_fast_to_normal_switch() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Positive, IndexPcReset::Reset);
        {
            let p = decoder.params_mut();
            p.mode.leading_edge = true;
            p.mode.fast_to_normal = true;
            p.pc = 42;
            p.direction = Direction::Increment;
        }
        index_edge(&mut decoder, &mut bank, true, 100);
        // reset lands on the direction value, not zero
        assert_eq!(decoder.params().pc, 1);
    }

    #[test]
    fn test_second_edge_right_after_init_is_skipped() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Positive, IndexPcReset::NoReset);
        decoder.params_mut().mode.leading_edge = true;
        // falling edge with no recorded first-edge direction
        bank[chan(INDEX_CHAN)].pin = true;
        index_edge(&mut decoder, &mut bank, false, 100);
        assert_eq!(decoder.params().rc, 0);
        assert!(!bank[chan(INDEX_CHAN)].link_pending);
    }

    #[test]
    fn test_init_inside_pulse_clears_recorded_direction() {
        let config = QdConfig {
            index: Some(INDEX_CHAN),
            ..QdConfig::new(1, 2)
        };
        let mut decoder = config.build().unwrap();
        decoder.params_mut().last_direction = Some(Direction::Increment);
        let mut bank = ChannelBank::new();
        bank[chan(INDEX_CHAN)].pin = true;
        bank[chan(INDEX_CHAN)].request = Some(ServiceRequest::Init);
        let mut ctx = EventContext::new(chan(INDEX_CHAN), 0, 0);
        decoder.service_index(&mut ctx, &mut bank).unwrap();
        assert_eq!(decoder.params().last_direction, None);
    }

    #[test]
    fn test_second_edge_same_direction_leaves_rc() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Positive, IndexPcReset::NoReset);
        decoder.params_mut().mode.leading_edge = true;
        index_edge(&mut decoder, &mut bank, true, 100);
        assert_eq!(decoder.params().rc, 1);

        // a decoder edge cleared the leading indication in the meantime
        decoder.params_mut().mode.leading_edge = false;
        index_edge(&mut decoder, &mut bank, false, 200);
        assert_eq!(decoder.params().rc, 1);
    }

    #[test]
    fn test_second_edge_direction_reversal_adjusts_rc() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Positive, IndexPcReset::NoReset);
        decoder.params_mut().mode.leading_edge = true;
        index_edge(&mut decoder, &mut bank, true, 100);
        assert_eq!(decoder.params().rc, 1);

        // reversed between the two pulse edges
        decoder.params_mut().mode.leading_edge = false;
        decoder.params_mut().direction = Direction::Decrement;
        index_edge(&mut decoder, &mut bank, false, 200);
        assert_eq!(decoder.params().rc, 0);
    }

    #[test]
    fn test_second_edge_defers_while_leading_indication_set() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Positive, IndexPcReset::NoReset);
        decoder.params_mut().mode.leading_edge = true;
        index_edge(&mut decoder, &mut bank, true, 100);

        // second edge arrives before any decoder edge cleared the indication
        index_edge(&mut decoder, &mut bank, false, 150);
        assert!(bank[chan(INDEX_CHAN)].link_pending);
        assert_eq!(decoder.params().rc, 1);

        // after a non-leading decoder edge, redelivery completes
        decoder.params_mut().mode.leading_edge = false;
        deliver_link(&mut decoder, &mut bank, 200);
        assert!(!bank[chan(INDEX_CHAN)].link_pending);
        assert_eq!(decoder.params().rc, 1);
    }

    #[test]
    fn test_negative_pulse_polarity() {
        let (mut decoder, mut bank) = index_decoder(IndexPulse::Negative, IndexPcReset::NoReset);
        decoder.params_mut().mode.leading_edge = true;
        // pin starts high outside a negative pulse; the falling edge is the
        // first transition (pin false != flag0 true)
        bank[chan(INDEX_CHAN)].pin = true;
        index_edge(&mut decoder, &mut bank, false, 100);
        assert_eq!(decoder.params().rc, 1);
    }
}
