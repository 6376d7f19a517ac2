//! Per-edge processing
//!
//! The edge handlers classify the service cause, update the live pin
//! snapshot and expected-edge polarity, then fall into the shared
//! [`QuadDecoder::common`] path that advances the counters, folds the
//! period, runs the mode hysteresis and re-arms detection for the next
//! edge.

use crate::channel::{ChannelBank, EdgeDetect, EventContext, ServiceMode};
use crate::params::{Direction, Mode, PhaseRole};
use crate::time;

impl super::QuadDecoder {
    /// Rising edge in slow or normal mode.
    pub(super) fn slow_normal_rising_edge(
        &mut self,
        ctx: &mut EventContext,
        bank: &mut ChannelBank,
    ) {
        let role = self.phase_role(ctx.chan);
        let hw = &mut bank[ctx.chan];
        hw.detect = EdgeDetect::Falling;
        hw.flag1 = true;
        self.params.pins.set_phase(role, true);
        self.slow_normal_common(ctx, bank);
    }

    /// Falling edge in slow or normal mode.
    pub(super) fn slow_normal_falling_edge(
        &mut self,
        ctx: &mut EventContext,
        bank: &mut ChannelBank,
    ) {
        let role = self.phase_role(ctx.chan);
        let hw = &mut bank[ctx.chan];
        hw.detect = EdgeDetect::Rising;
        hw.flag1 = false;
        self.params.pins.set_phase(role, false);
        self.slow_normal_common(ctx, bank);
    }

    fn slow_normal_common(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        if self.params.mode.is(Mode::Slow) {
            // lead/lag test on the fresh pin snapshot
            let lead = matches!(self.phase_role(ctx.chan), PhaseRole::Secondary)
                ^ self.params.pins.phase_a()
                ^ self.params.pins.phase_b();
            self.params.direction = if lead {
                Direction::Increment
            } else {
                Direction::Decrement
            };
        }
        if !bank[ctx.chan].transition_latch {
            // The window closed without a transition: estimate the edge a
            // quarter period past the last edge and flag the violation.
            ctx.capture_a = time::add(self.params.last_edge, self.params.period.low() >> 2);
            self.params.error_flags.set_windowing();
        }
        self.common(ctx, bank);
    }

    /// Edge (or window close) in fast mode. Only one transition per
    /// electrical cycle is monitored, so rising and falling are not
    /// distinguished here.
    pub(super) fn fast_mode_edge(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        if !bank[ctx.chan].transition_latch {
            ctx.capture_a = time::add(self.params.last_edge, self.params.period.low());
            self.params.error_flags.set_windowing();
        }
        self.common(ctx, bank);
    }

    /// The slow-mode overflow match elapsed before a real edge: fold the
    /// half-range interval into the accumulator and re-arm.
    pub(super) fn period_overflow(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        bank[ctx.chan].clear_match_a_latch();
        let delta = time::elapsed(ctx.capture_a, self.params.last_leading_edge);
        self.params.period_accum.accumulate(delta);
        self.params.last_leading_edge = ctx.capture_a;
        ctx.capture_a = time::add(ctx.capture_a, time::HALF_RANGE);
        bank[ctx.chan].arm_match_a(ctx.capture_a);
    }

    /// Common processing for any edge, all modes.
    fn common(&mut self, ctx: &mut EventContext, bank: &mut ChannelBank) {
        let role = self.phase_role(ctx.chan);
        let other_chan = match role {
            PhaseRole::Primary => self.params.phase_b_chan,
            PhaseRole::Secondary => self.params.phase_a_chan,
        };
        let reference_high = self.params.pins.reference_high();

        // end any matches in progress
        bank[ctx.chan].disable_match_detection();

        self.params.last_edge = ctx.capture_a;
        self.params.pc += self.params.direction.delta();
        self.params.pc_sc += self.params.direction.delta();

        if self.params.options.pc_interrupt
            && (self.params.pc == self.params.pc_interrupt1
                || self.params.pc == self.params.pc_interrupt2)
        {
            bank[ctx.chan].request_interrupt();
        }

        let mut window_period;
        let mut skip_windowing = false;

        if self.params.pins.at_reference() {
            // This edge closes a full electrical cycle.
            let p = &mut self.params;
            if p.options.pc_max_reset && p.pc.unsigned_abs() >= p.pc_max {
                p.pc = 0;
            }

            let delta = time::elapsed(ctx.capture_a, p.last_leading_edge);
            window_period = p.period_accum.accumulate(delta);
            p.period = p.period_accum;
            p.period_accum.clear();
            p.last_leading_edge = ctx.capture_a;

            if !p.found_leading_edge {
                // No prior period baseline exists yet: record the indicator
                // and skip mode evaluation.
                p.found_leading_edge = true;
                p.mode.leading_edge = true;
                skip_windowing = true;
            } else {
                match p.mode.mode {
                    Mode::Slow => {
                        if window_period < p.slow_normal_threshold && p.period.high() == 0 {
                            p.mode.set(Mode::Normal);
                            // windowing based upon half period
                            window_period >>= 1;
                        }
                    }
                    Mode::Normal => {
                        if window_period < p.normal_fast_threshold {
                            p.mode.set(Mode::Fast);
                            p.direction = p.direction.fast();
                            let hw = &mut bank[ctx.chan];
                            hw.flag0 = true;
                            if reference_high {
                                hw.detect = EdgeDetect::Rising;
                                hw.flag1 = false;
                            } else {
                                hw.detect = EdgeDetect::Falling;
                                hw.flag1 = true;
                            }
                            // The other phase stops independent detection
                            // entirely while fast mode is active.
                            let other = &mut bank[other_chan];
                            other.detect = EdgeDetect::Disabled;
                            other.disable_match_detection();
                            other.clear_all_latches();
                        } else if window_period > p.normal_slow_threshold {
                            p.mode.set(Mode::Slow);
                            p.mode.leading_edge = true;
                            skip_windowing = true;
                        } else {
                            window_period >>= 1;
                        }
                    }
                    Mode::Fast => {
                        if window_period > p.fast_normal_threshold {
                            p.mode.set(Mode::Normal);
                            p.mode.fast_to_normal = true;
                            p.direction = p.direction.slow();
                            let hw = &mut bank[ctx.chan];
                            hw.flag0 = false;
                            if reference_high {
                                hw.detect = EdgeDetect::Falling;
                                hw.flag1 = true;
                            } else {
                                hw.detect = EdgeDetect::Rising;
                                hw.flag1 = false;
                            }
                            // Count the edge on the other phase that was
                            // missed while only this phase was monitored.
                            p.pc += p.direction.delta();
                            p.pc_sc += p.direction.delta();

                            let other = &mut bank[other_chan];
                            if reference_high {
                                other.detect = EdgeDetect::Rising;
                                other.flag1 = false;
                            } else {
                                other.detect = EdgeDetect::Falling;
                                other.flag1 = true;
                            }
                            other.service_mode = ServiceMode::SingleMatch;
                            window_period >>= 1;
                        }
                    }
                }
                if !skip_windowing {
                    p.mode.leading_edge = true;
                }
            }
        } else {
            let p = &mut self.params;
            p.mode.leading_edge = false;
            p.mode.fast_to_normal = false;
            window_period = p.period.low();
            if p.mode.is(Mode::Normal) {
                // the trailing edge lands roughly mid-period
                window_period >>= 1;
            }
        }

        // re-seat the edge time after cross-channel reprogramming
        ctx.capture_a = self.params.last_edge;

        let p = &self.params;
        let windowing = !skip_windowing && !p.options.windowing_disabled && !p.mode.is(Mode::Slow);
        if windowing {
            let (ratio1, ratio2) = (p.ratio1, p.ratio2);
            let hw = &mut bank[ctx.chan];
            hw.service_mode = ServiceMode::Windowed;
            ctx.capture_b = time::offset(
                ctx.capture_a,
                window_period as i32 + time::fraction_mul(window_period, ratio2),
            );
            // When the transition did not come (match B is latched), leave
            // the window open; otherwise schedule the next window opening.
            if !hw.match_b_latch {
                ctx.capture_a =
                    time::offset(ctx.capture_a, time::fraction_mul(window_period, ratio1));
            }
            hw.clear_all_latches();
            hw.arm_match_a(ctx.capture_a);
            hw.arm_match_b(ctx.capture_b);
        } else {
            let hw = &mut bank[ctx.chan];
            hw.service_mode = ServiceMode::SingleMatch;
            hw.clear_all_latches();
        }

        if self.params.mode.is(Mode::Slow) {
            // start up the period-overflow match
            ctx.capture_a = time::add(ctx.capture_a, time::HALF_RANGE);
            bank[ctx.chan].arm_match_a(ctx.capture_a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelBank, ChannelId, EventContext, ServiceRequest};
    use crate::config::QdConfig;
    use crate::decoder::QuadDecoder;
    use crate::time::HALF_RANGE;

    fn chan(raw: u8) -> ChannelId {
        ChannelId::new(raw).unwrap()
    }

    fn init_decoder() -> (QuadDecoder, ChannelBank) {
        let mut decoder = QdConfig::new(1, 2).build().unwrap();
        let mut bank = ChannelBank::new();
        for ch in [1, 2] {
            bank[chan(ch)].request = Some(ServiceRequest::Init);
            let mut ctx = EventContext::new(chan(ch), 0, 0);
            decoder.service_phase(&mut ctx, &mut bank).unwrap();
        }
        (decoder, bank)
    }

    /// Deliver a real transition to an initialized channel at `at` ticks.
    fn edge(decoder: &mut QuadDecoder, bank: &mut ChannelBank, ch: u8, level: bool, at: u32) {
        let hw = &mut bank[chan(ch)];
        hw.pin = level;
        hw.transition_latch = true;
        hw.capture = at;
        let mut ctx = EventContext::new(chan(ch), at, at);
        decoder.service_phase(&mut ctx, bank).unwrap();
    }

    #[test]
    fn test_forward_quarter_cycle_counts_up() {
        let (mut decoder, mut bank) = init_decoder();
        edge(&mut decoder, &mut bank, 1, true, 1000);
        assert_eq!(decoder.params().pc, 1);
        assert_eq!(decoder.params().direction, Direction::Increment);
        edge(&mut decoder, &mut bank, 2, true, 2000);
        edge(&mut decoder, &mut bank, 1, false, 3000);
        edge(&mut decoder, &mut bank, 2, false, 4000);
        assert_eq!(decoder.params().pc, 4);
        assert_eq!(decoder.params().pc_sc, 4);
        assert!(decoder.params().mode.leading_edge);
        assert!(decoder.params().found_leading_edge);
    }

    #[test]
    fn test_reverse_order_counts_down() {
        let (mut decoder, mut bank) = init_decoder();
        edge(&mut decoder, &mut bank, 2, true, 1000);
        assert_eq!(decoder.params().direction, Direction::Decrement);
        assert_eq!(decoder.params().pc, -1);
        edge(&mut decoder, &mut bank, 1, true, 2000);
        edge(&mut decoder, &mut bank, 2, false, 3000);
        edge(&mut decoder, &mut bank, 1, false, 4000);
        assert_eq!(decoder.params().pc, -4);
    }

    #[test]
    fn test_first_leading_edge_skips_mode_evaluation() {
        let (mut decoder, mut bank) = init_decoder();
        // Tight cycle that would qualify for normal mode if a baseline
        // existed. Thresholds are zero here, but found_leading_edge is the
        // gate under test.
        for (ch, level, at) in [(1, true, 10), (2, true, 20), (1, false, 30), (2, false, 40)] {
            edge(&mut decoder, &mut bank, ch, level, at);
        }
        assert!(decoder.params().mode.is(Mode::Slow));
        assert!(decoder.params().found_leading_edge);
        // slow mode keeps the overflow match armed
        assert!(bank[chan(2)].match_a.is_some());
    }

    #[test]
    fn test_period_published_only_at_leading_edge() {
        let (mut decoder, mut bank) = init_decoder();
        edge(&mut decoder, &mut bank, 1, true, 1000);
        edge(&mut decoder, &mut bank, 2, true, 2000);
        assert_eq!(decoder.params().period.value(), 0);
        edge(&mut decoder, &mut bank, 1, false, 3000);
        edge(&mut decoder, &mut bank, 2, false, 4000);
        assert_eq!(decoder.params().period.value(), 4000);
        // second cycle measures leading edge to leading edge
        edge(&mut decoder, &mut bank, 1, true, 5000);
        edge(&mut decoder, &mut bank, 2, true, 6000);
        edge(&mut decoder, &mut bank, 1, false, 7000);
        edge(&mut decoder, &mut bank, 2, false, 8000);
        assert_eq!(decoder.params().period.value(), 4000);
    }

    #[test]
    fn test_pc_interrupt_raised_at_trigger_values() {
        let (mut decoder, mut bank) = init_decoder();
        {
            let p = decoder.params_mut();
            p.options.pc_interrupt = true;
            p.pc_interrupt1 = 2;
            p.pc_interrupt2 = -1;
        }
        edge(&mut decoder, &mut bank, 1, true, 1000);
        assert!(!bank[chan(1)].interrupt);
        edge(&mut decoder, &mut bank, 2, true, 2000);
        // pc hit 2 on the secondary channel's edge
        assert!(bank[chan(2)].interrupt);
    }

    #[test]
    fn test_pc_max_resets_at_leading_edge() {
        let (mut decoder, mut bank) = init_decoder();
        {
            let p = decoder.params_mut();
            p.options.pc_max_reset = true;
            p.pc_max = 4;
        }
        edge(&mut decoder, &mut bank, 1, true, 1000);
        edge(&mut decoder, &mut bank, 2, true, 2000);
        edge(&mut decoder, &mut bank, 1, false, 3000);
        assert_eq!(decoder.params().pc, 3);
        edge(&mut decoder, &mut bank, 2, false, 4000);
        // |pc| reached pc_max exactly at the leading edge
        assert_eq!(decoder.params().pc, 0);
        assert_eq!(decoder.params().pc_sc, 4);
    }

    #[test]
    fn test_overflow_match_extends_period_range() {
        let (mut decoder, mut bank) = init_decoder();

        // Simulate the overflow match firing twice on the primary channel
        // before the first edge arrives.
        for fire in 1..=2u32 {
            let at = (fire * HALF_RANGE) & 0x00FF_FFFF;
            bank[chan(1)].match_a_latch = true;
            bank[chan(1)].match_a = None;
            let mut ctx = EventContext::new(chan(1), at, at);
            decoder.service_phase(&mut ctx, &mut bank).unwrap();
        }
        assert_eq!(decoder.params().period_accum.value() as u64, 2 * HALF_RANGE as u64);
        // re-armed half a range ahead
        assert_eq!(bank[chan(1)].match_a, Some(HALF_RANGE));
    }
}
