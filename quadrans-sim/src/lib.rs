//! Channel-level simulator for the quadrans decoder function set
//!
//! Models the coprocessor's hardware event dispatcher on the host: a
//! free-running timebase, per-channel match and transition event
//! generation, self-link redelivery, and priority-ordered run-to-completion
//! service of the decoder handlers. The host driver API built on top lives
//! in [`host`].
//!
//! Time is a `u64` tick count; channel captures and match values live on
//! the wrapping 24-bit timebase the decoder sees.

pub mod host;

use quadrans_core::time::{self, HALF_RANGE, TICK_MASK};
use quadrans_core::{
    ChannelBank, ChannelHw, ChannelId, EventContext, Priority, QdChannels, QuadDecoder,
    ServiceMode, ServiceRequest,
};

pub use host::{HostError, QdHandle, RotationDirection};

/// Ticks between a posted self-link and its redelivery, standing in for the
/// dispatch latency that lets other channels' events interleave.
const LINK_REDELIVERY_LATENCY: u64 = 8;

/// Parameter RAM available for function frames.
pub const PARAM_RAM_BYTES: u32 = 0x0C00;

/// Parameter RAM consumed by one decoder instance.
pub const QD_FRAME_BYTES: u32 = 0x68;

/// Simulator-level failure: an event fired that the configured entry tables
/// do not expect. This is the process-wide trap of the real dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("unexpected event on channel {0:?}")]
    UnexpectedEvent(ChannelId),
}

/// What a channel is bound to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Phase(usize),
    Home(usize),
    Index(usize),
}

/// One configured decoder and its channel assignment.
struct Instance {
    decoder: QuadDecoder,
    channels: QdChannels,
}

/// Sim-side event bookkeeping for one channel: absolute due times for the
/// armed matches and a pending link redelivery.
#[derive(Debug, Clone, Copy, Default)]
struct ChannelSchedule {
    armed_a: Option<u32>,
    due_a: Option<u64>,
    armed_b: Option<u32>,
    due_b: Option<u64>,
    link_due: Option<u64>,
}

/// The simulated coprocessor.
pub struct Coprocessor {
    now: u64,
    bank: ChannelBank,
    instances: Vec<Instance>,
    bindings: Vec<Option<Binding>>,
    sched: Vec<ChannelSchedule>,
    pram_free: u32,
}

/// All valid channel numbers, in service-priority scan order.
fn channel_ids() -> impl Iterator<Item = ChannelId> {
    (0u8..=31).chain(64..=95).filter_map(ChannelId::new)
}

/// Absolute fire time for a match armed at 24-bit value `at`.
///
/// The comparator is greater-or-equal on the wrapping timebase: values up
/// to half a range ahead are future, everything else fires immediately.
fn match_due(now: u64, at: u32) -> u64 {
    let delta = time::elapsed(at, (now & TICK_MASK as u64) as u32);
    if delta == 0 || delta > HALF_RANGE {
        now
    } else {
        now + delta as u64
    }
}

impl Default for Coprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Coprocessor {
    pub fn new() -> Self {
        let count = quadrans_core::channel::CHANNEL_COUNT;
        Self {
            now: 0,
            bank: ChannelBank::new(),
            instances: Vec::new(),
            bindings: vec![None; count],
            sched: vec![ChannelSchedule::default(); count],
            pram_free: PARAM_RAM_BYTES,
        }
    }

    /// Current absolute time in ticks.
    pub fn now(&self) -> u64 {
        self.now
    }

    fn now24(&self) -> u32 {
        (self.now & TICK_MASK as u64) as u32
    }

    /// Read access to a channel's hardware image, for tests and host-side
    /// introspection.
    pub fn channel(&self, chan: ChannelId) -> &ChannelHw {
        &self.bank[chan]
    }

    /// Consume a pending channel interrupt toward the host.
    pub fn take_interrupt(&mut self, chan: ChannelId) -> bool {
        core::mem::take(&mut self.bank[chan].interrupt)
    }

    /// Drive an input pin. Transition detection follows the channel's
    /// current edge selection; in windowed mode detection is gated on the
    /// window being open.
    pub fn write_pin(&mut self, chan: ChannelId, level: bool) -> Result<(), SimError> {
        let now24 = self.now24();
        let hw = &mut self.bank[chan];
        let previous = hw.pin;
        hw.pin = level;
        if hw.enabled && hw.detect.matches(previous, level) {
            let window_closed =
                hw.service_mode == ServiceMode::Windowed && !hw.match_a_latch;
            if !window_closed {
                hw.transition_latch = true;
                hw.capture = now24;
            }
        }
        self.drain()
    }

    /// Post a host service request to a channel and serve it.
    pub fn request_service(
        &mut self,
        chan: ChannelId,
        request: ServiceRequest,
    ) -> Result<(), SimError> {
        self.bank[chan].request = Some(request);
        self.drain()
    }

    /// Advance the timebase, firing matches and redelivering links in
    /// order and serving every resulting event.
    pub fn advance(&mut self, ticks: u64) -> Result<(), SimError> {
        let target = self.now + ticks;
        loop {
            self.drain()?;
            match self.next_due(target) {
                Some(t) => self.now = t,
                None => break,
            }
        }
        self.now = target;
        Ok(())
    }

    pub(crate) fn bind(&mut self, chan: ChannelId, binding: Binding, priority: Priority) {
        self.bindings[chan.index()] = Some(binding);
        self.bank[chan].priority = priority;
    }

    pub(crate) fn instance(&self, slot: usize) -> &Instance {
        &self.instances[slot]
    }

    pub(crate) fn instance_mut(&mut self, slot: usize) -> &mut Instance {
        &mut self.instances[slot]
    }

    pub(crate) fn add_instance(
        &mut self,
        decoder: QuadDecoder,
        channels: QdChannels,
    ) -> Option<usize> {
        if self.pram_free < QD_FRAME_BYTES {
            return None;
        }
        self.pram_free -= QD_FRAME_BYTES;
        self.instances.push(Instance { decoder, channels });
        Some(self.instances.len() - 1)
    }

    /// Serve all pending work at the current time.
    pub(crate) fn drain(&mut self) -> Result<(), SimError> {
        loop {
            self.reconcile();
            self.fire_due();
            match self.pick_serviceable() {
                Some(chan) => self.dispatch(chan)?,
                None => return Ok(()),
            }
        }
    }

    /// Refresh the sim-side schedule from the channel images: newly armed
    /// or disarmed matches, and freshly posted links.
    fn reconcile(&mut self) {
        let now = self.now;
        for chan in channel_ids() {
            let idx = chan.index();
            let (match_a, match_b, link_pending) = {
                let hw = &self.bank[chan];
                (hw.match_a, hw.match_b, hw.link_pending)
            };
            let entry = &mut self.sched[idx];
            if entry.armed_a != match_a {
                entry.armed_a = match_a;
                entry.due_a = match_a.map(|at| match_due(now, at));
            }
            if entry.armed_b != match_b {
                entry.armed_b = match_b;
                entry.due_b = match_b.map(|at| match_due(now, at));
            }
            if !link_pending {
                entry.link_due = None;
            } else if entry.link_due.is_none() {
                entry.link_due = Some(now + LINK_REDELIVERY_LATENCY);
            }
        }
    }

    /// Latch every match whose time has come. A fired match disarms its
    /// comparator; in windowed mode match A opens the window silently.
    fn fire_due(&mut self) {
        for chan in channel_ids() {
            let idx = chan.index();
            if self.sched[idx].due_a.is_some_and(|t| t <= self.now) {
                let at = self.sched[idx].armed_a.unwrap_or_default();
                let hw = &mut self.bank[chan];
                hw.match_a_latch = true;
                if hw.service_mode != ServiceMode::Windowed {
                    hw.capture = at;
                }
                hw.match_a = None;
                self.sched[idx].armed_a = None;
                self.sched[idx].due_a = None;
            }
            if self.sched[idx].due_b.is_some_and(|t| t <= self.now) {
                let hw = &mut self.bank[chan];
                hw.match_b_latch = true;
                hw.match_b = None;
                self.sched[idx].armed_b = None;
                self.sched[idx].due_b = None;
            }
        }
    }

    /// Highest-priority channel with pending work, lower channel numbers
    /// first within a priority level.
    fn pick_serviceable(&self) -> Option<ChannelId> {
        let mut best: Option<(Priority, ChannelId)> = None;
        for chan in channel_ids() {
            let hw = &self.bank[chan];
            if hw.priority == Priority::Disabled {
                continue;
            }
            let link_ready = hw.link_pending
                && self.sched[chan.index()]
                    .link_due
                    .is_some_and(|t| t <= self.now);
            let event_ready = hw.enabled
                && (hw.transition_latch
                    || hw.match_b_latch
                    || (hw.match_a_latch && hw.service_mode != ServiceMode::Windowed)
                    || link_ready);
            if hw.request.is_some() || event_ready {
                let better = match best {
                    None => true,
                    Some((priority, _)) => hw.priority > priority,
                };
                if better {
                    best = Some((hw.priority, chan));
                }
            }
        }
        best.map(|(_, chan)| chan)
    }

    fn dispatch(&mut self, chan: ChannelId) -> Result<(), SimError> {
        let idx = chan.index();
        // a matured link slot is consumed by this service; a re-post gets a
        // fresh redelivery latency
        if self.sched[idx].link_due.is_some_and(|t| t <= self.now) {
            self.sched[idx].link_due = None;
        }
        let Some(binding) = self.bindings[idx] else {
            return Err(SimError::UnexpectedEvent(chan));
        };
        let capture = self.bank[chan].capture;
        let mut ctx = EventContext::new(chan, self.now24(), capture);
        let slot = match binding {
            Binding::Phase(slot) | Binding::Home(slot) | Binding::Index(slot) => slot,
        };
        let decoder = &mut self.instances[slot].decoder;
        let bank = &mut self.bank;
        let result = match binding {
            Binding::Phase(_) => decoder.service_phase(&mut ctx, bank),
            Binding::Home(_) => decoder.service_home(&mut ctx, bank),
            Binding::Index(_) => decoder.service_index(&mut ctx, bank),
        };
        result.map_err(|e| SimError::UnexpectedEvent(e.chan))
    }

    /// Earliest schedule entry in `(now, target]`.
    fn next_due(&self, target: u64) -> Option<u64> {
        let mut next: Option<u64> = None;
        for chan in channel_ids() {
            let entry = &self.sched[chan.index()];
            for t in [entry.due_a, entry.due_b, entry.link_due].into_iter().flatten() {
                if t > self.now && t <= target {
                    next = Some(next.map_or(t, |n| n.min(t)));
                }
            }
        }
        next
    }
}
