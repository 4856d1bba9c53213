//! Per-machine timers: one default timer plus a fixed pool of named timers.
//!
//! ```text
//!  MachineTimers
//!  ┌──────────────────────────┐
//!  │ default: Option<deadline>│ ─ fires TIMEOUT, stopped by every transition
//!  ├──────────────────────────┤
//!  │ named[0]: (event, dl)    │ ─ fires `event`, survives transitions
//!  │ named[1]: free           │
//!  │ ...                      │
//!  └──────────────────────────┘
//! ```
//!
//! Deadlines are absolute milliseconds on the engine's [`Clock`].  Timers
//! never enqueue on their own: the engine polls them from the dispatch
//! context and turns expired entries into queue insertions, so a handler
//! can always stop a timer without racing a concurrent firing.  Stopping
//! or re-arming a timer also tombstones an instance that already fired but
//! has not been delivered yet.
//!
//! [`Clock`]: crate::app::ports::Clock

use heapless::Vec;

use super::queue::EventQueue;
use super::{EventId, MachineHandle};
use crate::config::{MAX_MACHINES, NAMED_TIMERS_PER_MACHINE};
use crate::error::{EngineFault, raise};

/// Upper bound on timers that can expire in a single poll.
pub const MAX_EXPIRED: usize = MAX_MACHINES * (NAMED_TIMERS_PER_MACHINE + 1);

/// A live named timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedTimer {
    pub event: EventId,
    pub deadline: u64,
}

/// Which timer of a machine expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSlot {
    Named(usize),
    Default,
}

/// An expired timer waiting to be turned into a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub deadline: u64,
    pub machine: MachineHandle,
    pub event: EventId,
    pub slot: TimerSlot,
}

impl Expired {
    /// Firing order: earliest deadline first; on a tie named timers go
    /// before the default timer, then by machine slot and pool slot.
    pub fn order_key(&self) -> (u64, u8, usize, usize) {
        let (rank, slot) = match self.slot {
            TimerSlot::Named(i) => (0, i),
            TimerSlot::Default => (1, 0),
        };
        (self.deadline, rank, self.machine.index(), slot)
    }
}

/// Timer state owned by one machine instance.
#[derive(Debug, Default)]
pub struct MachineTimers {
    default: Option<u64>,
    named: [Option<NamedTimer>; NAMED_TIMERS_PER_MACHINE],
}

impl MachineTimers {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Default timer ─────────────────────────────────────────

    /// Arm or re-arm the default timer.  A TIMEOUT from the previous arming
    /// that is still queued for `machine` is dropped first.
    pub fn start_default<P>(
        &mut self,
        machine: MachineHandle,
        deadline: u64,
        queue: &EventQueue<P>,
    ) {
        self.stop_default(machine, queue);
        self.default = Some(deadline);
    }

    /// Disarm the default timer and tombstone a queued TIMEOUT for `machine`.
    /// Returns `true` if anything was armed or queued.
    pub fn stop_default<P>(&mut self, machine: MachineHandle, queue: &EventQueue<P>) -> bool {
        let was_armed = self.default.take().is_some();
        let dropped =
            queue.invalidate(|e| e.machine == machine && e.event == EventId::TIMEOUT);
        was_armed || dropped > 0
    }

    pub fn default_deadline(&self) -> Option<u64> {
        self.default
    }

    // ── Named timers ──────────────────────────────────────────

    /// Arm the named timer for `event`.
    ///
    /// An existing timer for the same event is stopped first (including any
    /// queued instance), so only the newest deadline is ever delivered.
    /// Raises [`EngineFault::NamedTimerPoolExhausted`] when every slot is
    /// taken.
    pub fn start_named<P>(
        &mut self,
        owner: &'static str,
        machine: MachineHandle,
        event: EventId,
        deadline: u64,
        queue: &EventQueue<P>,
    ) {
        debug_assert!(!event.is_reserved(), "named timer on reserved event {event}");
        self.stop_named(machine, event, queue);

        let Some(slot) = self.named.iter_mut().find(|s| s.is_none()) else {
            raise(EngineFault::NamedTimerPoolExhausted {
                machine: owner,
                event,
            });
        };
        *slot = Some(NamedTimer { event, deadline });
    }

    /// Disarm the named timer for `event` and tombstone any queued
    /// `(machine, event)` entry.  Returns `true` if a timer was armed.
    pub fn stop_named<P>(
        &mut self,
        machine: MachineHandle,
        event: EventId,
        queue: &EventQueue<P>,
    ) -> bool {
        let mut was_armed = false;
        for slot in &mut self.named {
            if slot.is_some_and(|t| t.event == event) {
                *slot = None;
                was_armed = true;
            }
        }
        queue.invalidate(|e| e.machine == machine && e.event == event);
        was_armed
    }

    pub fn named_deadline(&self, event: EventId) -> Option<u64> {
        self.named
            .iter()
            .flatten()
            .find(|t| t.event == event)
            .map(|t| t.deadline)
    }

    /// Number of armed named timers.
    pub fn named_armed(&self) -> usize {
        self.named.iter().flatten().count()
    }

    // ── Polling ───────────────────────────────────────────────

    /// Earliest armed deadline of any kind.
    pub fn next_deadline(&self) -> Option<u64> {
        self.named
            .iter()
            .flatten()
            .map(|t| t.deadline)
            .chain(self.default)
            .min()
    }

    /// Append every timer with `deadline <= now` to `out`.  Does not disarm;
    /// the engine calls [`disarm`](Self::disarm) once the event is queued.
    pub fn collect_expired(
        &self,
        now: u64,
        machine: MachineHandle,
        out: &mut Vec<Expired, MAX_EXPIRED>,
    ) {
        for (i, timer) in self.named.iter().enumerate() {
            if let Some(t) = timer.filter(|t| t.deadline <= now) {
                // Capacity covers every timer of every machine.
                let _ = out.push(Expired {
                    deadline: t.deadline,
                    machine,
                    event: t.event,
                    slot: TimerSlot::Named(i),
                });
            }
        }
        if let Some(deadline) = self.default.filter(|d| *d <= now) {
            let _ = out.push(Expired {
                deadline,
                machine,
                event: EventId::TIMEOUT,
                slot: TimerSlot::Default,
            });
        }
    }

    /// Free the slot of a timer whose expiry has been queued.
    pub fn disarm(&mut self, slot: TimerSlot) {
        match slot {
            TimerSlot::Named(i) => self.named[i] = None,
            TimerSlot::Default => self.default = None,
        }
    }
}
