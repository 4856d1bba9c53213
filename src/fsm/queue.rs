//! Global pending-event queue.
//!
//! Fixed-capacity ring of optional slots shared by every machine:
//!
//! ```text
//!   head                                   tail
//!    ▼                                      ▼
//!  ┌──────┬──────┬──────┬──────┬──────┬──────┬─ ─ ─┐
//!  │ A/ev │ None │ B/ev │ A/ev │ None │ C/ev │     │
//!  └──────┴──────┴──────┴──────┴──────┴──────┴─ ─ ─┘
//!           ▲ tombstone: skipped on pop, position kept
//! ```
//!
//! Producers may run on any thread (timer callbacks, UART reader, ISR-like
//! contexts), so enqueue goes through a critical-section mutex.  Pop and
//! invalidate are only called from the single dispatch context.  A
//! successful enqueue raises the wake [`Signal`]; raising it twice before
//! the dispatcher runs is the same as raising it once.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::{Deque, Vec};
use log::warn;

use super::{EventId, MachineHandle};
use crate::config::EVENT_QUEUE_CAP;

/// One queued delivery.
#[derive(Debug)]
pub struct PendingEvent<P> {
    pub machine: MachineHandle,
    pub event: EventId,
    pub payload: Option<P>,
}

type Slots<P> = Deque<Option<PendingEvent<P>>, EVENT_QUEUE_CAP>;

/// Bounded multi-producer / single-consumer event queue.
pub struct EventQueue<P> {
    slots: Mutex<CriticalSectionRawMutex, RefCell<Slots<P>>>,
    wake: Signal<CriticalSectionRawMutex, ()>,
    rejected: AtomicU32,
}

impl<P> Default for EventQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EventQueue<P> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(RefCell::new(Deque::new())),
            wake: Signal::new(),
            rejected: AtomicU32::new(0),
        }
    }

    /// Append an event at the tail.
    ///
    /// Returns `false` (and drops `payload`) if every slot is occupied.
    /// Never blocks.
    pub fn enqueue(&self, machine: MachineHandle, event: EventId, payload: Option<P>) -> bool {
        let entry = PendingEvent {
            machine,
            event,
            payload,
        };
        let pushed = self
            .slots
            .lock(|slots| slots.borrow_mut().push_back(Some(entry)).is_ok());

        if pushed {
            self.wake.signal(());
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                "EventQueue full: rejected event {} for machine {}",
                event,
                machine.index()
            );
        }
        pushed
    }

    /// Take the oldest live entry, discarding tombstones in front of it.
    pub fn pop(&self) -> Option<PendingEvent<P>> {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            while let Some(slot) = slots.pop_front() {
                if slot.is_some() {
                    return slot;
                }
            }
            None
        })
    }

    /// Tombstone every pending entry matching `predicate`.
    ///
    /// Survivors keep their positions and relative order.  Returns the
    /// number of entries tombstoned.
    pub fn invalidate(&self, mut predicate: impl FnMut(&PendingEvent<P>) -> bool) -> usize {
        self.slots.lock(|slots| {
            let mut tombstoned = 0;
            for slot in slots.borrow_mut().iter_mut() {
                if slot.as_ref().is_some_and(|e| predicate(e)) {
                    *slot = None;
                    tombstoned += 1;
                }
            }
            tombstoned
        })
    }

    /// Occupied slots, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.lock(|slots| slots.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.lock(|slots| slots.borrow().is_full())
    }

    /// Entries that will still be delivered.
    pub fn live_len(&self) -> usize {
        self.slots
            .lock(|slots| slots.borrow().iter().filter(|s| s.is_some()).count())
    }

    /// `(machine, event)` of every live entry, head to tail.
    pub fn pending(&self) -> Vec<(MachineHandle, EventId), EVENT_QUEUE_CAP> {
        self.slots.lock(|slots| {
            slots
                .borrow()
                .iter()
                .flatten()
                .map(|e| (e.machine, e.event))
                .collect()
        })
    }

    /// Number of enqueue attempts rejected because the queue was full.
    pub fn rejected(&self) -> u32 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Resolve once an enqueue has happened since the last wait.
    pub async fn wait(&self) {
        self.wake.wait().await;
    }

    /// Whether a wake is pending (consumes nothing).
    pub fn wake_pending(&self) -> bool {
        self.wake.signaled()
    }
}

// ---------------------------------------------------------------------------
// Cross-thread producer handle
// ---------------------------------------------------------------------------

/// Cloneable handle for producing events from outside the dispatch context.
///
/// `Send + Sync` whenever the payload type is `Send`, so it can be moved
/// into reader threads and timer callbacks.
pub struct EventSender<P> {
    queue: Arc<EventQueue<P>>,
}

impl<P> Clone for EventSender<P> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<P> EventSender<P> {
    pub(crate) fn new(queue: Arc<EventQueue<P>>) -> Self {
        Self { queue }
    }

    /// Queue an event.  `false` only when the queue is full.
    pub fn send(&self, machine: MachineHandle, event: EventId, payload: Option<P>) -> bool {
        self.queue.enqueue(machine, event, payload)
    }
}
