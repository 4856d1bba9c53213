//! Event-driven finite state machine engine.
//!
//! Classic embedded FSM pattern ported to Rust, extended from a single
//! ticked machine to many machines sharing one event queue:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Producers: app code · timers · ISR callbacks · handlers         │
//! └──────────────┬───────────────────────────────────────────────────┘
//!                │ send_event(machine, event, payload)
//!                ▼
//! ┌──────────────────────────────┐   poll_timers()  ┌──────────────┐
//! │ EventQueue (global FIFO,     │◀─────────────────│ MachineTimers│
//! │ fixed ring, tombstones)      │                  │ default+named│
//! └──────────────┬───────────────┘                  └──────────────┘
//!                │ pop (single consumer)
//!                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Dispatcher: table[current].handler(cx, event, payload)          │
//! │   Stay      → done                                               │
//! │   To(next)  → stop default timer → EXIT(old) → ENTER(next)       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each machine owns a `&'static` table of [`StateDescriptor`]s, one plain
//! `fn` pointer per state.  The same handler receives user events and the
//! reserved [`EventId::ENTER`] / [`EventId::EXIT`] / [`EventId::TIMEOUT`]
//! events.  Handlers never call each other; they enqueue follow-up events
//! through their [`Context`], which also owns the machine's timer API.

pub mod engine;
pub mod queue;
pub mod registry;
pub mod timers;

use core::fmt;
use core::ops::{Deref, DerefMut};

use log::debug;

use crate::app::ports::Clock;
use queue::EventQueue;
use timers::MachineTimers;

pub use engine::{Engine, EngineStats};
pub use queue::{EventSender, PendingEvent};

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// State identity, unique within one machine's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u8);

/// Event identity.
///
/// User events are numbered from 0 up to [`EventId::USER_MAX`]; the engine's
/// reserved events sit above that ceiling so user enums never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u16);

impl EventId {
    /// Highest id available to user event enums.
    pub const USER_MAX: u16 = 0xFEFF;

    /// Delivered to a state when it becomes current.
    pub const ENTER: Self = Self(0xFF00);
    /// Delivered to a state when it stops being current.
    pub const EXIT: Self = Self(0xFF01);
    /// Delivered when the machine's default timer expires.
    pub const TIMEOUT: Self = Self(0xFF02);

    /// True for ENTER, EXIT, TIMEOUT and any other id above `USER_MAX`.
    pub const fn is_reserved(self) -> bool {
        self.0 > Self::USER_MAX
    }

    /// True for ENTER and EXIT, whose handler result is always ignored.
    pub const fn is_lifecycle(self) -> bool {
        self.0 == Self::ENTER.0 || self.0 == Self::EXIT.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ENTER => write!(f, "ENTER"),
            Self::EXIT => write!(f, "EXIT"),
            Self::TIMEOUT => write!(f, "TIMEOUT"),
            Self(n) => write!(f, "#{n}"),
        }
    }
}

/// Opaque reference to a machine in an [`Engine`].
///
/// Carries the registry slot and that slot's generation, so a handle kept
/// after [`Engine::destroy`] never addresses a machine created later in the
/// same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MachineHandle {
    index: u8,
    generation: u16,
}

impl MachineHandle {
    pub(crate) const fn new(index: usize, generation: u16) -> Self {
        Self {
            index: index as u8,
            generation,
        }
    }

    /// Registry slot index.
    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub const fn generation(self) -> u16 {
        self.generation
    }
}

// ---------------------------------------------------------------------------
// Handler result and table rows
// ---------------------------------------------------------------------------

/// What a handler asks the dispatcher to do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Remain in the current state; nothing else happens.
    Stay,
    /// Run the transition protocol into the given state.
    To(StateId),
}

/// Signature of a state handler.
///
/// `payload` is `None` for ENTER, EXIT, TIMEOUT and named-timer events.
pub type StateHandlerFn<C, P> = fn(&mut Context<'_, C, P>, EventId, Option<P>) -> Transition;

/// One row of a machine's state table.
pub struct StateDescriptor<C, P> {
    pub id: StateId,
    pub name: &'static str,
    pub handler: StateHandlerFn<C, P>,
}

// ---------------------------------------------------------------------------
// Handler context
// ---------------------------------------------------------------------------

/// Everything a handler may touch while it runs.
///
/// Dereferences to the machine's user context `C`.  Timer and send
/// operations act on the machine that is currently handling the event.
pub struct Context<'a, C, P> {
    data: &'a mut C,
    machine: MachineHandle,
    name: &'static str,
    state: &'static str,
    timers: &'a mut MachineTimers,
    queue: &'a EventQueue<P>,
    clock: &'a dyn Clock,
}

impl<C, P> Deref for Context<'_, C, P> {
    type Target = C;

    fn deref(&self) -> &C {
        &*self.data
    }
}

impl<C, P> DerefMut for Context<'_, C, P> {
    fn deref_mut(&mut self) -> &mut C {
        &mut *self.data
    }
}

impl<C, P> Context<'_, C, P> {
    /// Handle of the machine being dispatched.
    pub fn machine(&self) -> MachineHandle {
        self.machine
    }

    pub fn machine_name(&self) -> &'static str {
        self.name
    }

    /// Debug name of the state whose handler is running.
    pub fn state_name(&self) -> &'static str {
        self.state
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Arm (or re-arm) this machine's default timer.
    pub fn start_timer(&mut self, ms: u32) {
        let deadline = self.clock.now_ms() + u64::from(ms);
        self.timers.start_default(self.machine, deadline, self.queue);
    }

    /// Disarm the default timer and drop a TIMEOUT that already fired.
    pub fn stop_timer(&mut self) {
        self.timers.stop_default(self.machine, self.queue);
    }

    /// Arm (or re-arm) the named timer for `event`.
    pub fn start_named_timer(&mut self, ms: u32, event: EventId) {
        let deadline = self.clock.now_ms() + u64::from(ms);
        self.timers
            .start_named(self.name, self.machine, event, deadline, self.queue);
    }

    /// Disarm the named timer for `event` and drop any queued instance.
    /// Returns `true` if a timer was armed.
    pub fn stop_named_timer(&mut self, event: EventId) -> bool {
        self.timers.stop_named(self.machine, event, self.queue)
    }

    /// Queue an event for this machine.  `false` if the queue is full.
    pub fn send(&self, event: EventId, payload: Option<P>) -> bool {
        self.queue.enqueue(self.machine, event, payload)
    }

    /// Queue an event for another machine.  `false` if the queue is full.
    pub fn send_to(&self, target: MachineHandle, event: EventId, payload: Option<P>) -> bool {
        self.queue.enqueue(target, event, payload)
    }
}

/// Default handling for an event the current state does not recognise.
///
/// Logs at debug level and stays.
pub fn log_unhandled<C, P>(cx: &Context<'_, C, P>, event: EventId) -> Transition {
    debug!(
        "{}[{}]: unhandled event {}",
        cx.machine_name(),
        cx.state_name(),
        event
    );
    Transition::Stay
}
