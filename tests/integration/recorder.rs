//! Recording test machine.
//!
//! Two states, `A` and `B`, whose handlers append `(machine, state, event)`
//! to a log shared by every instance, so tests can assert on the global
//! delivery order.  Each user event triggers one engine behaviour.

use std::sync::{Arc, Mutex};

use sensornode::adapters::time::ManualClock;
use sensornode::fsm::{Context, Engine, EventId, MachineHandle, StateDescriptor, StateId, Transition};

pub const A: StateId = StateId(0);
pub const B: StateId = StateId(1);

/// Toggle between A and B.
pub const GO: EventId = EventId(1);
/// Stay, nothing else.
pub const NOP: EventId = EventId(2);
/// Arm the default timer for `Rec::timer_ms`.
pub const ARM: EventId = EventId(3);
/// Named-timer event.
pub const TICK: EventId = EventId(4);
/// Arm the named TICK timer for `Rec::timer_ms`.
pub const ARM_TICK: EventId = EventId(5);
/// Queue NOP for self, then stay.
pub const BOUNCE: EventId = EventId(6);
/// Ask for a state that is not in the table.
pub const BAD: EventId = EventId(7);

pub type Entry = (&'static str, &'static str, EventId);
pub type Log = Arc<Mutex<Vec<Entry>>>;

pub struct Rec {
    pub log: Log,
    pub timer_ms: u32,
}

type Cx<'a> = Context<'a, Rec, u32>;

fn record(cx: &Cx<'_>, event: EventId) {
    cx.log
        .lock()
        .unwrap()
        .push((cx.machine_name(), cx.state_name(), event));
}

fn common(cx: &mut Cx<'_>, event: EventId) -> Transition {
    match event {
        ARM => {
            let ms = cx.timer_ms;
            cx.start_timer(ms);
        }
        ARM_TICK => {
            let ms = cx.timer_ms;
            cx.start_named_timer(ms, TICK);
        }
        BOUNCE => {
            cx.send(NOP, None);
        }
        BAD => return Transition::To(StateId(99)),
        _ => {}
    }
    Transition::Stay
}

fn state_a(cx: &mut Cx<'_>, event: EventId, _payload: Option<u32>) -> Transition {
    record(cx, event);
    match event {
        GO | EventId::TIMEOUT => Transition::To(B),
        _ => common(cx, event),
    }
}

fn state_b(cx: &mut Cx<'_>, event: EventId, _payload: Option<u32>) -> Transition {
    record(cx, event);
    match event {
        GO => Transition::To(A),
        // Must be ignored by the dispatcher.
        EventId::ENTER | EventId::EXIT => Transition::To(A),
        _ => common(cx, event),
    }
}

pub static TABLE: [StateDescriptor<Rec, u32>; 2] = [
    StateDescriptor {
        id: A,
        name: "A",
        handler: state_a,
    },
    StateDescriptor {
        id: B,
        name: "B",
        handler: state_b,
    },
];

pub struct Rig {
    pub engine: Engine<u32, ManualClock>,
    pub clock: ManualClock,
    pub log: Log,
}

impl Rig {
    pub fn new() -> Self {
        let clock = ManualClock::new();
        Self {
            engine: Engine::new(clock.clone()),
            clock,
            log: Arc::default(),
        }
    }

    /// Create a recorder parked in A, without starting it.
    pub fn machine(&mut self, name: &'static str, timer_ms: u32) -> MachineHandle {
        let rec = Rec {
            log: Arc::clone(&self.log),
            timer_ms,
        };
        self.engine.create(name, &TABLE, A, rec)
    }

    pub fn send(&self, h: MachineHandle, event: EventId) {
        assert!(self.engine.send_event(h, event, None), "queue full");
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Entry> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}
