//! Fuzz target: arbitrary engine API sequences
//!
//! Interprets the input as a stream of (op, machine, arg) triples against
//! four machines and checks the engine's bookkeeping after every step.
//! Named-timer events stay below the pool size so no op is a config fault.
//!
//! cargo fuzz run fuzz_engine_ops

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensornode::adapters::time::ManualClock;
use sensornode::config::{EVENT_QUEUE_CAP, NAMED_TIMERS_PER_MACHINE};
use sensornode::fsm::{Context, Engine, EventId, StateDescriptor, StateId, Transition};

fn ping(_cx: &mut Context<'_, u32, ()>, event: EventId, _p: Option<()>) -> Transition {
    if event == EventId(0) {
        Transition::To(StateId(1))
    } else {
        Transition::Stay
    }
}

fn pong(cx: &mut Context<'_, u32, ()>, event: EventId, _p: Option<()>) -> Transition {
    match event {
        EventId::ENTER => {
            **cx += 1;
            cx.start_timer(10);
            Transition::Stay
        }
        EventId::TIMEOUT => Transition::To(StateId(0)),
        _ => Transition::Stay,
    }
}

static TABLE: [StateDescriptor<u32, ()>; 2] = [
    StateDescriptor {
        id: StateId(0),
        name: "PING",
        handler: ping,
    },
    StateDescriptor {
        id: StateId(1),
        name: "PONG",
        handler: pong,
    },
];

fuzz_target!(|data: &[u8]| {
    let clock = ManualClock::new();
    let mut engine: Engine<(), ManualClock> = Engine::new(clock.clone());
    let machines: Vec<_> = (0..4)
        .map(|_| engine.create("fz", &TABLE, StateId(0), 0u32))
        .collect();

    for chunk in data.chunks_exact(3) {
        let h = machines[usize::from(chunk[1] % 4)];
        let arg = chunk[2];
        let named = EventId(u16::from(arg) % NAMED_TIMERS_PER_MACHINE as u16);
        match chunk[0] % 8 {
            0 => {
                let _ = engine.send_event(h, EventId(u16::from(arg % 3)), None);
            }
            1 => engine.timer_start_default(h, u32::from(arg)),
            2 => engine.timer_stop_default(h),
            3 => engine.timer_start_named(h, u32::from(arg), named),
            4 => {
                let _ = engine.timer_stop_named(h, named);
            }
            5 => clock.advance(u64::from(arg)),
            6 => {
                engine.run_once();
            }
            _ => {
                engine.poll_timers();
            }
        }
        assert!(engine.queue().len() <= EVENT_QUEUE_CAP);
        assert!(engine.queue().live_len() <= engine.queue().len());
    }

    engine.run_once();
    assert_eq!(engine.queue().live_len(), 0);
});
