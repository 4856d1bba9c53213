//! Fuzz target: `LineAssembler::push`
//!
//! Feeds arbitrary bytes, split at an arbitrary point, and checks every
//! delivered line: non-empty, printable ASCII, no CR/LF, within LINE_MAX.
//!
//! cargo fuzz run fuzz_line_assembler

#![no_main]

use heapless::String;
use libfuzzer_sys::fuzz_target;
use sensornode::adapters::line::LineAssembler;
use sensornode::adapters::time::ManualClock;
use sensornode::config::LINE_MAX;
use sensornode::fsm::{Context, Engine, EventId, StateDescriptor, StateId, Transition};

type Line = String<LINE_MAX>;

fn check(_cx: &mut Context<'_, (), Line>, event: EventId, payload: Option<Line>) -> Transition {
    if event == EventId(0) {
        let line = payload.expect("line event without payload");
        assert!(!line.is_empty());
        assert!(line.len() <= LINE_MAX);
        assert!(line.bytes().all(|b| b.is_ascii_graphic() || b == b' '));
    }
    Transition::Stay
}

static TABLE: [StateDescriptor<(), Line>; 1] = [StateDescriptor {
    id: StateId(0),
    name: "CHECK",
    handler: check,
}];

fuzz_target!(|data: &[u8]| {
    let mut engine: Engine<Line, ManualClock> = Engine::new(ManualClock::new());
    let h = engine.create("check", &TABLE, StateId(0), ());
    let mut rx = LineAssembler::new(engine.sender(), h, EventId(0));

    let split = data.first().map_or(0, |&b| usize::from(b)).min(data.len());
    let (a, b) = data.split_at(split);
    rx.push(a);
    engine.run_once();
    rx.push(b);
    engine.run_once();
});
