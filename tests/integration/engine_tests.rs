//! Dispatcher, timer and registry behaviour observed through recording
//! machines.

use sensornode::config::{EVENT_QUEUE_CAP, MAX_MACHINES};
use sensornode::fsm::{EventId, StateDescriptor, Transition};

use crate::recorder::{A, ARM, ARM_TICK, B, BAD, BOUNCE, GO, NOP, Rec, Rig, TICK};

// ── Transition protocol ───────────────────────────────────────

#[test]
fn start_delivers_enter_to_initial_state() {
    let mut r = Rig::new();
    let m = r.machine("m", 0);
    assert!(r.engine.start(m));
    assert_eq!(r.engine.run_once(), 1);
    assert_eq!(r.take(), [("m", "A", EventId::ENTER)]);
}

#[test]
fn transition_runs_exit_then_enter() {
    let mut r = Rig::new();
    let m = r.machine("m", 0);
    r.send(m, GO);
    r.engine.run_once();

    // B's ENTER asks for A; the request is ignored.
    assert_eq!(
        r.take(),
        [("m", "A", GO), ("m", "A", EventId::EXIT), ("m", "B", EventId::ENTER)]
    );
    assert_eq!(r.engine.current_state(m), B);
    assert_eq!(r.engine.stats().transitions, 1);
}

#[test]
fn queued_enter_and_exit_never_transition() {
    let mut r = Rig::new();
    let m = r.machine("m", 0);
    r.send(m, GO);
    r.engine.run_once();
    r.take();

    r.send(m, EventId::ENTER);
    r.send(m, EventId::EXIT);
    r.engine.run_once();
    assert_eq!(r.engine.current_state(m), B);
    assert_eq!(r.take().len(), 2);
}

#[test]
fn stay_is_idempotent() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.send(m, ARM);
    r.engine.run_once();
    let deadline = r.engine.next_deadline();

    for _ in 0..3 {
        r.send(m, NOP);
    }
    r.engine.run_once();

    assert_eq!(r.engine.current_state(m), A);
    assert_eq!(r.engine.next_deadline(), deadline);
    let log = r.take();
    assert!(log.iter().all(|(_, _, ev)| *ev == ARM || *ev == NOP));
    assert_eq!(r.engine.stats().transitions, 0);
}

#[test]
#[should_panic(expected = "transition to unknown state")]
fn unknown_target_state_is_fatal() {
    let mut r = Rig::new();
    let m = r.machine("m", 0);
    r.send(m, BAD);
    r.engine.run_once();
}

// ── Ordering ──────────────────────────────────────────────────

#[test]
fn delivery_is_globally_fifo() {
    let mut r = Rig::new();
    let m1 = r.machine("m1", 0);
    let m2 = r.machine("m2", 0);
    r.send(m1, NOP);
    r.send(m2, NOP);
    r.send(m1, GO);
    r.send(m2, NOP);
    r.engine.run_once();

    assert_eq!(
        r.take(),
        [
            ("m1", "A", NOP),
            ("m2", "A", NOP),
            ("m1", "A", GO),
            ("m1", "A", EventId::EXIT),
            ("m1", "B", EventId::ENTER),
            ("m2", "A", NOP),
        ]
    );
}

#[test]
fn handler_sends_land_behind_queued_events() {
    let mut r = Rig::new();
    let m1 = r.machine("m1", 0);
    let m2 = r.machine("m2", 0);
    r.send(m1, BOUNCE);
    r.send(m2, NOP);
    assert_eq!(r.engine.run_once(), 3);
    assert_eq!(
        r.take(),
        [("m1", "A", BOUNCE), ("m2", "A", NOP), ("m1", "A", NOP)]
    );
}

// ── Default timer ─────────────────────────────────────────────

#[test]
fn default_timer_fires_timeout() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.send(m, ARM);
    r.engine.run_once();

    r.clock.set(99);
    r.engine.run_once();
    assert_eq!(r.engine.current_state(m), A);

    r.clock.set(100);
    r.engine.run_once();
    assert_eq!(r.engine.current_state(m), B);
    assert_eq!(r.engine.stats().timers_fired, 1);
}

#[test]
fn transition_cancels_default_timer() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.send(m, ARM);
    r.send(m, GO);
    r.engine.run_once();
    assert_eq!(r.engine.next_deadline(), None);

    r.clock.set(500);
    r.engine.run_once();
    assert!(!r.take().iter().any(|(_, _, ev)| *ev == EventId::TIMEOUT));
}

#[test]
fn transition_drops_already_fired_timeout() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.send(m, ARM);
    r.engine.run_once();
    r.take();

    // GO is ahead of the TIMEOUT in the queue; its transition must
    // tombstone the TIMEOUT before it reaches B.
    r.send(m, GO);
    r.clock.set(100);
    assert_eq!(r.engine.poll_timers(), 1);
    r.engine.dispatch_pending();

    assert_eq!(
        r.take(),
        [("m", "A", GO), ("m", "A", EventId::EXIT), ("m", "B", EventId::ENTER)]
    );
}

#[test]
fn explicit_stop_default_drops_queued_timeout() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.engine.timer_start_default(m, 100);
    r.clock.set(100);
    r.engine.poll_timers();
    r.engine.timer_stop_default(m);
    r.engine.dispatch_pending();
    assert_eq!(r.engine.current_state(m), A);
    assert!(r.take().is_empty());
}

#[test]
fn rearming_default_timer_drops_fired_timeout() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.send(m, ARM);
    r.engine.run_once();
    r.take();

    r.clock.set(100);
    assert_eq!(r.engine.poll_timers(), 1);
    r.engine.timer_start_default(m, 100);
    r.engine.dispatch_pending();
    assert!(r.take().is_empty());
    assert_eq!(r.engine.current_state(m), A);

    r.clock.set(199);
    r.engine.run_once();
    assert_eq!(r.engine.current_state(m), A);

    r.clock.set(200);
    r.engine.run_once();
    assert_eq!(r.engine.current_state(m), B);
    assert_eq!(
        r.take().iter().filter(|(_, _, ev)| *ev == EventId::TIMEOUT).count(),
        1
    );
}

#[test]
fn handler_rearm_drops_timeout_queued_behind_it() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.send(m, ARM);
    r.engine.run_once();
    r.take();

    // ARM is ahead of the fired TIMEOUT; its re-arm must drop it.
    r.send(m, ARM);
    r.clock.set(100);
    assert_eq!(r.engine.poll_timers(), 1);
    r.engine.dispatch_pending();
    assert_eq!(r.take(), [("m", "A", ARM)]);
    assert_eq!(r.engine.next_deadline(), Some(200));
}

// ── Named timers ──────────────────────────────────────────────

#[test]
fn named_timer_survives_transition() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.send(m, ARM_TICK);
    r.send(m, GO);
    r.engine.run_once();
    r.take();

    r.clock.set(100);
    r.engine.run_once();
    assert_eq!(r.take(), [("m", "B", TICK)]);
}

#[test]
fn named_timer_rearm_uses_second_deadline() {
    let mut r = Rig::new();
    let m = r.machine("m", 100);
    r.send(m, ARM_TICK);
    r.engine.run_once();

    r.clock.set(50);
    r.send(m, ARM_TICK);
    r.engine.run_once();
    r.take();

    r.clock.set(100);
    r.engine.run_once();
    assert!(r.take().is_empty());

    r.clock.set(150);
    r.engine.run_once();
    assert_eq!(r.take(), [("m", "A", TICK)]);
}

#[test]
fn stopping_named_timer_tombstones_fired_event() {
    let mut r = Rig::new();
    let m = r.machine("m", 50);
    r.engine.timer_start_named(m, 50, TICK);
    r.send(m, NOP);

    r.clock.set(50);
    assert_eq!(r.engine.poll_timers(), 1);
    assert_eq!(r.engine.queue().live_len(), 2);

    // Already fired, so no longer armed, but the queued TICK goes.
    assert!(!r.engine.timer_stop_named(m, TICK));
    assert_eq!(r.engine.queue().live_len(), 1);

    r.engine.dispatch_pending();
    assert_eq!(r.take(), [("m", "A", NOP)]);
}

#[test]
fn expired_timers_fire_in_deadline_order() {
    let mut r = Rig::new();
    let m1 = r.machine("m1", 30);
    let m2 = r.machine("m2", 20);
    r.send(m1, ARM_TICK);
    r.send(m2, ARM);
    r.send(m1, ARM);
    r.engine.run_once();
    r.take();

    r.clock.set(30);
    assert_eq!(r.engine.poll_timers(), 3);
    r.engine.dispatch_pending();
    assert_eq!(
        r.take(),
        [
            ("m2", "A", EventId::TIMEOUT),
            ("m2", "A", EventId::EXIT),
            ("m2", "B", EventId::ENTER),
            ("m1", "A", TICK),
            ("m1", "A", EventId::TIMEOUT),
            ("m1", "A", EventId::EXIT),
            ("m1", "B", EventId::ENTER),
        ]
    );
}

// ── Queue capacity ────────────────────────────────────────────

#[test]
fn full_queue_rejects_without_losing_events() {
    let mut r = Rig::new();
    let m = r.machine("m", 0);
    for _ in 0..EVENT_QUEUE_CAP {
        r.send(m, NOP);
    }
    assert!(!r.engine.send_event(m, GO, None));
    assert_eq!(r.engine.stats().rejected, 1);

    assert_eq!(r.engine.run_once(), EVENT_QUEUE_CAP);
    assert_eq!(r.engine.current_state(m), A);
    assert!(r.engine.send_event(m, GO, None));
}

// ── Registry ──────────────────────────────────────────────────

#[test]
fn destroy_drops_pending_events_and_frees_slot() {
    let mut r = Rig::new();
    let old = r.machine("old", 100);
    r.send(old, NOP);
    r.engine.timer_start_named(old, 10, TICK);
    r.engine.destroy(old);
    assert_eq!(r.engine.machines(), 0);

    let new = r.machine("new", 0);
    assert_eq!(new.index(), old.index());
    assert_ne!(new, old);

    r.clock.set(10);
    assert_eq!(r.engine.run_once(), 0);
    assert!(r.take().is_empty());
    assert_eq!(r.engine.stats().stale_dropped, 0);
}

#[test]
#[should_panic(expected = "stale machine handle")]
fn stale_handle_is_fatal() {
    let mut r = Rig::new();
    let m = r.machine("m", 0);
    r.engine.destroy(m);
    let _ = r.engine.current_state(m);
}

#[test]
fn stale_queued_event_is_skipped() {
    let mut r = Rig::new();
    let m = r.machine("m", 0);
    r.engine.destroy(m);
    // Producers holding an old handle can still enqueue.
    assert!(r.engine.sender().send(m, NOP, None));
    assert_eq!(r.engine.run_once(), 0);
    assert_eq!(r.engine.stats().stale_dropped, 1);
}

#[test]
#[should_panic(expected = "machine table full")]
fn registry_capacity_is_enforced() {
    let mut r = Rig::new();
    for _ in 0..=MAX_MACHINES {
        r.machine("m", 0);
    }
}

fn noop(_cx: &mut sensornode::fsm::Context<'_, Rec, u32>, _e: EventId, _p: Option<u32>) -> Transition {
    Transition::Stay
}

static DUPLICATE: [StateDescriptor<Rec, u32>; 2] = [
    StateDescriptor {
        id: A,
        name: "A",
        handler: noop,
    },
    StateDescriptor {
        id: A,
        name: "A2",
        handler: noop,
    },
];

#[test]
#[should_panic(expected = "duplicate state")]
fn duplicate_state_ids_are_rejected() {
    let r = Rig::new();
    let mut engine = r.engine;
    let rec = Rec {
        log: r.log,
        timer_ms: 0,
    };
    engine.create("dup", &DUPLICATE, A, rec);
}

#[test]
#[should_panic(expected = "not in table")]
fn missing_initial_state_is_rejected() {
    let mut r = Rig::new();
    let rec = Rec {
        log: r.log.clone(),
        timer_ms: 0,
    };
    r.engine.create("m", &crate::recorder::TABLE, sensornode::fsm::StateId(9), rec);
}
