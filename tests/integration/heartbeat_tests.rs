//! End-to-end IDLE/ACTIVE heartbeat scenarios.

use core::time::Duration;

use sensornode::adapters::time::{ManualClock, SystemClock};
use sensornode::app::NodePayload;
use sensornode::app::heartbeat::{ACTIVATE, ACTIVE, HeartbeatCtx, IDLE, TABLE};
use sensornode::config::NodeConfig;
use sensornode::fsm::{Engine, MachineHandle};

fn heartbeat<K: sensornode::app::ports::Clock>(
    engine: &mut Engine<NodePayload, K>,
) -> MachineHandle {
    let h = engine.create(
        "heartbeat",
        &TABLE,
        IDLE,
        HeartbeatCtx::new(&NodeConfig::default()),
    );
    assert!(engine.start(h));
    assert!(engine.send_event(h, ACTIVATE, None));
    h
}

fn pings<K: sensornode::app::ports::Clock>(
    engine: &Engine<NodePayload, K>,
    h: MachineHandle,
) -> u32 {
    engine.context::<HeartbeatCtx>(h).map_or(0, |c| c.pings)
}

#[test]
fn pings_at_50_and_100_then_times_out() {
    let clock = ManualClock::new();
    let mut engine = Engine::new(clock.clone());
    let h = heartbeat(&mut engine);
    engine.run_once();
    assert_eq!(engine.current_state(h), ACTIVE);

    clock.set(50);
    engine.run_once();
    assert_eq!(pings(&engine, h), 1);
    assert_eq!(engine.current_state(h), ACTIVE);

    // PING and TIMEOUT both due at 100: PING is handled first.
    clock.set(100);
    engine.run_once();
    assert_eq!(pings(&engine, h), 2);
    assert_eq!(engine.current_state(h), IDLE);

    clock.set(1_000);
    engine.run_once();
    assert_eq!(pings(&engine, h), 2);
}

#[test]
fn without_default_timer_ping_runs_indefinitely() {
    let clock = ManualClock::new();
    let mut engine = Engine::new(clock.clone());
    let h = heartbeat(&mut engine);
    engine.run_once();
    engine.timer_stop_default(h);

    for step in 1..=20u64 {
        clock.set(step * 50);
        engine.run_once();
    }
    assert_eq!(pings(&engine, h), 20);
    assert_eq!(engine.current_state(h), ACTIVE);
}

#[test]
fn reactivation_after_timeout_opens_a_new_window() {
    let clock = ManualClock::new();
    let mut engine = Engine::new(clock.clone());
    let h = heartbeat(&mut engine);
    engine.run_once();
    clock.set(100);
    engine.run_once();
    assert_eq!(engine.current_state(h), IDLE);

    engine.send_event(h, ACTIVATE, None);
    engine.run_once();
    clock.set(150);
    engine.run_once();
    assert_eq!(pings(&engine, h), 3);
    clock.set(200);
    engine.run_once();
    assert_eq!(engine.current_state(h), IDLE);

    let ctx = engine.context::<HeartbeatCtx>(h).unwrap();
    assert_eq!(ctx.activations, 2);
    assert_eq!(ctx.pings, 4);
}

#[test]
fn activate_racing_window_timeout_extends_window() {
    let clock = ManualClock::new();
    let mut engine = Engine::new(clock.clone());
    let h = heartbeat(&mut engine);
    engine.run_once();

    // ACTIVATE is queued before the window TIMEOUT fires in the same pass.
    clock.set(100);
    engine.send_event(h, ACTIVATE, None);
    engine.run_once();
    assert_eq!(engine.current_state(h), ACTIVE);
    assert_eq!(engine.next_deadline(), Some(150));

    clock.set(200);
    engine.run_once();
    assert_eq!(engine.current_state(h), IDLE);
}

#[test]
fn async_run_loop_sleeps_until_deadlines() {
    let mut engine = Engine::new(SystemClock::new());
    let h = heartbeat(&mut engine);

    futures_lite::future::block_on(futures_lite::future::or(engine.run(), async {
        async_io_mini::Timer::after(Duration::from_millis(300)).await;
    }));

    // Real time: the re-armed PING can land just after the window closes.
    assert_eq!(engine.current_state(h), IDLE);
    assert!((1..=2).contains(&pings(&engine, h)));
}
