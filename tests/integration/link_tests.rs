//! Modem link over an in-memory socket, with replies fed through the line
//! assembler the way the UART reader does it.

use sensornode::adapters::line::LineAssembler;
use sensornode::adapters::mem_socket::MemSocket;
use sensornode::adapters::time::ManualClock;
use sensornode::app::NodePayload;
use sensornode::app::heartbeat::{self, HeartbeatCtx};
use sensornode::app::ports::LineSocket;
use sensornode::app::link::{self, CLOSED, FAILED, LinkCtx, PROBING, READY};
use sensornode::config::NodeConfig;
use sensornode::fsm::{Engine, MachineHandle};

struct Node {
    engine: Engine<NodePayload, ManualClock>,
    clock: ManualClock,
    socket: MemSocket,
    link: MachineHandle,
    rx: LineAssembler<NodePayload>,
}

fn node(config: &NodeConfig) -> Node {
    let clock = ManualClock::new();
    let socket = MemSocket::with_devices(&["uart1"]);
    let mut engine = Engine::new(clock.clone());
    let link = engine.create(
        "link",
        &link::TABLE,
        CLOSED,
        LinkCtx::new(Box::new(socket.clone()), config),
    );
    let rx = LineAssembler::new(engine.sender(), link, link::LINE);
    assert!(engine.start(link));
    engine.run_once();
    Node {
        engine,
        clock,
        socket,
        link,
        rx,
    }
}

#[test]
fn modem_reply_split_across_reads_brings_link_up() {
    let mut n = node(&NodeConfig::default());
    n.engine.send_event(n.link, link::OPEN, None);
    n.engine.run_once();
    assert_eq!(n.engine.current_state(n.link), PROBING);

    assert_eq!(n.rx.push(b"AT\r"), 0);
    assert_eq!(n.rx.push(b"\n\r\nO"), 1);
    n.engine.run_once();
    assert_eq!(n.engine.current_state(n.link), PROBING);

    assert_eq!(n.rx.push(b"K\r\n"), 1);
    n.engine.run_once();
    assert_eq!(n.engine.current_state(n.link), READY);
}

#[test]
fn retries_then_recovers_before_last_probe_expires() {
    let mut n = node(&NodeConfig::default());
    n.engine.send_event(n.link, link::OPEN, None);
    n.engine.run_once();

    n.clock.set(500);
    n.engine.run_once();
    assert_eq!(n.socket.written(), ["AT", "AT"]);

    n.rx.push(b"OK\r\n");
    n.engine.run_once();
    assert_eq!(n.engine.current_state(n.link), READY);

    // The probe timeout was cancelled by the transition.
    n.clock.set(1_000);
    n.engine.run_once();
    assert_eq!(n.engine.current_state(n.link), READY);
}

#[test]
fn single_attempt_config_fails_after_one_timeout() {
    let config = NodeConfig {
        link_probe_attempts: 1,
        ..NodeConfig::default()
    };
    let mut n = node(&config);
    n.engine.send_event(n.link, link::OPEN, None);
    n.engine.run_once();
    n.clock.set(500);
    n.engine.run_once();
    assert_eq!(n.engine.current_state(n.link), FAILED);

    // Reopen from FAILED.
    n.engine.send_event(n.link, link::OPEN, None);
    n.engine.run_once();
    assert_eq!(n.engine.current_state(n.link), PROBING);
    assert!(n.socket.is_open());
}

#[test]
fn heartbeat_and_link_share_one_engine() {
    let mut n = node(&NodeConfig::default());
    let hb = n.engine.create(
        "heartbeat",
        &heartbeat::TABLE,
        heartbeat::IDLE,
        HeartbeatCtx::new(&NodeConfig::default()),
    );
    n.engine.send_event(hb, heartbeat::ACTIVATE, None);
    n.engine.send_event(n.link, link::OPEN, None);
    n.engine.run_once();

    n.clock.set(50);
    n.rx.push(b"OK\r\n");
    n.engine.run_once();
    assert_eq!(n.engine.current_state(n.link), READY);
    assert_eq!(n.engine.current_state(hb), heartbeat::ACTIVE);

    n.clock.set(100);
    n.engine.run_once();
    assert_eq!(n.engine.current_state(hb), heartbeat::IDLE);
    assert_eq!(n.engine.context::<HeartbeatCtx>(hb).map(|c| c.pings), Some(2));
    assert_eq!(n.engine.machines(), 2);
}
