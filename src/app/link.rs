//! Modem link machine: bring a line-oriented device up and keep it alive.
//!
//! ```text
//!            OPEN                 "OK"
//!  CLOSED ─────────▶ PROBING ─────────────▶ READY ──┐ KEEPALIVE
//!    ▲                │  ▲ TIMEOUT: re-probe  │ ◀────┘ (named timer)
//!    │                │  └────── "ERROR" ─────┘
//!    │                │ attempts exhausted / IO_ERROR
//!    │                ▼
//!    └──── CLOSE ── FAILED ◀──── IO_ERROR (from READY)
//! ```
//!
//! CLOSE returns to CLOSED from every state.  Inbound lines arrive as
//! [`LINE`] events carrying [`NodePayload::Line`]; the socket adapter's
//! reader produces them through an [`EventSender`](crate::fsm::EventSender).

use heapless::String;
use log::{debug, info, warn};

use super::NodePayload;
use super::ports::{IoctlRequest, LineSocket, SocketError};
use crate::config::NodeConfig;
use crate::fsm::{Context, EventId, StateDescriptor, StateId, Transition, log_unhandled};

pub const CLOSED: StateId = StateId(0);
pub const PROBING: StateId = StateId(1);
pub const READY: StateId = StateId(2);
pub const FAILED: StateId = StateId(3);

/// Bring the link up (from CLOSED or FAILED).
pub const OPEN: EventId = EventId(0);
/// A line was received; payload is [`NodePayload::Line`].
pub const LINE: EventId = EventId(1);
/// Tear the link down.
pub const CLOSE: EventId = EventId(2);
/// Fired by the keep-alive named timer.
pub const KEEPALIVE: EventId = EventId(3);
/// Change baud rate; payload is [`NodePayload::Baud`].
pub const SET_BAUD: EventId = EventId(4);
/// A socket call failed inside a handler.
pub const IO_ERROR: EventId = EventId(5);

const PROBE: &[u8] = b"AT\r\n";

/// Per-instance link data.
pub struct LinkCtx {
    pub socket: Box<dyn LineSocket>,
    pub device: String<16>,
    pub baud: u32,
    pub probe_timeout_ms: u32,
    pub probe_attempts: u8,
    pub keepalive_ms: u32,

    /// Probes sent in the current PROBING visit.
    pub attempts: u8,
    pub last_error: Option<SocketError>,
    /// Times READY was entered.
    pub ready_count: u32,
    pub keepalives_sent: u32,
    /// Unsolicited lines seen while READY.
    pub lines_seen: u32,
}

impl LinkCtx {
    pub fn new(socket: Box<dyn LineSocket>, config: &NodeConfig) -> Self {
        Self {
            socket,
            device: config.link_device.clone(),
            baud: config.link_baud,
            probe_timeout_ms: config.link_probe_timeout_ms,
            probe_attempts: config.link_probe_attempts,
            keepalive_ms: config.link_keepalive_ms,
            attempts: 0,
            last_error: None,
            ready_count: 0,
            keepalives_sent: 0,
            lines_seen: 0,
        }
    }
}

type Cx<'a> = Context<'a, LinkCtx, NodePayload>;

// ── Helpers ───────────────────────────────────────────────────

/// Record a socket failure and let the current state react to IO_ERROR.
///
/// With the queue full the failure is reported through the default timer
/// instead: PROBING retries on TIMEOUT, READY re-probes.
fn io_failed(cx: &mut Cx<'_>, op: &str, err: SocketError) {
    warn!("link[{}]: {op} failed: {err}", cx.state_name());
    cx.last_error = Some(err);
    if !cx.send(IO_ERROR, None) {
        warn!("link: queue full, retrying after probe timeout");
        let timeout = cx.probe_timeout_ms;
        cx.start_timer(timeout);
    }
}

fn open_device(link: &mut LinkCtx) -> Result<(), SocketError> {
    if !link.socket.is_open() {
        link.socket.open(&link.device)?;
    }
    link.socket.ioctl(IoctlRequest::SetBaud(link.baud))?;
    link.socket.ioctl(IoctlRequest::FlushInput)
}

fn probe(cx: &mut Cx<'_>) {
    cx.attempts += 1;
    debug!("link: probe {}/{}", cx.attempts, cx.probe_attempts);
    match cx.socket.write(PROBE) {
        Ok(_) => {
            let timeout = cx.probe_timeout_ms;
            cx.start_timer(timeout);
        }
        Err(e) => io_failed(cx, "probe write", e),
    }
}

fn set_baud(cx: &mut Cx<'_>, payload: Option<NodePayload>) {
    let Some(NodePayload::Baud(baud)) = payload else {
        warn!("link: SET_BAUD without a baud payload");
        return;
    };
    cx.baud = baud;
    if cx.socket.is_open() {
        if let Err(e) = cx.socket.ioctl(IoctlRequest::SetBaud(baud)) {
            io_failed(cx, "set baud", e);
        }
    }
}

fn line_is(payload: Option<&NodePayload>, text: &str) -> bool {
    payload.and_then(NodePayload::as_line) == Some(text)
}

// ── State handlers ────────────────────────────────────────────

fn closed(cx: &mut Cx<'_>, event: EventId, payload: Option<NodePayload>) -> Transition {
    match event {
        EventId::ENTER => {
            if cx.socket.is_open() {
                cx.socket.close();
            }
            Transition::Stay
        }
        EventId::EXIT | LINE | CLOSE => Transition::Stay,
        OPEN => Transition::To(PROBING),
        SET_BAUD => {
            set_baud(cx, payload);
            Transition::Stay
        }
        _ => log_unhandled(cx, event),
    }
}

fn probing(cx: &mut Cx<'_>, event: EventId, payload: Option<NodePayload>) -> Transition {
    match event {
        EventId::ENTER => {
            cx.attempts = 0;
            match open_device(&mut **cx) {
                Ok(()) => probe(cx),
                Err(e) => io_failed(cx, "open", e),
            }
            Transition::Stay
        }
        // Echo and unsolicited output are skipped until the modem answers.
        LINE if line_is(payload.as_ref(), "OK") => Transition::To(READY),
        LINE => Transition::Stay,
        EventId::TIMEOUT if cx.attempts < cx.probe_attempts => {
            probe(cx);
            Transition::Stay
        }
        EventId::TIMEOUT => {
            warn!("link: no answer after {} probes", cx.attempts);
            cx.last_error = None;
            Transition::To(FAILED)
        }
        IO_ERROR => Transition::To(FAILED),
        CLOSE => Transition::To(CLOSED),
        SET_BAUD => {
            set_baud(cx, payload);
            Transition::Stay
        }
        _ => log_unhandled(cx, event),
    }
}

fn ready(cx: &mut Cx<'_>, event: EventId, payload: Option<NodePayload>) -> Transition {
    match event {
        EventId::ENTER => {
            cx.ready_count += 1;
            let keepalive = cx.keepalive_ms;
            cx.start_named_timer(keepalive, KEEPALIVE);
            info!("link: {} ready at {} baud", cx.device, cx.baud);
            Transition::Stay
        }
        KEEPALIVE => {
            match cx.socket.write(PROBE) {
                Ok(_) => {
                    cx.keepalives_sent += 1;
                    let keepalive = cx.keepalive_ms;
                    cx.start_named_timer(keepalive, KEEPALIVE);
                }
                Err(e) => io_failed(cx, "keep-alive write", e),
            }
            Transition::Stay
        }
        LINE if line_is(payload.as_ref(), "ERROR") => Transition::To(PROBING),
        LINE if line_is(payload.as_ref(), "OK") => Transition::Stay,
        LINE => {
            cx.lines_seen += 1;
            if let Some(line) = payload.as_ref().and_then(NodePayload::as_line) {
                debug!("link: unsolicited {line:?}");
            }
            Transition::Stay
        }
        SET_BAUD => {
            set_baud(cx, payload);
            Transition::Stay
        }
        IO_ERROR => Transition::To(FAILED),
        // Only armed by an unreported write failure.
        EventId::TIMEOUT => Transition::To(PROBING),
        CLOSE => Transition::To(CLOSED),
        EventId::EXIT => {
            cx.stop_named_timer(KEEPALIVE);
            Transition::Stay
        }
        _ => log_unhandled(cx, event),
    }
}

fn failed(cx: &mut Cx<'_>, event: EventId, _payload: Option<NodePayload>) -> Transition {
    match event {
        EventId::ENTER => {
            match cx.last_error {
                Some(e) => warn!("link: failed ({e})"),
                None => warn!("link: failed (no response)"),
            }
            cx.socket.close();
            Transition::Stay
        }
        EventId::EXIT | LINE | IO_ERROR => Transition::Stay,
        OPEN => Transition::To(PROBING),
        CLOSE => Transition::To(CLOSED),
        _ => log_unhandled(cx, event),
    }
}

/// State table for [`Engine::create`](crate::fsm::Engine::create).
pub static TABLE: [StateDescriptor<LinkCtx, NodePayload>; 4] = [
    StateDescriptor {
        id: CLOSED,
        name: "CLOSED",
        handler: closed,
    },
    StateDescriptor {
        id: PROBING,
        name: "PROBING",
        handler: probing,
    },
    StateDescriptor {
        id: READY,
        name: "READY",
        handler: ready,
    },
    StateDescriptor {
        id: FAILED,
        name: "FAILED",
        handler: failed,
    },
];
