//! Heartbeat machine: a bounded activity window with a periodic ping.
//!
//! ```text
//!          ACTIVATE
//!   IDLE ───────────▶ ACTIVE ──┐ PING (named timer, re-armed each time)
//!    ▲                  │ ◀────┘
//!    └──── TIMEOUT ─────┘  (default timer = activity window)
//! ```
//!
//! The ping survives nothing on its own: EXIT(ACTIVE) stops it, so the
//! machine is silent while idle.

use log::{debug, info};

use super::NodePayload;
use crate::config::NodeConfig;
use crate::fsm::{Context, EventId, StateDescriptor, StateId, Transition, log_unhandled};

pub const IDLE: StateId = StateId(0);
pub const ACTIVE: StateId = StateId(1);

/// Open the activity window.
pub const ACTIVATE: EventId = EventId(0);
/// Fired by the named ping timer.
pub const PING: EventId = EventId(1);

/// Per-instance heartbeat data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatCtx {
    pub window_ms: u32,
    pub ping_ms: u32,
    /// PING events handled since boot.
    pub pings: u32,
    /// Times the window was opened.
    pub activations: u32,
}

impl HeartbeatCtx {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            window_ms: config.heartbeat_window_ms,
            ping_ms: config.heartbeat_ping_ms,
            ..Self::default()
        }
    }
}

type Cx<'a> = Context<'a, HeartbeatCtx, NodePayload>;

fn idle(cx: &mut Cx<'_>, event: EventId, _payload: Option<NodePayload>) -> Transition {
    match event {
        ACTIVATE => {
            cx.activations += 1;
            Transition::To(ACTIVE)
        }
        EventId::ENTER | EventId::EXIT => Transition::Stay,
        _ => log_unhandled(cx, event),
    }
}

fn active(cx: &mut Cx<'_>, event: EventId, _payload: Option<NodePayload>) -> Transition {
    match event {
        EventId::ENTER => {
            let (window, ping) = (cx.window_ms, cx.ping_ms);
            cx.start_timer(window);
            cx.start_named_timer(ping, PING);
            info!("heartbeat: window {window} ms, ping every {ping} ms");
            Transition::Stay
        }
        PING => {
            cx.pings += 1;
            debug!("heartbeat: ping #{} at {} ms", cx.pings, cx.now_ms());
            let ping = cx.ping_ms;
            cx.start_named_timer(ping, PING);
            Transition::Stay
        }
        // Extends the window instead of re-entering.
        ACTIVATE => {
            let window = cx.window_ms;
            cx.start_timer(window);
            Transition::Stay
        }
        EventId::TIMEOUT => Transition::To(IDLE),
        EventId::EXIT => {
            cx.stop_named_timer(PING);
            Transition::Stay
        }
        _ => log_unhandled(cx, event),
    }
}

/// State table for [`Engine::create`](crate::fsm::Engine::create).
pub static TABLE: [StateDescriptor<HeartbeatCtx, NodePayload>; 2] = [
    StateDescriptor {
        id: IDLE,
        name: "IDLE",
        handler: idle,
    },
    StateDescriptor {
        id: ACTIVE,
        name: "ACTIVE",
        handler: active,
    },
];
