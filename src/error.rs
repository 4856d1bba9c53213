//! Unified error types for the SensorNode firmware.
//!
//! Two categories live here:
//!
//! - [`Error`]: recoverable failures from collaborators (sockets, storage,
//!   configuration).  All variants are `Copy` so they can be passed around
//!   state handlers without allocation.
//! - [`EngineFault`]: configuration faults inside the FSM engine.  These
//!   indicate a build-time logic error and are never returned; the engine
//!   logs them and aborts via [`raise`].

use core::fmt;

use crate::app::ports::{ConfigError, SocketError, StorageError};
use crate::fsm::{EventId, StateId};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every recoverable fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A line socket (UART / I2C mux) operation failed.
    Socket(SocketError),
    /// The key-value store failed.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(e) => write!(f, "socket: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<SocketError> for Error {
    fn from(e: SocketError) -> Self {
        Self::Socket(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Engine configuration faults
// ---------------------------------------------------------------------------

/// Unrecoverable misuse of the FSM engine.
///
/// Continuing after any of these would run a machine in an undefined state,
/// so they are raised as panics rather than returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFault {
    /// `create` was given an empty state table.
    EmptyStateTable { machine: &'static str },
    /// `create` was given more states than `MAX_STATES`.
    StateTableTooLarge { machine: &'static str, len: usize },
    /// Two table rows share the same id.
    DuplicateState { machine: &'static str, state: StateId },
    /// The initial state is not in the table.
    UnknownInitialState { machine: &'static str, state: StateId },
    /// A handler returned a transition to a state that is not in the table.
    UnknownTargetState { machine: &'static str, state: StateId },
    /// All `MAX_MACHINES` registry slots are in use.
    MachineTableFull { machine: &'static str },
    /// Every named-timer slot of the machine is armed.
    NamedTimerPoolExhausted { machine: &'static str, event: EventId },
    /// A handle refers to a destroyed (or never created) machine.
    StaleHandle { index: usize, generation: u16 },
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyStateTable { machine } => write!(f, "{machine}: empty state table"),
            Self::StateTableTooLarge { machine, len } => {
                write!(f, "{machine}: state table has {len} entries")
            }
            Self::DuplicateState { machine, state } => {
                write!(f, "{machine}: duplicate state id {}", state.0)
            }
            Self::UnknownInitialState { machine, state } => {
                write!(f, "{machine}: initial state {} not in table", state.0)
            }
            Self::UnknownTargetState { machine, state } => {
                write!(f, "{machine}: transition to unknown state {}", state.0)
            }
            Self::MachineTableFull { machine } => {
                write!(f, "{machine}: machine table full")
            }
            Self::NamedTimerPoolExhausted { machine, event } => {
                write!(f, "{machine}: no free named timer for event {}", event.0)
            }
            Self::StaleHandle { index, generation } => {
                write!(f, "stale machine handle {index}/{generation}")
            }
        }
    }
}

/// Log a configuration fault and abort.
#[cold]
#[track_caller]
pub(crate) fn raise(fault: EngineFault) -> ! {
    log::error!("FSM fault: {}", fault);
    panic!("FSM fault: {fault}");
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
