//! Port traits: the hexagonal boundary between the FSM engine / machines
//! and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Engine + machines (domain)
//! ```
//!
//! Driven adapters (clock, line sockets, key-value storage) implement these
//! traits.  The engine and the machine handlers only ever see the traits,
//! so every machine is testable on the host with the in-memory adapters.

use crate::config::NodeConfig;

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: timer hardware → engine)
// ───────────────────────────────────────────────────────────────

/// Millisecond wall-clock source used for every timer deadline.
///
/// Must be monotonic.  Implementations are queried from the dispatch
/// context only.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin (usually boot).
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Line socket port (driven adapter: UART / I2C mux ↔ machines)
// ───────────────────────────────────────────────────────────────

/// Device-control requests understood by [`LineSocket::ioctl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlRequest {
    /// Change the line rate of a UART-backed socket.
    SetBaud(u32),
    /// Discard any buffered inbound bytes.
    FlushInput,
    /// Select the I2C peripheral address for a mux-backed socket.
    SetAddress(u8),
}

/// Asynchronous, line-oriented socket.
///
/// Outbound lines are written synchronously; inbound data is *not* read
/// through this trait.  Adapters push received bytes into a
/// [`LineAssembler`](crate::adapters::line::LineAssembler), which delivers
/// complete lines to a machine as engine events.
pub trait LineSocket {
    /// Open the device at `path`.  Opening an already-open socket is a no-op.
    fn open(&mut self, path: &str) -> Result<(), SocketError>;

    /// Apply a device-control request.
    fn ioctl(&mut self, request: IoctlRequest) -> Result<(), SocketError>;

    /// Write one line, terminator included.  Returns the bytes written.
    fn write(&mut self, line: &[u8]) -> Result<usize, SocketError>;

    /// Close the device.  Closing a closed socket is a no-op.
    fn close(&mut self);

    /// Whether the socket is currently open.
    fn is_open(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: machines ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Keys are namespaced to prevent collisions between subsystems.  Write
/// operations MUST be atomic, with no partial writes on power loss.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`NodeConfig`].
///
/// Implementations MUST call [`NodeConfig::validate`] before persisting and
/// after loading; invalid values are rejected, not clamped.
pub trait ConfigPort {
    /// Load configuration.  Returns `ConfigError::NotFound` on first boot.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &NodeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`LineSocket`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    /// No device exists at the requested path.
    NoSuchDevice,
    /// Operation requires an open socket.
    NotOpen,
    /// The device rejected the ioctl request.
    Unsupported,
    /// Line exceeds the adapter's buffer.
    TooLong,
    /// Generic I/O error from the driver.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Underlying storage failed.
    Storage(StorageError),
}

impl core::fmt::Display for SocketError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoSuchDevice => write!(f, "no such device"),
            Self::NotOpen => write!(f, "socket not open"),
            Self::Unsupported => write!(f, "unsupported ioctl"),
            Self::TooLong => write!(f, "line too long"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}
