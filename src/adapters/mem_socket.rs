//! In-memory [`LineSocket`] for host tests and simulation.
//!
//! Clones share one state, so a test keeps a clone as a probe while the
//! machine owns the boxed original.  Every written line is recorded with
//! its `\r\n` trimmed.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::app::ports::{IoctlRequest, LineSocket, SocketError};

#[derive(Debug, Default)]
struct State {
    devices: Vec<String>,
    open: Option<String>,
    baud: Option<u32>,
    address: Option<u8>,
    written: Vec<String>,
    fail_writes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemSocket {
    state: Arc<Mutex<State>>,
}

impl MemSocket {
    /// A socket that can open any of `devices`.
    pub fn with_devices(devices: &[&str]) -> Self {
        let state = State {
            devices: devices.iter().map(|d| (*d).to_owned()).collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Poisoning is ignored.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Lines written so far, oldest first.
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    /// Baud rate last applied by ioctl.
    pub fn baud(&self) -> Option<u32> {
        self.state().baud
    }

    pub fn address(&self) -> Option<u8> {
        self.state().address
    }

    /// Path of the open device, if any.
    pub fn open_path(&self) -> Option<String> {
        self.state().open.clone()
    }

    /// Make every following write fail with [`SocketError::IoError`].
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }
}

impl LineSocket for MemSocket {
    fn open(&mut self, path: &str) -> Result<(), SocketError> {
        let mut s = self.state();
        if !s.devices.iter().any(|d| d == path) {
            return Err(SocketError::NoSuchDevice);
        }
        s.open = Some(path.to_owned());
        Ok(())
    }

    fn ioctl(&mut self, request: IoctlRequest) -> Result<(), SocketError> {
        let mut s = self.state();
        if s.open.is_none() {
            return Err(SocketError::NotOpen);
        }
        match request {
            IoctlRequest::SetBaud(baud) => s.baud = Some(baud),
            IoctlRequest::SetAddress(addr) => s.address = Some(addr),
            IoctlRequest::FlushInput => {}
        }
        Ok(())
    }

    fn write(&mut self, line: &[u8]) -> Result<usize, SocketError> {
        let mut s = self.state();
        if s.open.is_none() {
            return Err(SocketError::NotOpen);
        }
        if s.fail_writes {
            return Err(SocketError::IoError);
        }
        let text = String::from_utf8_lossy(line);
        s.written.push(text.trim_end_matches(['\r', '\n']).to_owned());
        Ok(line.len())
    }

    fn close(&mut self) {
        self.state().open = None;
    }

    fn is_open(&self) -> bool {
        self.state().open.is_some()
    }
}
