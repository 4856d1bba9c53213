//! UART-backed [`LineSocket`] (ESP-IDF only).
//!
//! The UART driver is split in two halves: the socket keeps the TX half
//! for the dispatch context, and [`spawn_reader`] moves the RX half into a
//! reader thread that feeds a [`LineAssembler`].  The reader only forwards
//! bytes while the socket is open.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use esp_idf_hal::delay::TickType;
use esp_idf_hal::uart::{UartRxDriver, UartTxDriver};
use esp_idf_svc::sys::{ESP_OK, uart_flush_input, uart_port_t, uart_set_baudrate};
use heapless::String;
use log::{info, warn};

use super::line::LineAssembler;
use crate::app::ports::{IoctlRequest, LineSocket, SocketError};
use crate::config::LINE_MAX;
use crate::fsm::{EventId, EventSender, MachineHandle};

const READ_TIMEOUT_MS: u64 = 50;

pub struct UartSocket {
    name: String<16>,
    port: uart_port_t,
    tx: UartTxDriver<'static>,
    open: Arc<AtomicBool>,
}

impl UartSocket {
    /// `name` is the device path [`LineSocket::open`] accepts.
    pub fn new(name: String<16>, port: uart_port_t, tx: UartTxDriver<'static>) -> Self {
        Self {
            name,
            port,
            tx,
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag shared with the reader thread.
    pub fn open_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.open)
    }
}

impl LineSocket for UartSocket {
    fn open(&mut self, path: &str) -> Result<(), SocketError> {
        if path != self.name.as_str() {
            return Err(SocketError::NoSuchDevice);
        }
        self.open.store(true, Ordering::Release);
        info!("UartSocket: {} open (port {})", self.name, self.port);
        Ok(())
    }

    fn ioctl(&mut self, request: IoctlRequest) -> Result<(), SocketError> {
        if !self.is_open() {
            return Err(SocketError::NotOpen);
        }
        // SAFETY: the port was installed by the UART driver this socket
        // owns half of; both calls only touch that port's registers.
        let ret = match request {
            IoctlRequest::SetBaud(baud) => unsafe { uart_set_baudrate(self.port, baud) },
            IoctlRequest::FlushInput => unsafe { uart_flush_input(self.port) },
            IoctlRequest::SetAddress(_) => return Err(SocketError::Unsupported),
        };
        if ret == ESP_OK {
            Ok(())
        } else {
            warn!("UartSocket: {request:?} failed ({ret})");
            Err(SocketError::IoError)
        }
    }

    fn write(&mut self, line: &[u8]) -> Result<usize, SocketError> {
        if !self.is_open() {
            return Err(SocketError::NotOpen);
        }
        self.tx.write(line).map_err(|e| {
            warn!("UartSocket: write failed: {e}");
            SocketError::IoError
        })
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!("UartSocket: {} closed", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Start the RX thread.  Each received line is queued for `target` as
/// `event`.
pub fn spawn_reader<P>(
    rx: UartRxDriver<'static>,
    open: Arc<AtomicBool>,
    sender: EventSender<P>,
    target: MachineHandle,
    event: EventId,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    P: From<String<LINE_MAX>> + Send + 'static,
{
    std::thread::Builder::new()
        .name("uart-rx".into())
        .stack_size(4 * 1024)
        .spawn(move || {
            let mut lines = LineAssembler::new(sender, target, event);
            let timeout = TickType::new_millis(READ_TIMEOUT_MS).ticks();
            let mut buf = [0u8; 64];
            loop {
                match rx.read(&mut buf, timeout) {
                    Ok(0) => {}
                    Ok(n) if open.load(Ordering::Acquire) => {
                        lines.push(&buf[..n]);
                    }
                    // Closed: drain and drop.
                    Ok(_) => {}
                    Err(e) => warn!("uart-rx: read failed: {e}"),
                }
            }
        })
}
