//! Byte stream → line events.
//!
//! Socket readers push raw bytes into a [`LineAssembler`], which cuts them
//! at `\n` and queues one engine event per complete line:
//!
//! - `\r` is dropped, so both `\n` and `\r\n` terminate a line.
//! - Empty lines are skipped.
//! - Bytes outside printable ASCII become `?`.
//! - A line longer than [`LINE_MAX`] is discarded up to its terminator.

use heapless::String;
use log::warn;

use crate::config::LINE_MAX;
use crate::fsm::{EventId, EventSender, MachineHandle};

pub struct LineAssembler<P> {
    sender: EventSender<P>,
    target: MachineHandle,
    event: EventId,
    buf: String<LINE_MAX>,
    /// Set while skipping the tail of an overlong line.
    discarding: bool,
    dropped: u32,
}

impl<P: From<String<LINE_MAX>>> LineAssembler<P> {
    /// Deliver each line to `target` as `event` with a line payload.
    pub fn new(sender: EventSender<P>, target: MachineHandle, event: EventId) -> Self {
        Self {
            sender,
            target,
            event,
            buf: String::new(),
            discarding: false,
            dropped: 0,
        }
    }

    /// Feed received bytes.  Returns the number of lines queued.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let mut queued = 0;
        for &b in bytes {
            match b {
                b'\n' => {
                    if self.finish_line() {
                        queued += 1;
                    }
                }
                b'\r' => {}
                _ if self.discarding => {}
                _ => {
                    let c = if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '?'
                    };
                    if self.buf.push(c).is_err() {
                        warn!("line longer than {LINE_MAX} bytes, discarding");
                        self.buf.clear();
                        self.discarding = true;
                        self.dropped += 1;
                    }
                }
            }
        }
        queued
    }

    /// Bytes of the line currently being assembled.
    pub fn partial(&self) -> &str {
        &self.buf
    }

    /// Lines lost to overflow or a full event queue.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn finish_line(&mut self) -> bool {
        if core::mem::take(&mut self.discarding) || self.buf.is_empty() {
            return false;
        }
        let line = core::mem::take(&mut self.buf);
        if self.sender.send(self.target, self.event, Some(P::from(line))) {
            true
        } else {
            self.dropped += 1;
            false
        }
    }
}
