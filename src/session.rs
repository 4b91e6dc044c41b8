//! One MPSSE session over one transport.
//!
//! [`TransportSession`] owns the transport for the lifetime of the physical
//! connection and is the only thing that talks to it. It executes command
//! batches ([`submit`](TransportSession::submit)), checks that the chip is in
//! MPSSE mode ([`verify`](TransportSession::verify)) and brings it back to a
//! known state ([`reset`](TransportSession::reset)).
//!
//! # Failure model
//!
//! A failed transfer leaves the chip somewhere in the middle of a command
//! stream, with an unknown amount of reply data queued. The session then
//! moves to [`SessionState::Faulted`] and refuses further batches until
//! `reset()` succeeds:
//!
//! ```text
//! open() + reset() ──► Ready ──submit ok──► Ready
//!                        │
//!                   submit failed
//!                        ▼
//!                     Faulted ──reset ok──► Ready
//! ```
//!
//! Sessions are not synchronized. Every operation takes `&mut self`; share a
//! session across threads by wrapping it in a `Mutex`, and use one session
//! per physical device.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::batch::CommandBatch;
use crate::constants::mpsse::BAD_COMMAND;
use crate::constants::{
    SIO_CHAR_DISABLED, SIO_RESET_PURGE_RX, SIO_RESET_PURGE_TX, SIO_RESET_REQUEST, SIO_RESET_SIO,
    SIO_SET_BITMODE_REQUEST, SIO_SET_ERROR_CHAR_REQUEST, SIO_SET_EVENT_CHAR_REQUEST,
};
use crate::error::{Error, Result};
use crate::mpsse;
use crate::transport::Transport;
use crate::types::BitMode;

/// Default timeout for every USB transfer.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Opcodes the chip does not implement, used for the echo handshake.
const VERIFY_OPCODES: [u8; 2] = [0xAA, 0xAB];

/// How long to wait for bytes that should not be there.
const SURPLUS_PROBE_TIMEOUT: Duration = Duration::from_millis(20);

/// Per-read timeout while draining stale data during reset.
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Whether the session's view of the device can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The last operation completed; batches may be submitted.
    Ready,
    /// A transfer failed. Only [`TransportSession::reset`] is accepted.
    Faulted,
}

/// An MPSSE command processor reached through a [`Transport`].
#[derive(Debug)]
pub struct TransportSession<T: Transport> {
    transport: T,
    io_timeout: Duration,
    state: SessionState,
}

impl<T: Transport> TransportSession<T> {
    /// Take ownership of an opened transport and reset the chip into MPSSE
    /// mode, using [`DEFAULT_IO_TIMEOUT`].
    pub fn open(transport: T) -> Result<Self> {
        Self::open_with_timeout(transport, DEFAULT_IO_TIMEOUT)
    }

    /// Like [`open`](Self::open) with a custom transfer timeout.
    pub fn open_with_timeout(transport: T, io_timeout: Duration) -> Result<Self> {
        let mut session = Self {
            transport,
            io_timeout,
            state: SessionState::Faulted,
        };
        session.reset()?;
        Ok(session)
    }

    /// Give the transport back. The chip is left in whatever mode it is in.
    pub fn close(self) -> T {
        self.transport
    }

    /// Whether the session currently accepts batches.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shorthand for `state() == SessionState::Ready`.
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// The timeout applied to each write and to each complete read.
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Change the transfer timeout. `Duration::MAX` waits indefinitely.
    pub fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = timeout;
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport.
    ///
    /// Bytes written or read behind the session's back will desynchronize it
    /// from the chip.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Faulted => Err(Error::SessionFaulted),
        }
    }

    fn fault(&mut self, err: &Error) {
        if self.state == SessionState::Ready {
            warn!("MPSSE session faulted: {err}");
        }
        self.state = SessionState::Faulted;
    }
}

// ---- Submission ----

impl<T: Transport> TransportSession<T> {
    /// Execute a batch: send its whole command stream, then read exactly as
    /// many bytes as the batch reserved for responses.
    ///
    /// On success the batch's handles can read their replies. On failure the
    /// response stream is discarded (nothing partial is readable) and the
    /// session is faulted.
    pub fn submit(&mut self, batch: &mut CommandBatch) -> Result<()> {
        self.ensure_ready()?;
        match self.round_trip(batch) {
            Ok(()) => {
                batch.mark_completed();
                Ok(())
            }
            Err(err) => {
                batch.discard_responses();
                self.fault(&err);
                Err(err)
            }
        }
    }

    fn round_trip(&mut self, batch: &mut CommandBatch) -> Result<()> {
        debug!(
            "submit: {} command bytes, {} response bytes",
            batch.command_len(),
            batch.response_len()
        );

        let commands = batch.commands();
        if !commands.is_empty() {
            trace!("=> {commands:02x?}");
            let written = self.transport.write(commands, self.io_timeout)?;
            if written != commands.len() {
                return Err(Error::ShortWrite {
                    expected: commands.len(),
                    written,
                });
            }
        }

        let timeout = self.io_timeout;
        let responses = batch.response_buffer_mut();
        if !responses.is_empty() {
            read_exact(&mut self.transport, responses, timeout)?;
            trace!("<= {responses:02x?}");
        }
        Ok(())
    }
}

/// Fill `buf` completely or fail once `timeout` has elapsed.
fn read_exact<T: Transport>(transport: &mut T, buf: &mut [u8], timeout: Duration) -> Result<()> {
    let expected = buf.len();
    // A timeout past the end of the clock means no deadline at all
    let deadline = Instant::now().checked_add(timeout);
    let mut received = 0;

    while received < expected {
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };
        if remaining.is_zero() {
            return Err(Error::Timeout { expected, received });
        }
        match transport.read(&mut buf[received..], remaining) {
            Ok(n) => received += n,
            Err(Error::Timeout { .. }) => return Err(Error::Timeout { expected, received }),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

// ---- Verification ----

impl<T: Transport> TransportSession<T> {
    /// Check that the chip is running the MPSSE command processor.
    ///
    /// Sends the unimplemented opcodes `0xAA` and `0xAB`; each must come back
    /// as exactly `0xFA` followed by the opcode. Anything else, including
    /// missing or extra bytes, is a [`Error::Verification`] and faults the
    /// session.
    pub fn verify(&mut self) -> Result<()> {
        self.ensure_ready()?;
        let mut batch = CommandBatch::new();

        for opcode in VERIFY_OPCODES {
            batch.reset();
            mpsse::bad_command(&mut batch, opcode)?;

            if let Err(err) = self.verify_echo(&mut batch, opcode) {
                batch.discard_responses();
                self.fault(&err);
                return Err(err);
            }
            trace!("verify {opcode:#04x}: echo ok");
        }

        debug!("MPSSE command processor verified");
        Ok(())
    }

    fn verify_echo(&mut self, batch: &mut CommandBatch, opcode: u8) -> Result<()> {
        match self.round_trip(batch) {
            Ok(()) => {}
            Err(Error::Timeout { received, .. }) => {
                return Err(Error::Verification {
                    opcode,
                    response: batch.response_buffer_mut()[..received].to_vec(),
                });
            }
            Err(err) => return Err(err),
        }

        let mut response = batch.response_buffer_mut().to_vec();
        if response != [BAD_COMMAND, opcode] {
            return Err(Error::Verification { opcode, response });
        }

        let mut surplus = [0u8; 64];
        match self.transport.read(&mut surplus, SURPLUS_PROBE_TIMEOUT) {
            Ok(0) | Err(Error::Timeout { .. }) => Ok(()),
            Ok(n) => {
                response.extend_from_slice(&surplus[..n]);
                Err(Error::Verification { opcode, response })
            }
            Err(err) => Err(err),
        }
    }
}

// ---- Reset ----

impl<T: Transport> TransportSession<T> {
    /// Bring the chip back to a clean MPSSE state.
    ///
    /// Purges both FIFOs, discards any reply bytes still queued, disables the
    /// event and error characters and cycles the bit mode through reset into
    /// MPSSE. Safe to call at any time; this is the only way out of
    /// [`SessionState::Faulted`].
    pub fn reset(&mut self) -> Result<()> {
        debug!("resetting MPSSE session");
        match self.reset_sequence() {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(err) => {
                self.fault(&err);
                Err(err)
            }
        }
    }

    fn reset_sequence(&mut self) -> Result<()> {
        for value in [SIO_RESET_SIO, SIO_RESET_PURGE_RX, SIO_RESET_PURGE_TX] {
            self.transport
                .control_out(SIO_RESET_REQUEST, value, self.io_timeout)?;
        }

        self.drain()?;

        self.transport
            .control_out(SIO_SET_EVENT_CHAR_REQUEST, SIO_CHAR_DISABLED, self.io_timeout)?;
        self.transport
            .control_out(SIO_SET_ERROR_CHAR_REQUEST, SIO_CHAR_DISABLED, self.io_timeout)?;

        self.set_bitmode(BitMode::Reset)?;
        self.set_bitmode(BitMode::Mpsse)
    }

    /// Read and discard until the device reports nothing pending.
    fn drain(&mut self) -> Result<()> {
        let deadline = Instant::now().checked_add(self.io_timeout);
        let mut buf = [0u8; 64];
        let mut discarded = 0usize;

        loop {
            match self.transport.read(&mut buf, DRAIN_READ_TIMEOUT) {
                Ok(0) | Err(Error::Timeout { .. }) => break,
                Ok(n) => discarded += n,
                Err(err) => return Err(err),
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(Error::Timeout {
                    expected: 0,
                    received: discarded,
                });
            }
        }

        if discarded > 0 {
            debug!("drained {discarded} stale bytes");
        }
        Ok(())
    }

    fn set_bitmode(&mut self, mode: BitMode) -> Result<()> {
        self.transport
            .control_out(SIO_SET_BITMODE_REQUEST, mode.wire_value(0), self.io_timeout)?;
        let status = self.transport.read_status(self.io_timeout)?;
        trace!("bit mode {mode:?}, modem status {:#06x}", status.raw());
        Ok(())
    }
}
