//! `embedded-hal` 1.0 trait implementation.
//!
//! Enable the `embedded-hal` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ftdi-i2c = { version = "0.1", features = ["embedded-hal"] }
//! ```
//!
//! [`FtdiI2c`] implements `embedded_hal::i2c::I2c`, so any driver written
//! against embedded-hal can talk to sensors behind an FTDI adapter. Each
//! [`transaction`](embedded_hal::i2c::I2c::transaction) is encoded into a
//! single command batch and costs one USB round trip.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation};
use log::warn;

use crate::batch::CommandBatch;
use crate::context::FtdiDevice;
use crate::error::{Error, NackSource};
use crate::mpsse::i2c::{self, Direction, I2cBus, I2cSpeed, ReadBack};
use crate::session::TransportSession;
use crate::transport::Transport;

// ---- Error conversion ----

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::I2cNack(NackSource::Address) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            Error::I2cNack(NackSource::Data) => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            _ => ErrorKind::Other,
        }
    }
}

/// Wrapper that implements `embedded_hal::i2c::I2c` for an FTDI MPSSE I2C bus.
///
/// Bundles the [`TransportSession`] with the [`I2cBus`] configured on it.
///
/// # Example
///
/// ```no_run
/// use ftdi_i2c::hal::FtdiI2c;
/// use ftdi_i2c::mpsse::i2c::I2cSpeed;
///
/// let mut hal_i2c = FtdiI2c::open(0x0403, 0x6014, I2cSpeed::Hz(400_000))?;
///
/// // Use with any embedded-hal I2C driver:
/// use embedded_hal::i2c::I2c;
/// let mut buf = [0u8; 2];
/// hal_i2c.write_read(0x48, &[0x00], &mut buf)?;
/// # Ok::<(), ftdi_i2c::Error>(())
/// ```
#[derive(Debug)]
pub struct FtdiI2c<T: Transport = FtdiDevice> {
    session: TransportSession<T>,
    bus: I2cBus,
    batch: CommandBatch,
}

impl FtdiI2c<FtdiDevice> {
    /// Open an FTDI device, verify MPSSE mode and configure I2C.
    pub fn open(vendor: u16, product: u16, speed: I2cSpeed) -> crate::error::Result<Self> {
        let dev = FtdiDevice::open(vendor, product)?;
        Self::new(dev, speed)
    }
}

impl<T: Transport> FtdiI2c<T> {
    /// Bring up a session on `transport` and configure I2C.
    pub fn new(transport: T, speed: I2cSpeed) -> crate::error::Result<Self> {
        let mut session = TransportSession::open(transport)?;
        session.verify()?;
        let bus = I2cBus::new(&mut session, speed)?;
        Ok(Self::from_parts(session, bus))
    }

    /// Create from an already-configured session and bus.
    pub fn from_parts(session: TransportSession<T>, bus: I2cBus) -> Self {
        Self {
            session,
            bus,
            batch: CommandBatch::new(),
        }
    }

    /// Borrow the session the bus runs on.
    pub fn session(&self) -> &TransportSession<T> {
        &self.session
    }

    /// Mutably borrow the session, e.g. to change its timeout.
    pub fn session_mut(&mut self) -> &mut TransportSession<T> {
        &mut self.session
    }

    /// Reset, verify and reconfigure after an error that
    /// [requires a reset](Error::requires_reset).
    pub fn recover(&mut self) -> crate::error::Result<()> {
        self.session.reset()?;
        self.session.verify()?;
        self.bus.configure(&mut self.session)
    }

    /// Decompose into the underlying parts.
    pub fn into_parts(self) -> (TransportSession<T>, I2cBus) {
        (self.session, self.bus)
    }
}

impl<T: Transport> embedded_hal::i2c::ErrorType for FtdiI2c<T> {
    type Error = Error;
}

/// Whether a non-empty read follows before the direction changes. Empty
/// reads put nothing on the bus, so they cannot take over the final NACK.
fn read_continues(rest: &[Operation<'_>]) -> bool {
    rest.iter()
        .take_while(|op| matches!(op, Operation::Read(_)))
        .any(|op| matches!(op, Operation::Read(buf) if !buf.is_empty()))
}

impl<T: Transport> embedded_hal::i2c::I2c for FtdiI2c<T> {
    /// START, then every operation with a repeated START (address
    /// included) wherever the direction changes, then STOP. Adjacent reads
    /// continue each other: only the very last byte of a run is NACKed.
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        i2c::address_byte(address, Direction::Write)?;
        if operations.is_empty() {
            return Ok(());
        }

        let batch = &mut self.batch;
        batch.reset();

        let mut acks = Vec::new();
        let mut reads: Vec<ReadBack> = Vec::new();
        let mut prev: Option<Direction> = None;

        i2c::encode_start(batch)?;
        for (i, op) in operations.iter().enumerate() {
            let dir = match op {
                Operation::Read(_) => Direction::Read,
                Operation::Write(_) => Direction::Write,
            };

            if prev != Some(dir) {
                if prev.is_some() {
                    i2c::encode_idle(batch)?;
                    i2c::encode_start(batch)?;
                }
                acks.push(i2c::encode_send_address(batch, address, dir)?);
            }

            match op {
                Operation::Read(buf) => {
                    let nack_last = !read_continues(&operations[i + 1..]);
                    reads.push(i2c::encode_read(batch, buf.len(), nack_last)?);
                }
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        acks.push(i2c::encode_send_byte(batch, byte)?);
                    }
                }
            }
            prev = Some(dir);
        }
        i2c::encode_stop(batch)?;

        self.session.submit(batch)?;

        i2c::check_acks(batch, &acks).inspect_err(|err| {
            warn!("I2C transaction to {address:#04x} aborted: {err}");
        })?;

        let mut reads = reads.iter();
        for op in operations.iter_mut() {
            if let Operation::Read(buf) = op {
                if let Some(read) = reads.next() {
                    read.copy_to(batch, buf)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::Error as _;

    #[test]
    fn error_kind_mapping_i2c_address_nack() {
        let err = Error::I2cNack(NackSource::Address);
        assert_eq!(
            err.kind(),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
        );
    }

    #[test]
    fn error_kind_mapping_i2c_data_nack() {
        let err = Error::I2cNack(NackSource::Data);
        assert_eq!(err.kind(), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
    }

    #[test]
    fn empty_reads_do_not_continue_a_run() {
        let mut a = [0u8; 2];
        let mut none: [u8; 0] = [];
        assert!(read_continues(&[Operation::Read(&mut a)]));
        assert!(!read_continues(&[Operation::Read(&mut none)]));
        assert!(!read_continues(&[]));

        let mut b = [0u8; 1];
        let mut none: [u8; 0] = [];
        assert!(read_continues(&[Operation::Read(&mut none), Operation::Read(&mut b)]));

        let mut none: [u8; 0] = [];
        let mut c = [0u8; 1];
        assert!(!read_continues(&[
            Operation::Read(&mut none),
            Operation::Write(&[0x00]),
            Operation::Read(&mut c),
        ]));
    }

    #[test]
    fn error_kind_mapping_other() {
        assert_eq!(Error::SessionFaulted.kind(), ErrorKind::Other);
        assert_eq!(
            Error::Timeout { expected: 1, received: 0 }.kind(),
            ErrorKind::Other
        );
    }
}
