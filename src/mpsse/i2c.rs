//! I2C master protocol using MPSSE.
//!
//! Implements bit-banged I2C master communication on top of the MPSSE
//! command set, with 3-phase data clocking and open-drain outputs. Requires
//! an H-type chip (FT2232H, FT4232H, FT232H).
//!
//! # Pin Mapping
//!
//! | FTDI Pin | I2C Signal | Bit |
//! |----------|------------|-----|
//! | ADBUS0 (SK) | SCL     | 0   |
//! | ADBUS1 (DO) | SDA out | 1   |
//! | ADBUS2 (DI) | SDA in  | 2   |
//! | ACBUS6      | driven with the bus, released otherwise | 14 |
//!
//! SDA needs DO and DI tied together externally, with pull-ups on SDA and
//! SCL. The levels below are the complete pin words sent with
//! [`set_output`](super::set_output); rewiring the adapter means changing
//! exactly these constants.
//!
//! # Two ways to drive the bus
//!
//! The `encode_*` functions only append commands to a [`CommandBatch`], so
//! several logical steps can share one USB round trip; their [`AckCheck`]
//! and [`ReadBack`] results are evaluated after the batch is submitted.
//! [`I2cBus`] wraps the same encoders and submits after each step, or after
//! each complete transaction for [`write`](I2cBus::write),
//! [`read`](I2cBus::read) and [`write_read`](I2cBus::write_read).
//!
//! # Example
//!
//! ```no_run
//! use ftdi_i2c::{FtdiDevice, TransportSession};
//! use ftdi_i2c::mpsse::i2c::{I2cBus, I2cSpeed};
//!
//! let dev = FtdiDevice::open(0x0403, 0x6014)?; // FT232H
//! let mut session = TransportSession::open(dev)?;
//! session.verify()?;
//! let mut i2c = I2cBus::new(&mut session, I2cSpeed::default())?;
//!
//! // Write to device at address 0x50
//! i2c.write(&mut session, 0x50, &[0x00, 0x42])?;
//!
//! // Read 2 bytes from register 0x00 of device 0x50
//! let mut data = [0u8; 2];
//! i2c.write_read(&mut session, 0x50, &[0x00], &mut data)?;
//! # Ok::<(), ftdi_i2c::Error>(())
//! ```

use log::{debug, warn};

use crate::batch::{CommandBatch, CommandHandle};
use crate::error::{Error, NackSource, Result};
use crate::session::TransportSession;
use crate::transport::Transport;

// ---- Pin map ----

/// Outputs while the bus is driven: SCL, SDA, ADBUS3-7 and ACBUS6.
pub const BUS_PIN_MASK: u16 = 0x40FB;
/// Outputs while only the low byte is driven (ACBUS released).
pub const DATA_PIN_MASK: u16 = 0x00FB;
/// Every line released high: the bus idle level.
pub const PINS_RELEASED: u16 = 0xFFFF;
/// SCL high, SDA low.
pub const PINS_DATA_LOW: u16 = 0x00FD;
/// SCL low, SDA low.
pub const PINS_BOTH_LOW: u16 = 0x00FC;
/// SCL low, SDA released, ahead of an ACK clock.
pub const PINS_CLOCK_PULSE: u16 = 0x00FE;
/// Pins operated open-drain: SCL, SDA out and SDA in.
pub const DRIVE_LOW_PINS: u16 = 0x0007;

/// How many times each level of a START/STOP edge is repeated. The MPSSE
/// executes one `set_output` per clock tick, so repeating it holds the level
/// long enough for slow slaves and bus capacitance.
pub const SETTLE_REPEATS: usize = 5;

/// Master clock seen by the divisor once divide-by-5 is off and 3-phase
/// clocking stretches each bit to three half periods.
const THREE_PHASE_CLOCK_HZ: u32 = 20_000_000;

/// Bus clock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cSpeed {
    /// Target SCL frequency in Hz. The nearest frequency at or below it is
    /// used.
    Hz(u32),
    /// Raw MPSSE clock divisor.
    Divisor(u16),
}

impl Default for I2cSpeed {
    /// Standard mode, 100 kHz.
    fn default() -> Self {
        Self::Hz(100_000)
    }
}

impl I2cSpeed {
    /// The clock divisor to program.
    pub fn divisor(self) -> Result<u16> {
        match self {
            Self::Divisor(d) => Ok(d),
            Self::Hz(0) => Err(Error::InvalidArgument("I2C clock frequency must be > 0")),
            Self::Hz(hz) => {
                let div = THREE_PHASE_CLOCK_HZ.div_ceil(hz).saturating_sub(1);
                Ok(div.min(0xFFFF) as u16)
            }
        }
    }

    /// The SCL frequency the divisor produces.
    pub fn frequency_hz(self) -> Result<u32> {
        Ok(THREE_PHASE_CLOCK_HZ / (1 + self.divisor()? as u32))
    }
}

/// The R/W bit of an address byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Master transmits (R/W = 0).
    Write,
    /// Master receives (R/W = 1).
    Read,
}

/// Build the address byte for a 7-bit address.
pub fn address_byte(address: u8, direction: Direction) -> Result<u8> {
    if address > 0x7F {
        return Err(Error::InvalidArgument(
            "I2C address must be 7-bit (0x00-0x7F)",
        ));
    }
    let rw = match direction {
        Direction::Write => 0,
        Direction::Read => 1,
    };
    Ok((address << 1) | rw)
}

// ---- Result handles ----

/// The ACK bit sampled after one byte, readable once the batch completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckCheck {
    handle: CommandHandle,
    source: NackSource,
}

impl AckCheck {
    /// `true` if the slave pulled SDA low.
    pub fn acked(&self, batch: &CommandBatch) -> Result<bool> {
        let bits = batch.response(&self.handle)?;
        Ok(bits[0] & 0x01 == 0)
    }

    /// `Ok` on ACK, [`Error::I2cNack`] on NACK.
    pub fn check(&self, batch: &CommandBatch) -> Result<()> {
        if self.acked(batch)? {
            Ok(())
        } else {
            Err(Error::I2cNack(self.source))
        }
    }
}

/// The bytes of one multi-byte read, readable once the batch completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBack {
    handles: Vec<CommandHandle>,
}

impl ReadBack {
    /// Number of bytes read.
    pub fn len(&self) -> usize {
        self.handles.iter().map(CommandHandle::response_len).sum()
    }

    /// Whether no bytes were read.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the bytes, in bus order, into the front of `out`.
    pub fn copy_to(&self, batch: &CommandBatch, out: &mut [u8]) -> Result<()> {
        if out.len() < self.len() {
            return Err(Error::InvalidArgument("output buffer shorter than the read"));
        }
        let mut offset = 0;
        for handle in &self.handles {
            let bytes = batch.response(handle)?;
            out[offset..offset + bytes.len()].copy_from_slice(bytes);
            offset += bytes.len();
        }
        Ok(())
    }

    /// The bytes as a new vector.
    pub fn to_vec(&self, batch: &CommandBatch) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.len()];
        self.copy_to(batch, &mut out)?;
        Ok(out)
    }
}

fn repeat_output(batch: &mut CommandBatch, mask: u16, values: u16) -> Result<()> {
    for _ in 0..SETTLE_REPEATS {
        super::set_output(batch, mask, values)?;
    }
    Ok(())
}

// ---- Batch-level encoders ----

/// Configure the MPSSE for I2C: 60 MHz master clock, no adaptive clocking,
/// 3-phase clocking, open-drain bus pins, no loopback, and the bus clock.
pub fn encode_setup(batch: &mut CommandBatch, divisor: u16) -> Result<()> {
    super::disable_clock_divide_by_5(batch)?;
    super::disable_adaptive_clocking(batch)?;
    super::enable_3phase_clocking(batch)?;
    super::set_drive_low_pins(batch, DRIVE_LOW_PINS)?;
    super::disable_loopback(batch)?;
    super::set_clock_divisor(batch, divisor)?;
    Ok(())
}

/// Release SCL and SDA to the pull-ups.
pub fn encode_idle(batch: &mut CommandBatch) -> Result<()> {
    super::set_output(batch, BUS_PIN_MASK, PINS_RELEASED)?;
    Ok(())
}

/// START condition: SDA falls while SCL is high, then SCL falls.
///
/// From anywhere other than idle (a repeated START) encode an
/// [`encode_idle`] first.
pub fn encode_start(batch: &mut CommandBatch) -> Result<()> {
    repeat_output(batch, DATA_PIN_MASK, PINS_DATA_LOW)?;
    repeat_output(batch, BUS_PIN_MASK, PINS_BOTH_LOW)
}

/// STOP condition, ending with the bus released.
///
/// Both lines are brought low, SCL is released while SDA stays low, and
/// finally SDA rises with the rest of the bus. Only the last step drives
/// ACBUS, so the first two use the low-byte mask.
pub fn encode_stop(batch: &mut CommandBatch) -> Result<()> {
    repeat_output(batch, DATA_PIN_MASK, PINS_BOTH_LOW)?;
    repeat_output(batch, DATA_PIN_MASK, PINS_DATA_LOW)?;
    repeat_output(batch, BUS_PIN_MASK, PINS_RELEASED)
}

/// Clock one byte out and sample the slave's ACK.
pub fn encode_send_byte(batch: &mut CommandBatch, byte: u8) -> Result<AckCheck> {
    encode_byte(batch, byte, NackSource::Data)
}

/// Clock out the address byte for `address` and sample the ACK.
pub fn encode_send_address(
    batch: &mut CommandBatch,
    address: u8,
    direction: Direction,
) -> Result<AckCheck> {
    let byte = address_byte(address, direction)?;
    encode_byte(batch, byte, NackSource::Address)
}

fn encode_byte(batch: &mut CommandBatch, byte: u8, source: NackSource) -> Result<AckCheck> {
    super::write_bytes(batch, &[byte])?;
    super::set_output(batch, DATA_PIN_MASK, PINS_CLOCK_PULSE)?;
    let handle = super::read_bits(batch, 1)?;
    Ok(AckCheck { handle, source })
}

/// Clock `len` bytes in, ACKing all but the last and NACKing the last so
/// the slave stops driving SDA.
pub fn encode_read_bytes(batch: &mut CommandBatch, len: usize) -> Result<ReadBack> {
    encode_read(batch, len, true)
}

/// Like [`encode_read_bytes`], but the last byte is only NACKed when
/// `nack_last` is set, so a read can continue in the next call.
pub(crate) fn encode_read(
    batch: &mut CommandBatch,
    len: usize,
    nack_last: bool,
) -> Result<ReadBack> {
    let mut read = ReadBack::default();
    read.handles.reserve(len);
    for i in 0..len {
        read.handles.push(super::read_bytes(batch, 1)?);
        let nack = nack_last && i + 1 == len;
        super::write_bits(batch, if nack { 0xFF } else { 0x00 }, 1)?;
        super::set_output(batch, DATA_PIN_MASK, PINS_CLOCK_PULSE)?;
    }
    Ok(read)
}

/// Check ACKs in bus order and report the first NACK.
pub fn check_acks(batch: &CommandBatch, acks: &[AckCheck]) -> Result<()> {
    acks.iter().try_for_each(|ack| ack.check(batch))
}

// ---- Session-level bus ----

/// I2C bus master on one [`TransportSession`].
///
/// Keeps one command batch that is reset and reused for every operation.
/// Each method is one USB round trip.
#[derive(Debug)]
pub struct I2cBus {
    speed: I2cSpeed,
    batch: CommandBatch,
}

impl I2cBus {
    /// Configure the MPSSE for I2C at `speed` and release the bus.
    ///
    /// The session should already be verified.
    pub fn new<T: Transport>(session: &mut TransportSession<T>, speed: I2cSpeed) -> Result<Self> {
        let mut bus = Self {
            speed,
            batch: CommandBatch::new(),
        };
        bus.configure(session)?;
        Ok(bus)
    }

    /// Re-send the I2C configuration, e.g. after
    /// [`TransportSession::reset`].
    pub fn configure<T: Transport>(&mut self, session: &mut TransportSession<T>) -> Result<()> {
        let divisor = self.speed.divisor()?;
        debug!("I2C setup: divisor {divisor}, {} Hz", self.speed.frequency_hz()?);

        self.batch.reset();
        encode_setup(&mut self.batch, divisor)?;
        encode_idle(&mut self.batch)?;
        session.submit(&mut self.batch)
    }

    /// The bus speed set at construction.
    pub fn speed(&self) -> I2cSpeed {
        self.speed
    }

    fn run<T, R>(
        &mut self,
        session: &mut TransportSession<T>,
        encode: impl FnOnce(&mut CommandBatch) -> Result<R>,
    ) -> Result<R>
    where
        T: Transport,
    {
        self.batch.reset();
        let pending = encode(&mut self.batch)?;
        session.submit(&mut self.batch)?;
        Ok(pending)
    }

    /// Release the bus.
    pub fn idle<T: Transport>(&mut self, session: &mut TransportSession<T>) -> Result<()> {
        self.run(session, encode_idle)
    }

    /// Generate a START condition.
    pub fn start<T: Transport>(&mut self, session: &mut TransportSession<T>) -> Result<()> {
        self.run(session, encode_start)
    }

    /// Generate a STOP condition.
    pub fn stop<T: Transport>(&mut self, session: &mut TransportSession<T>) -> Result<()> {
        self.run(session, encode_stop)
    }

    /// Write one byte. A NACK is returned as [`Error::I2cNack`]; the caller
    /// should [`stop`](Self::stop) and may retry the transaction.
    pub fn send_byte<T: Transport>(
        &mut self,
        session: &mut TransportSession<T>,
        byte: u8,
    ) -> Result<()> {
        let ack = self.run(session, |batch| encode_send_byte(batch, byte))?;
        ack.check(&self.batch)
    }

    /// Write the address byte for a 7-bit `address`.
    pub fn send_address<T: Transport>(
        &mut self,
        session: &mut TransportSession<T>,
        address: u8,
        direction: Direction,
    ) -> Result<()> {
        let ack = self.run(session, |batch| encode_send_address(batch, address, direction))?;
        ack.check(&self.batch)
    }

    /// Read `buf.len()` bytes from the addressed slave.
    pub fn read_bytes<T: Transport>(
        &mut self,
        session: &mut TransportSession<T>,
        buf: &mut [u8],
    ) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let read = self.run(session, |batch| encode_read_bytes(batch, buf.len()))?;
        read.copy_to(&self.batch, buf)
    }

    /// Write `data` to `address`: START, address+W, data, STOP.
    pub fn write<T: Transport>(
        &mut self,
        session: &mut TransportSession<T>,
        address: u8,
        data: &[u8],
    ) -> Result<()> {
        self.write_read(session, address, data, &mut [])
    }

    /// Read `buf.len()` bytes from `address`: START, address+R, data, STOP.
    pub fn read<T: Transport>(
        &mut self,
        session: &mut TransportSession<T>,
        address: u8,
        buf: &mut [u8],
    ) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let (acks, read) = self.run(session, |batch| {
            encode_start(batch)?;
            let ack = encode_send_address(batch, address, Direction::Read)?;
            let read = encode_read_bytes(batch, buf.len())?;
            encode_stop(batch)?;
            Ok((vec![ack], read))
        })?;
        self.finish(address, &acks)?;
        read.copy_to(&self.batch, buf)
    }

    /// Write `data`, then read `buf.len()` bytes after a repeated START.
    ///
    /// The usual register read: `data` holds the register pointer. With an
    /// empty `buf` this is a plain write.
    pub fn write_read<T: Transport>(
        &mut self,
        session: &mut TransportSession<T>,
        address: u8,
        data: &[u8],
        buf: &mut [u8],
    ) -> Result<()> {
        if data.is_empty() && !buf.is_empty() {
            return self.read(session, address, buf);
        }

        let (acks, read) = self.run(session, |batch| {
            let mut acks = Vec::with_capacity(data.len() + 2);
            encode_start(batch)?;
            acks.push(encode_send_address(batch, address, Direction::Write)?);
            for &byte in data {
                acks.push(encode_send_byte(batch, byte)?);
            }

            let mut read = ReadBack::default();
            if !buf.is_empty() {
                encode_idle(batch)?;
                encode_start(batch)?;
                acks.push(encode_send_address(batch, address, Direction::Read)?);
                read = encode_read_bytes(batch, buf.len())?;
            }
            encode_stop(batch)?;
            Ok((acks, read))
        })?;
        self.finish(address, &acks)?;
        read.copy_to(&self.batch, buf)
    }

    fn finish(&self, address: u8, acks: &[AckCheck]) -> Result<()> {
        check_acks(&self.batch, acks).inspect_err(|err| {
            warn!("I2C transaction to {address:#04x} aborted: {err}");
        })
    }
}
