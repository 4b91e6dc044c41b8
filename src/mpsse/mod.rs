//! MPSSE (Multi-Protocol Synchronous Serial Engine) command encoders.
//!
//! Every function appends exactly one MPSSE command to a [`CommandBatch`].
//! Nothing is sent to the device here; the batch goes out as a whole through
//! [`TransportSession::submit`](crate::TransportSession::submit). Commands
//! that make the chip send data back also reserve room for that data in the
//! batch response stream, and the returned [`CommandHandle`] is how the
//! caller finds it after submission.
//!
//! Read commands are always followed by `SEND_IMMEDIATE` so the chip flushes
//! its reply right away instead of waiting for its buffer to fill up.
//!
//! # Example
//!
//! ```
//! use ftdi_i2c::{mpsse, CommandBatch};
//!
//! let mut batch = CommandBatch::new();
//! mpsse::set_clock_divisor(&mut batch, 199)?;
//! mpsse::write_bytes(&mut batch, &[0xA0])?;
//! let ack = mpsse::read_bits(&mut batch, 1)?;
//!
//! assert_eq!(batch.commands(), &[0x86, 0xC7, 0x00, 0x11, 0x00, 0x00, 0xA0, 0x22, 0x00, 0x87]);
//! assert_eq!(ack.response_len(), 1);
//! # Ok::<(), ftdi_i2c::Error>(())
//! ```

pub mod i2c;

use crate::batch::{CommandBatch, CommandHandle};
use crate::constants::mpsse;
use crate::error::{Error, Result};

fn length_field(len: usize) -> [u8; 2] {
    // Callers guarantee 1 <= len <= MAX_TRANSFER_BYTES.
    ((len - 1) as u16).to_le_bytes()
}

/// Use the 60 MHz master clock instead of 12 MHz (H-type chips).
pub fn disable_clock_divide_by_5(batch: &mut CommandBatch) -> Result<CommandHandle> {
    batch.push(&[mpsse::DIS_DIV_5], 0)
}

/// Stop waiting on the RTCK input before each clock edge.
pub fn disable_adaptive_clocking(batch: &mut CommandBatch) -> Result<CommandHandle> {
    batch.push(&[mpsse::DIS_ADAPTIVE], 0)
}

/// Connect TDI/DO to TDO/DI internally.
pub fn enable_loopback(batch: &mut CommandBatch) -> Result<CommandHandle> {
    batch.push(&[mpsse::LOOPBACK_START], 0)
}

/// Reconnect TDI/DO and TDO/DI to the pins.
pub fn disable_loopback(batch: &mut CommandBatch) -> Result<CommandHandle> {
    batch.push(&[mpsse::LOOPBACK_END], 0)
}

/// Hold data valid on both clock edges, as I2C requires.
pub fn enable_3phase_clocking(batch: &mut CommandBatch) -> Result<CommandHandle> {
    batch.push(&[mpsse::EN_3_PHASE], 0)
}

/// Make the pins in `mask` open-drain: they only ever drive low, a `1`
/// releases them to the pull-up.
pub fn set_drive_low_pins(batch: &mut CommandBatch, mask: u16) -> Result<CommandHandle> {
    let [lo, hi] = mask.to_le_bytes();
    batch.push(&[mpsse::DRIVE_OPEN_COLLECTOR, lo, hi], 0)
}

/// Set the clock divisor. The resulting clock is
/// `master / ((1 + divisor) * 2)`.
pub fn set_clock_divisor(batch: &mut CommandBatch, divisor: u16) -> Result<CommandHandle> {
    let [lo, hi] = divisor.to_le_bytes();
    batch.push(&[mpsse::TCK_DIVISOR, lo, hi], 0)
}

/// Set direction and level of all 16 GPIO pins.
///
/// `mask` selects outputs (bit set) and `values` their levels. The low byte
/// goes to ADBUS, the high byte to ACBUS.
pub fn set_output(batch: &mut CommandBatch, mask: u16, values: u16) -> Result<CommandHandle> {
    let [mask_lo, mask_hi] = mask.to_le_bytes();
    let [val_lo, val_hi] = values.to_le_bytes();
    batch.push(
        &[
            mpsse::SET_BITS_LOW,
            val_lo,
            mask_lo,
            mpsse::SET_BITS_HIGH,
            val_hi,
            mask_hi,
        ],
        0,
    )
}

/// Clock `data` out MSB first.
///
/// An empty slice adds nothing and returns an empty handle.
pub fn write_bytes(batch: &mut CommandBatch, data: &[u8]) -> Result<CommandHandle> {
    if data.is_empty() {
        return batch.reserve(0, 0);
    }
    if data.len() > mpsse::MAX_TRANSFER_BYTES {
        return Err(Error::InvalidArgument(
            "write length exceeds 65535 bytes",
        ));
    }

    let handle = batch.reserve(3 + data.len(), 0)?;
    let buf = batch.command_mut(&handle)?;
    buf[0] = mpsse::WRITE_BYTES;
    buf[1..3].copy_from_slice(&length_field(data.len()));
    buf[3..].copy_from_slice(data);
    Ok(handle)
}

/// Clock `len` bytes in MSB first. The handle's response holds them.
pub fn read_bytes(batch: &mut CommandBatch, len: usize) -> Result<CommandHandle> {
    if len == 0 {
        return batch.reserve(0, 0);
    }
    if len > mpsse::MAX_TRANSFER_BYTES {
        return Err(Error::InvalidArgument("read length exceeds 65535 bytes"));
    }

    let [lo, hi] = length_field(len);
    batch.push(&[mpsse::READ_BYTES, lo, hi, mpsse::SEND_IMMEDIATE], len)
}

/// Clock the top `bits` bits of `data` out, MSB first.
pub fn write_bits(batch: &mut CommandBatch, data: u8, bits: u8) -> Result<CommandHandle> {
    if bits == 0 {
        return batch.reserve(0, 0);
    }
    if bits > mpsse::MAX_TRANSFER_BITS {
        return Err(Error::InvalidArgument("bit count must be 1..=8"));
    }
    batch.push(&[mpsse::WRITE_BITS, bits - 1, data], 0)
}

/// Clock `bits` bits in. The chip returns them in one byte, the last bit
/// sampled in the least significant position.
pub fn read_bits(batch: &mut CommandBatch, bits: u8) -> Result<CommandHandle> {
    if bits == 0 {
        return batch.reserve(0, 0);
    }
    if bits > mpsse::MAX_TRANSFER_BITS {
        return Err(Error::InvalidArgument("bit count must be 1..=8"));
    }
    batch.push(&[mpsse::READ_BITS, bits - 1, mpsse::SEND_IMMEDIATE], 1)
}

/// Send an opcode the chip does not implement.
///
/// A chip in MPSSE mode answers with `BAD_COMMAND` followed by the opcode,
/// which is what the session's handshake relies on.
pub fn bad_command(batch: &mut CommandBatch, opcode: u8) -> Result<CommandHandle> {
    batch.push(&[opcode], 2)
}
