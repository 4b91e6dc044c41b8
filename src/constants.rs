//! Protocol constants for FTDI MPSSE communication.
//!
//! These constants define the USB vendor request codes and the MPSSE opcode
//! set. Most users should not need to use these directly.

// ---- FTDI Vendor ID and known Product IDs ----

/// Default FTDI vendor ID.
pub const FTDI_VID: u16 = 0x0403;

/// Known FTDI product IDs of MPSSE-capable chips.
pub mod pid {
    /// FT2232C/D/H.
    pub const FT2232: u16 = 0x6010;
    /// FT4232H.
    pub const FT4232: u16 = 0x6011;
    /// FT232H.
    pub const FT232H: u16 = 0x6014;
}

// ---- SIO vendor request codes ----

/// Reset / purge the port.
pub(crate) const SIO_RESET_REQUEST: u8 = 0x00;
/// Set event character.
pub(crate) const SIO_SET_EVENT_CHAR_REQUEST: u8 = 0x06;
/// Set error character.
pub(crate) const SIO_SET_ERROR_CHAR_REQUEST: u8 = 0x07;
/// Set bitbang mode.
pub(crate) const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;

// ---- Reset sub-commands ----

/// Reset the SIO engine and purge both directions.
pub(crate) const SIO_RESET_SIO: u16 = 0;
/// Purge the RX FIFO.
pub(crate) const SIO_RESET_PURGE_RX: u16 = 1;
/// Purge the TX FIFO.
pub(crate) const SIO_RESET_PURGE_TX: u16 = 2;

/// Special character value that leaves the feature disabled.
pub(crate) const SIO_CHAR_DISABLED: u16 = 0x0000;

// ---- MPSSE commands ----

/// MPSSE opcodes, exposed for users building their own command batches.
pub mod mpsse {
    // Shifting commands, MSB first, write on -ve edge / read on +ve edge
    /// Clock bytes out on the negative edge.
    pub const WRITE_BYTES: u8 = 0x11;
    /// Clock bits out on the negative edge.
    pub const WRITE_BITS: u8 = 0x13;
    /// Clock bytes in on the positive edge.
    pub const READ_BYTES: u8 = 0x20;
    /// Clock bits in on the positive edge.
    pub const READ_BITS: u8 = 0x22;

    // Pin commands
    /// Set data bits low byte.
    pub const SET_BITS_LOW: u8 = 0x80;
    /// Set data bits high byte.
    pub const SET_BITS_HIGH: u8 = 0x82;
    /// Enable loopback.
    pub const LOOPBACK_START: u8 = 0x84;
    /// Disable loopback.
    pub const LOOPBACK_END: u8 = 0x85;
    /// Set TCK divisor.
    pub const TCK_DIVISOR: u8 = 0x86;
    /// Send immediate (flush the response buffer).
    pub const SEND_IMMEDIATE: u8 = 0x87;

    // H-type specific commands
    /// Disable divide-by-5 prescaler (use 60 MHz master clock).
    pub const DIS_DIV_5: u8 = 0x8A;
    /// Enable 3-phase data clocking.
    pub const EN_3_PHASE: u8 = 0x8C;
    /// Disable adaptive clocking.
    pub const DIS_ADAPTIVE: u8 = 0x97;
    /// Drive open-collector outputs (FT232H only).
    pub const DRIVE_OPEN_COLLECTOR: u8 = 0x9E;

    /// First byte of the chip's reply to an opcode it does not know.
    pub const BAD_COMMAND: u8 = 0xFA;

    /// Largest length a byte shifting command can encode.
    pub const MAX_TRANSFER_BYTES: usize = 0xFFFF;
    /// Largest length a bit shifting command can encode.
    pub const MAX_TRANSFER_BITS: u8 = 8;
}
