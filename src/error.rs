//! Error types for the ftdi-i2c crate.

use std::collections::TryReserveError;

/// Which part of an I2C transfer was not acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NackSource {
    /// The address byte (slave not present or busy).
    Address,
    /// A data byte written after the address.
    Data,
}

impl std::fmt::Display for NackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address => write!(f, "address not acknowledged"),
            Self::Data => write!(f, "data byte not acknowledged"),
        }
    }
}

/// The error type for MPSSE and I2C operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the nusb USB layer.
    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    /// A USB transfer error.
    #[error("USB transfer error: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// No matching device was found.
    #[error("device not found")]
    DeviceNotFound,

    /// The device did not deliver the expected number of bytes in time.
    #[error("timed out: expected {expected} bytes, received {received}")]
    Timeout {
        /// Number of bytes the batch reserved.
        expected: usize,
        /// Number of bytes received before the deadline.
        received: usize,
    },

    /// The outbound pipe accepted fewer bytes than the command stream holds.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Length of the command stream.
        expected: usize,
        /// Bytes the pipe accepted.
        written: usize,
    },

    /// A bit mode change was not followed by exactly two status bytes.
    #[error("bit mode change returned {received} status bytes, expected 2")]
    ModeSwitch {
        /// Number of bytes the device returned.
        received: usize,
    },

    /// The bad-command echo handshake returned unexpected bytes.
    #[error("MPSSE verification failed for opcode {opcode:#04x}: got {response:02x?}")]
    Verification {
        /// The deliberately invalid opcode that was sent.
        opcode: u8,
        /// What the device sent back.
        response: Vec<u8>,
    },

    /// An I2C slave did not acknowledge a byte.
    #[error("I2C NACK: {0}")]
    I2cNack(NackSource),

    /// Growing a command batch failed.
    #[error("command batch allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    /// Invalid argument(s) were provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A handle was used with a batch that has been reset, or with a
    /// different batch than the one it was reserved from.
    #[error("command handle does not belong to the current batch contents")]
    StaleHandle,

    /// Response data was requested before the batch completed a submission.
    #[error("batch has not completed a submission")]
    ResponsePending,

    /// The session saw a transport failure and must be reset first.
    #[error("session is faulted; reset() is required")]
    SessionFaulted,
}

impl Error {
    /// Whether this error leaves the device in an unknown state.
    ///
    /// When `true` the only way forward is
    /// [`TransportSession::reset`](crate::TransportSession::reset) followed by
    /// [`verify`](crate::TransportSession::verify). A NACK only aborts the
    /// current I2C transaction, and the programming errors never reached the
    /// device.
    pub fn requires_reset(&self) -> bool {
        !matches!(
            self,
            Error::I2cNack(_)
                | Error::InvalidArgument(_)
                | Error::StaleHandle
                | Error::ResponsePending
                | Error::Allocation(_)
        )
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nack_is_recoverable() {
        assert!(!Error::I2cNack(NackSource::Address).requires_reset());
        assert!(!Error::I2cNack(NackSource::Data).requires_reset());
    }

    #[test]
    fn transport_failures_require_reset() {
        assert!(Error::Timeout { expected: 4, received: 1 }.requires_reset());
        assert!(Error::ShortWrite { expected: 6, written: 0 }.requires_reset());
        assert!(Error::Verification { opcode: 0xAA, response: vec![0, 0] }.requires_reset());
        assert!(Error::SessionFaulted.requires_reset());
    }

    #[test]
    fn display_messages() {
        let err = Error::I2cNack(NackSource::Address);
        assert_eq!(err.to_string(), "I2C NACK: address not acknowledged");

        let err = Error::Verification { opcode: 0xAB, response: vec![0xFA, 0x00] };
        assert_eq!(
            err.to_string(),
            "MPSSE verification failed for opcode 0xab: got [fa, 00]"
        );
    }
}
