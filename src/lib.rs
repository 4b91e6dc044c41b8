//! I2C master over FTDI MPSSE, in pure Rust.
//!
//! This crate drives the MPSSE engine of FTDI H-type chips (FT2232H,
//! FT4232H, FT232H) to act as an I2C bus master. It uses
//! [nusb](https://crates.io/crates/nusb) as the USB backend, so no C
//! dependencies or `libusb` are required.
//!
//! # Layers
//!
//! - [`mpsse`]: encoders that append MPSSE opcodes to a [`CommandBatch`].
//! - [`TransportSession`]: puts the chip into MPSSE mode, checks that the
//!   command processor answers, and runs batches as one write plus one read.
//! - [`mpsse::i2c`]: START/STOP, byte transfers with ACK checking and whole
//!   register reads built from those encoders.
//! - [`Transport`]: the byte pipe underneath, implemented for USB by
//!   [`FtdiDevice`].
//!
//! # Quick Start
//!
//! ```no_run
//! use ftdi_i2c::{constants::pid, FtdiDevice, TransportSession, FTDI_VID};
//! use ftdi_i2c::mpsse::i2c::{I2cBus, I2cSpeed};
//!
//! let dev = FtdiDevice::open(FTDI_VID, pid::FT232H)?;
//! let mut session = TransportSession::open(dev)?;
//! session.verify()?;
//!
//! let mut i2c = I2cBus::new(&mut session, I2cSpeed::Hz(100_000))?;
//! let mut id = [0u8; 4];
//! i2c.write_read(&mut session, 0x50, &[0x00], &mut id)?;
//! # Ok::<(), ftdi_i2c::Error>(())
//! ```
//!
//! # Errors and recovery
//!
//! A NACK only aborts the current I2C transaction. Anything that leaves the
//! USB pipe in an unknown state faults the session; see
//! [`Error::requires_reset`].

#![warn(missing_docs)]

mod batch;
pub mod constants;
pub mod context;
pub mod error;
#[cfg(feature = "embedded-hal")]
pub mod hal;
pub mod mpsse;
pub mod session;
pub mod transport;
pub mod types;

// ---- Convenience re-exports ----

pub use batch::{CommandBatch, CommandHandle};
pub use constants::FTDI_VID;
pub use context::FtdiDevice;
pub use error::{Error, NackSource, Result};
pub use session::{SessionState, TransportSession, DEFAULT_IO_TIMEOUT};
pub use transport::Transport;
pub use types::*;
