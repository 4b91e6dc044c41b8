//! The byte pipe a [`TransportSession`](crate::TransportSession) drives.
//!
//! A transport is one opened FTDI interface: a vendor control endpoint, a
//! bulk OUT endpoint for MPSSE commands and a bulk IN endpoint for the
//! replies. [`FtdiDevice`](crate::FtdiDevice) is the USB implementation; tests
//! plug in fakes that emulate the MPSSE engine.

use std::time::Duration;

use crate::error::Result;
use crate::types::ModemStatus;

/// Raw access to an FTDI interface.
pub trait Transport {
    /// Send a vendor OUT control request with an empty data stage.
    ///
    /// The transport supplies the `wIndex` that addresses its interface.
    fn control_out(&mut self, request: u8, value: u16, timeout: Duration) -> Result<()>;

    /// Write `data` to the bulk OUT endpoint and return how many bytes the
    /// device accepted.
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Read payload bytes from the bulk IN endpoint.
    ///
    /// Returns `Ok(0)` when the device has nothing pending. Modem status
    /// headers are never part of the payload.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Read the status-only packet the chip sends after a bit mode change.
    ///
    /// Fails with [`Error::ModeSwitch`](crate::Error::ModeSwitch) unless the
    /// packet is exactly the two status bytes.
    fn read_status(&mut self, timeout: Duration) -> Result<ModemStatus>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn control_out(&mut self, request: u8, value: u16, timeout: Duration) -> Result<()> {
        (**self).control_out(request, value, timeout)
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).write(data, timeout)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }

    fn read_status(&mut self, timeout: Duration) -> Result<ModemStatus> {
        (**self).read_status(timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn control_out(&mut self, request: u8, value: u16, timeout: Duration) -> Result<()> {
        (**self).control_out(request, value, timeout)
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).write(data, timeout)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }

    fn read_status(&mut self, timeout: Duration) -> Result<ModemStatus> {
        (**self).read_status(timeout)
    }
}
