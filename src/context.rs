//! USB transport for FTDI chips, built on nusb.
//!
//! [`FtdiDevice`] claims one interface of an FTDI chip and implements
//! [`Transport`] for it. All configuration beyond claiming the interface
//! (purging, bit mode) is done by
//! [`TransportSession`](crate::TransportSession).

use std::time::Duration;

use log::{debug, trace};
use nusb::transfer::{Buffer, Bulk, ControlOut, ControlType, In, Out, Recipient, TransferError};
use nusb::{DeviceInfo, MaybeFuture};

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::types::{Interface, ModemStatus};

/// Size of one bulk IN request. A multiple of every FTDI packet size.
const READ_CHUNKSIZE: usize = 4096;

/// Packet size assumed when the descriptors cannot be read (H-type chips).
const FALLBACK_PACKET_SIZE: usize = 512;

/// One claimed interface of an FTDI USB device.
///
/// ```no_run
/// use ftdi_i2c::{FtdiDevice, Interface, TransportSession};
///
/// let dev = FtdiDevice::open_with_interface(0x0403, 0x6010, Interface::B)?;
/// let mut session = TransportSession::open(dev)?;
/// session.verify()?;
/// # Ok::<(), ftdi_i2c::Error>(())
/// ```
pub struct FtdiDevice {
    #[allow(dead_code)] // Kept to ensure the USB device stays open
    device: nusb::Device,
    interface: nusb::Interface,

    max_packet_size: usize,
    interface_num: u8,
    usb_index: u16,
    write_ep: u8,
    read_ep: u8,

    // Payload left over from a bulk read larger than the caller's buffer,
    // modem status already stripped.
    readbuffer: Vec<u8>,
    readbuffer_offset: usize,
    readbuffer_remaining: usize,
}

impl std::fmt::Debug for FtdiDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtdiDevice")
            .field("interface", &self.interface_num)
            .field("max_packet_size", &self.max_packet_size)
            .field("buffered", &self.readbuffer_remaining)
            .finish_non_exhaustive()
    }
}

impl FtdiDevice {
    /// Open the first device matching the vendor and product IDs, on
    /// [`Interface::A`].
    pub fn open(vendor: u16, product: u16) -> Result<Self> {
        Self::open_with_interface(vendor, product, Interface::A)
    }

    /// Open the first matching device on a specific interface.
    pub fn open_with_interface(vendor: u16, product: u16, iface: Interface) -> Result<Self> {
        let dev_info = nusb::list_devices()
            .wait()?
            .find(|d| d.vendor_id() == vendor && d.product_id() == product)
            .ok_or(Error::DeviceNotFound)?;

        Self::from_device_info(dev_info, iface)
    }

    /// Open a device from an already-discovered [`nusb::DeviceInfo`].
    pub fn from_device_info(dev_info: DeviceInfo, iface: Interface) -> Result<Self> {
        let config = iface.config();
        debug!(
            "opening {:04x}:{:04x} interface {:?}",
            dev_info.vendor_id(),
            dev_info.product_id(),
            iface
        );

        let device = dev_info.open().wait()?;

        // Detach kernel driver (ftdi_sio) and claim interface
        let interface = device
            .detach_and_claim_interface(config.interface_num)
            .wait()?;

        let max_packet_size = determine_max_packet_size(&device, config.interface_num);
        debug!("max packet size {max_packet_size}");

        Ok(Self {
            device,
            interface,
            max_packet_size,
            interface_num: config.interface_num,
            usb_index: config.usb_index,
            write_ep: config.write_ep,
            read_ep: config.read_ep,
            readbuffer: vec![0u8; READ_CHUNKSIZE],
            readbuffer_offset: 0,
            readbuffer_remaining: 0,
        })
    }

    /// The maximum USB packet size of the bulk endpoints.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// One bulk IN request into the read buffer. `None` means it timed out.
    fn bulk_read(&mut self, timeout: Duration) -> Result<Option<usize>> {
        let mut ep = self.interface.endpoint::<Bulk, In>(self.read_ep)?;

        let completion = ep.transfer_blocking(Buffer::new(READ_CHUNKSIZE), timeout);
        match completion.status {
            Ok(()) => {}
            Err(TransferError::Cancelled) => return Ok(None),
            Err(err) => return Err(Error::Transfer(err)),
        }

        let actual = completion.actual_len;
        let raw = completion.buffer.into_vec();
        self.readbuffer[..actual].copy_from_slice(&raw[..actual]);
        Ok(Some(actual))
    }
}

impl Transport for FtdiDevice {
    fn control_out(&mut self, request: u8, value: u16, timeout: Duration) -> Result<()> {
        trace!("control out: request {request:#04x} value {value:#06x}");
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index: self.usb_index,
                    data: &[],
                },
                timeout,
            )
            .wait()?;

        if request == crate::constants::SIO_RESET_REQUEST {
            self.readbuffer_offset = 0;
            self.readbuffer_remaining = 0;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        trace!("bulk out: {data:02x?}");

        let mut ep = self.interface.endpoint::<Bulk, Out>(self.write_ep)?;
        let mut transfer_buf = Buffer::new(data.len());
        transfer_buf.extend_from_slice(data);

        let completion = ep.transfer_blocking(transfer_buf, timeout);
        match completion.status {
            Ok(()) => Ok(completion.actual_len),
            // A timed-out write may still have moved part of the data.
            Err(TransferError::Cancelled) => Ok(completion.actual_len),
            Err(err) => Err(Error::Transfer(err)),
        }
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // Serve from internal buffer first
        if self.readbuffer_remaining > 0 {
            let n = self.readbuffer_remaining.min(buf.len());
            let start = self.readbuffer_offset;
            buf[..n].copy_from_slice(&self.readbuffer[start..start + n]);
            self.readbuffer_remaining -= n;
            self.readbuffer_offset += n;
            return Ok(n);
        }

        let Some(actual) = self.bulk_read(timeout)? else {
            return Err(Error::Timeout {
                expected: buf.len(),
                received: 0,
            });
        };

        // Strip 2-byte modem status from each max_packet_size chunk
        let stripped = strip_modem_status(&mut self.readbuffer[..actual], self.max_packet_size);
        if stripped == 0 {
            return Ok(0);
        }
        trace!("bulk in: {:02x?}", &self.readbuffer[..stripped]);

        let n = stripped.min(buf.len());
        buf[..n].copy_from_slice(&self.readbuffer[..n]);
        self.readbuffer_offset = n;
        self.readbuffer_remaining = stripped - n;
        Ok(n)
    }

    fn read_status(&mut self, timeout: Duration) -> Result<ModemStatus> {
        self.readbuffer_offset = 0;
        self.readbuffer_remaining = 0;

        let Some(actual) = self.bulk_read(timeout)? else {
            return Err(Error::ModeSwitch { received: 0 });
        };
        if actual != 2 {
            return Err(Error::ModeSwitch { received: actual });
        }
        let status = ModemStatus::from_bytes([self.readbuffer[0], self.readbuffer[1]]);
        trace!("modem status {:#06x}", status.raw());
        Ok(status)
    }
}

/// Strip the 2-byte modem status header from each packet in a raw USB bulk
/// read result. Returns the total number of payload bytes after stripping.
///
/// The data is compacted in-place: payload bytes are moved to fill the
/// gaps left by removed status bytes.
fn strip_modem_status(data: &mut [u8], packet_size: usize) -> usize {
    let total = data.len();
    if total <= 2 || packet_size <= 2 {
        return 0;
    }

    let mut write_pos = 0;
    for pkt_start in (0..total).step_by(packet_size) {
        let pkt_end = (pkt_start + packet_size).min(total);
        if pkt_end - pkt_start <= 2 {
            continue;
        }

        let payload = pkt_start + 2..pkt_end;
        let payload_len = payload.len();
        data.copy_within(payload, write_pos);
        write_pos += payload_len;
    }

    write_pos
}

fn determine_max_packet_size(device: &nusb::Device, interface_num: u8) -> usize {
    let Ok(config) = device.active_configuration() else {
        return FALLBACK_PACKET_SIZE;
    };

    for iface_group in config.interfaces() {
        if iface_group.interface_number() != interface_num {
            continue;
        }
        for alt in iface_group.alt_settings() {
            if let Some(ep) = alt.endpoints().next() {
                return ep.max_packet_size();
            }
        }
    }

    FALLBACK_PACKET_SIZE
}
