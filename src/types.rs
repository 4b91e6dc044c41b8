//! Type definitions shared by the transport and session layers.

/// Bitbang / MPSSE mode selection for the set-bit-mode vendor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitMode {
    /// Normal serial/FIFO mode (bitbang disabled).
    #[default]
    Reset,
    /// MPSSE command processor.
    Mpsse,
}

impl BitMode {
    /// Wire value for the SIO_SET_BITMODE request, pin mask in the low byte.
    pub(crate) fn wire_value(self, bitmask: u8) -> u16 {
        let mode: u16 = match self {
            Self::Reset => 0x00,
            Self::Mpsse => 0x02,
        };
        (mode << 8) | bitmask as u16
    }
}

/// Port interface selection for multi-interface chips.
///
/// Chips like the FT2232H (dual) and FT4232H (quad) expose multiple
/// independent interfaces. Only A and B carry an MPSSE engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interface {
    /// Interface A (port 0).
    #[default]
    A,
    /// Interface B (port 1).
    B,
}

/// Decoded modem status from the FTDI chip.
///
/// The chip sends two status bytes as a header with every USB read. After a
/// bit mode change it sends a packet holding nothing but this header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemStatus {
    raw: u16,
}

impl ModemStatus {
    /// Create from the two header bytes.
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            raw: u16::from_le_bytes(bytes),
        }
    }

    /// Raw 16-bit status value.
    pub fn raw(self) -> u16 {
        self.raw
    }

    /// Transmitter Empty (TEMT).
    pub fn transmitter_empty(self) -> bool {
        self.raw & 0x4000 != 0
    }

    /// Error in RCVR FIFO.
    pub fn fifo_error(self) -> bool {
        self.raw & 0x8000 != 0
    }
}

/// Interface configuration resolved to concrete USB endpoint values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InterfaceConfig {
    /// The USB interface number (0-based).
    pub interface_num: u8,
    /// The USB index value used in control transfers (1-based).
    pub usb_index: u16,
    /// The bulk OUT endpoint address (host-to-device, for writing data).
    pub write_ep: u8,
    /// The bulk IN endpoint address (device-to-host, for reading data).
    pub read_ep: u8,
}

impl Interface {
    /// Resolve to concrete USB endpoint configuration.
    pub(crate) fn config(self) -> InterfaceConfig {
        match self {
            Self::A => InterfaceConfig {
                interface_num: 0,
                usb_index: 1,
                write_ep: 0x02,
                read_ep: 0x81,
            },
            Self::B => InterfaceConfig {
                interface_num: 1,
                usb_index: 2,
                write_ep: 0x04,
                read_ep: 0x83,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmode_wire_values() {
        assert_eq!(BitMode::Reset.wire_value(0), 0x0000);
        assert_eq!(BitMode::Mpsse.wire_value(0), 0x0200);
        assert_eq!(BitMode::Mpsse.wire_value(0x0B), 0x020B);
    }

    #[test]
    fn modem_status_from_header() {
        let status = ModemStatus::from_bytes([0x32, 0x60]);
        assert_eq!(status.raw(), 0x6032);
        assert!(status.transmitter_empty());
        assert!(!status.fifo_error());
    }

    #[test]
    fn interface_endpoints() {
        let a = Interface::A.config();
        assert_eq!((a.interface_num, a.usb_index, a.write_ep, a.read_ep), (0, 1, 0x02, 0x81));
        let b = Interface::B.config();
        assert_eq!((b.interface_num, b.usb_index, b.write_ep, b.read_ep), (1, 2, 0x04, 0x83));
    }
}
