//! I2C register dump example.
//!
//! Reads a block of registers from an I2C device behind an FT232H and
//! prints them as a hex dump.
//!
//! # Wiring
//!
//! | FT232H Pin | I2C Signal | Notes |
//! |------------|-----------|-------|
//! | ADBUS0 (SK) | SCL      | Pull-up to 3.3V via 4.7k |
//! | ADBUS1 (DO) | SDA      | Connect to ADBUS2, pull-up via 4.7k |
//! | ADBUS2 (DI) | SDA      | Connected to ADBUS1 externally |
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=debug cargo run --example i2c_read -- 0x50 0x00 16
//! ```
//!
//! Arguments are the 7-bit address, the first register and the byte count,
//! defaulting to `0x50 0x00 16` (a 24Cxx EEPROM).

use ftdi_i2c::constants::pid;
use ftdi_i2c::mpsse::i2c::{I2cBus, I2cSpeed};
use ftdi_i2c::{FtdiDevice, TransportSession, FTDI_VID};

fn parse_arg(arg: Option<String>, default: u32) -> Result<u32, ftdi_i2c::Error> {
    let Some(arg) = arg else {
        return Ok(default);
    };
    let parsed = match arg.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.map_err(|_| ftdi_i2c::Error::InvalidArgument("arguments must be numbers"))
}

fn parse_byte(
    arg: Option<String>,
    default: u8,
    what: &'static str,
) -> Result<u8, ftdi_i2c::Error> {
    let value = parse_arg(arg, default.into())?;
    u8::try_from(value).map_err(|_| ftdi_i2c::Error::InvalidArgument(what))
}

fn main() -> Result<(), ftdi_i2c::Error> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let address = parse_byte(args.next(), 0x50, "address must fit in one byte")?;
    let register = parse_byte(args.next(), 0x00, "register must fit in one byte")?;
    let count = parse_arg(args.next(), 16)? as usize;

    println!("Opening FT232H...");
    let dev = FtdiDevice::open(FTDI_VID, pid::FT232H)?;
    let mut session = TransportSession::open(dev)?;
    session.verify()?;
    println!("MPSSE command processor verified");

    let speed = I2cSpeed::Hz(100_000);
    let mut i2c = I2cBus::new(&mut session, speed)?;
    println!("I2C bus at {} Hz", speed.frequency_hz()?);

    let mut data = vec![0u8; count];
    if let Err(err) = i2c.write_read(&mut session, address, &[register], &mut data) {
        if err.requires_reset() {
            session.reset()?;
        }
        return Err(err);
    }

    println!("Device {address:#04x}, registers {register:#04x}..:");
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!(
            "  {:04x}: {}",
            register as usize + row * 16,
            hex.join(" ")
        );
    }

    Ok(())
}
