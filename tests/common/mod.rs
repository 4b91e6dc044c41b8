//! A software MPSSE engine with an EEPROM-like I2C slave on its pins.
//!
//! The fake parses the command stream the way the chip does: known opcodes
//! consume their arguments, reads queue reply bytes, and anything unknown is
//! answered with `0xFA <opcode>`. START and STOP are recognised from the
//! SCL/SDA levels written with `SET_BITS_LOW`, which is enough to run the
//! I2C layer against it without hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use ftdi_i2c::{Error, ModemStatus, Result, Transport, TransportSession};

const SCL: u8 = 0x01;
const SDA: u8 = 0x02;

/// Largest payload handed out per read, as after modem status stripping of
/// one 512-byte packet.
const READ_CHUNK: usize = 510;

/// A 24Cxx-style memory: the first written byte sets the pointer, later
/// bytes are stored, and reads stream from the pointer.
#[derive(Debug, Clone)]
pub struct MemorySlave {
    pub address: u8,
    pub memory: Vec<u8>,
    pub pointer: usize,
    /// NACK every data byte after the pointer byte.
    pub write_protected: bool,
}

impl MemorySlave {
    pub fn new(address: u8, contents: &[u8]) -> Self {
        let mut memory = vec![0xFF; 256];
        memory[..contents.len()].copy_from_slice(contents);
        Self {
            address,
            memory,
            pointer: 0,
            write_protected: false,
        }
    }

    fn next(&mut self) -> u8 {
        let byte = self.memory[self.pointer];
        self.pointer = (self.pointer + 1) % self.memory.len();
        byte
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Address,
    Pointer,
    Write,
    Read,
    /// Addressed to someone else.
    Ignored,
}

#[derive(Debug)]
pub struct FakeMpsse {
    pub slave: MemorySlave,
    /// Every vendor control request, as `(request, value)`.
    pub controls: Vec<(u8, u16)>,
    /// Number of bulk OUT transfers.
    pub writes: usize,
    pub starts: usize,
    pub stops: usize,
    /// The acknowledge bit the master sent after each byte it read,
    /// `true` for ACK.
    pub master_acks: Vec<bool>,
    /// Swallow every reply, as a wedged device would.
    pub mute: bool,
    /// Keep ignoring commands after a bit mode change, as a chip stuck in
    /// UART mode would.
    pub ignore_bitmode: bool,

    mpsse: bool,
    loopback: bool,
    loopback_data: VecDeque<u8>,
    status_pending: usize,
    out: VecDeque<u8>,
    pins: u8,
    phase: Phase,
    acked: bool,
}

impl FakeMpsse {
    pub fn new(slave: MemorySlave) -> Self {
        Self {
            slave,
            controls: Vec::new(),
            writes: 0,
            starts: 0,
            stops: 0,
            master_acks: Vec::new(),
            mute: false,
            ignore_bitmode: false,
            mpsse: false,
            loopback: false,
            loopback_data: VecDeque::new(),
            status_pending: 0,
            out: VecDeque::new(),
            pins: SCL | SDA,
            phase: Phase::Idle,
            acked: false,
        }
    }

    /// Whether the bus was left with a STOP after the last START.
    pub fn bus_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    fn reply(&mut self, bytes: &[u8]) {
        if !self.mute {
            self.out.extend(bytes);
        }
    }

    fn set_pins(&mut self, value: u8) {
        let prev = self.pins;
        if prev & SCL != 0 && value & SCL != 0 {
            if prev & SDA != 0 && value & SDA == 0 {
                self.starts += 1;
                self.phase = Phase::Address;
            } else if prev & SDA == 0 && value & SDA != 0 {
                self.stops += 1;
                self.phase = Phase::Idle;
            }
        }
        self.pins = value;
    }

    fn clock_out(&mut self, byte: u8) {
        if self.loopback {
            self.loopback_data.push_back(byte);
            return;
        }

        self.acked = match self.phase {
            Phase::Address if byte >> 1 == self.slave.address => {
                self.phase = if byte & 1 == 1 {
                    Phase::Read
                } else {
                    Phase::Pointer
                };
                true
            }
            Phase::Address => {
                self.phase = Phase::Ignored;
                false
            }
            Phase::Pointer => {
                self.slave.pointer = byte as usize % self.slave.memory.len();
                self.phase = Phase::Write;
                true
            }
            Phase::Write if !self.slave.write_protected => {
                let ptr = self.slave.pointer;
                self.slave.memory[ptr] = byte;
                self.slave.pointer = (ptr + 1) % self.slave.memory.len();
                true
            }
            _ => false,
        };
    }

    fn clock_in(&mut self) -> u8 {
        if self.loopback {
            return self.loopback_data.pop_front().unwrap_or(0xFF);
        }
        match self.phase {
            Phase::Read => self.slave.next(),
            _ => 0xFF,
        }
    }

    fn execute(&mut self, data: &[u8]) {
        let mut i = 0;

        while i < data.len() {
            let op = data[i];
            match op {
                0x84 => {
                    self.loopback = true;
                    i += 1;
                }
                0x85 => {
                    self.loopback = false;
                    i += 1;
                }
                0x87 | 0x8A | 0x8B | 0x8C | 0x8D | 0x96 | 0x97 => i += 1,
                0x86 | 0x9E | 0x82 => i += 3,
                0x80 => {
                    let value = args(data, i, 2)[0];
                    self.set_pins(value);
                    i += 3;
                }
                0x11 => {
                    let len = length(data, i);
                    for &byte in &args(data, i, 2 + len)[2..] {
                        self.clock_out(byte);
                    }
                    i += 3 + len;
                }
                0x13 => {
                    self.master_acks.push(args(data, i, 2)[1] & 0x80 == 0);
                    i += 3;
                }
                0x20 => {
                    let len = length(data, i);
                    let bytes: Vec<u8> = (0..len).map(|_| self.clock_in()).collect();
                    self.reply(&bytes);
                    i += 3;
                }
                0x22 => {
                    let ack_bit = if self.acked { 0x00 } else { 0x01 };
                    self.reply(&[ack_bit]);
                    i += 2;
                }
                _ => {
                    self.reply(&[0xFA, op]);
                    i += 1;
                }
            }
        }
    }
}

/// The `n` argument bytes following the opcode at `i`.
fn args(data: &[u8], i: usize, n: usize) -> &[u8] {
    data.get(i + 1..i + 1 + n)
        .unwrap_or_else(|| panic!("truncated command at offset {i}: {data:02x?}"))
}

fn length(data: &[u8], i: usize) -> usize {
    let len = args(data, i, 2);
    u16::from_le_bytes([len[0], len[1]]) as usize + 1
}

impl Transport for FakeMpsse {
    fn control_out(&mut self, request: u8, value: u16, _timeout: Duration) -> Result<()> {
        self.controls.push((request, value));
        match (request, value) {
            (0x00, 0) | (0x00, 1) => self.out.clear(),
            (0x0B, _) => {
                if !self.ignore_bitmode {
                    self.mpsse = value >> 8 == 0x02;
                }
                self.loopback = false;
                self.status_pending += 1;
            }
            _ => {}
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.writes += 1;
        if self.mpsse {
            self.execute(data);
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if self.out.is_empty() {
            return Err(Error::Timeout {
                expected: buf.len(),
                received: 0,
            });
        }
        let n = buf.len().min(self.out.len()).min(READ_CHUNK);
        for (dst, src) in buf.iter_mut().zip(self.out.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn read_status(&mut self, _timeout: Duration) -> Result<ModemStatus> {
        if self.status_pending == 0 {
            return Err(Error::ModeSwitch { received: 0 });
        }
        self.status_pending -= 1;
        Ok(ModemStatus::from_bytes([0x32, 0x60]))
    }
}

/// An opened and verified session on a fake with `slave` attached.
pub fn verified_session(slave: MemorySlave) -> TransportSession<FakeMpsse> {
    let mut session = TransportSession::open(FakeMpsse::new(slave)).unwrap();
    session.verify().unwrap();
    session
}
