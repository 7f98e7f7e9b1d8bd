//! Host-side stand-ins for the board collaborators, used by unit tests.

use core::cell::Cell;
use std::vec::Vec;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::serial::Write;

use super::i2c::{Flag, I2cPeripheral};
use crate::tasks::telemetry::Clock;

/// Bus activity as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    Stop,
    Address(u8),
    Write(u8),
    Read { ack: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitAddress,
    Writing { first: bool },
    Reading,
    Nacked,
}

/// Simulated I2C master peripheral with one register-file slave on the bus.
///
/// The slave auto-increments its register pointer like the MPU-9250 does.
/// Faults: `stall_all` keeps every status flag low, `stall_after(n)` stops
/// delivering read bytes after `n`, `fail_next_reads(n)` starves the data
/// phase of the next `n` read transfers.
#[derive(Debug)]
pub struct MockI2cBus {
    device: u8,
    regs: [u8; 128],
    pointer: u8,
    phase: Phase,
    ack: bool,
    sb: bool,
    addr: bool,
    txe: bool,
    rxne: bool,
    stall_all: bool,
    stall_after: Option<usize>,
    fail_reads: u32,
    read_starved: bool,
    delivered: usize,
    events: Vec<BusEvent>,
}

impl MockI2cBus {
    pub fn new(device: u8) -> Self {
        Self {
            device,
            regs: [0; 128],
            pointer: 0,
            phase: Phase::Idle,
            ack: true,
            sb: false,
            addr: false,
            txe: false,
            rxne: false,
            stall_all: false,
            stall_after: None,
            fail_reads: 0,
            read_starved: false,
            delivered: 0,
            events: Vec::new(),
        }
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.regs[(reg & 0x7F) as usize]
    }

    pub fn load_registers(&mut self, start: u8, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.regs[(start as usize + i) & 0x7F] = *b;
        }
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn stall_all(&mut self) {
        self.stall_all = true;
    }

    pub fn stall_after(&mut self, bytes: usize) {
        self.stall_after = Some(bytes);
    }

    pub fn fail_next_reads(&mut self, transfers: u32) {
        self.fail_reads = transfers;
    }

    pub fn clear_faults(&mut self) {
        self.stall_all = false;
        self.stall_after = None;
        self.fail_reads = 0;
    }

    fn can_deliver(&self) -> bool {
        self.phase == Phase::Reading
            && !self.stall_all
            && !self.read_starved
            && self.stall_after.map_or(true, |n| self.delivered < n)
    }
}

impl I2cPeripheral for MockI2cBus {
    fn generate_start(&mut self) {
        self.events.push(BusEvent::Start);
        self.phase = Phase::AwaitAddress;
        self.sb = !self.stall_all;
        self.addr = false;
        self.txe = false;
        self.rxne = false;
    }

    fn generate_stop(&mut self) {
        self.events.push(BusEvent::Stop);
        self.phase = Phase::Idle;
        self.sb = false;
        self.addr = false;
        self.txe = false;
        self.rxne = false;
        self.read_starved = false;
    }

    fn set_ack(&mut self, ack: bool) {
        self.ack = ack;
    }

    fn is_set(&mut self, flag: Flag) -> bool {
        match flag {
            Flag::StartBit => self.sb,
            Flag::AddressSent => self.addr,
            Flag::TxEmpty => self.txe,
            Flag::RxNotEmpty => self.rxne,
        }
    }

    fn clear_address(&mut self) {
        self.addr = false;
        self.rxne = self.can_deliver();
    }

    fn write_data(&mut self, byte: u8) {
        match self.phase {
            Phase::AwaitAddress => {
                self.events.push(BusEvent::Address(byte));
                self.sb = false;
                if byte >> 1 != self.device {
                    self.phase = Phase::Nacked;
                    return;
                }
                if byte & 1 == 1 {
                    self.phase = Phase::Reading;
                    if self.fail_reads > 0 {
                        self.fail_reads -= 1;
                        self.read_starved = true;
                    }
                } else {
                    self.phase = Phase::Writing { first: true };
                }
                self.addr = !self.stall_all;
            }
            Phase::Writing { first } => {
                self.events.push(BusEvent::Write(byte));
                if first {
                    self.pointer = byte & 0x7F;
                } else {
                    self.regs[self.pointer as usize] = byte;
                    self.pointer = (self.pointer + 1) & 0x7F;
                }
                self.phase = Phase::Writing { first: false };
                self.txe = !self.stall_all;
            }
            _ => {
                self.events.push(BusEvent::Write(byte));
                self.txe = false;
            }
        }
    }

    fn read_data(&mut self) -> u8 {
        self.events.push(BusEvent::Read { ack: self.ack });
        if !self.rxne {
            return 0xFF;
        }
        let value = self.regs[self.pointer as usize];
        self.pointer = (self.pointer + 1) & 0x7F;
        self.delivered += 1;
        self.rxne = self.can_deliver();
        value
    }
}

/// Captures every byte pushed down the link.
#[derive(Debug, Default)]
pub struct MockSerial {
    pub bytes: Vec<u8>,
    pub writes: usize,
}

impl Write<u8> for MockSerial {
    type Error = core::convert::Infallible;

    fn bwrite_all(&mut self, buffer: &[u8]) -> Result<(), Self::Error> {
        self.writes += 1;
        self.bytes.extend_from_slice(buffer);
        Ok(())
    }

    fn bflush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Delay that returns immediately and remembers how long it was asked to wait.
#[derive(Debug, Default)]
pub struct NoDelay {
    pub total_ms: u32,
    pub calls: u32,
}

impl DelayMs<u32> for NoDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
        self.calls += 1;
    }
}

/// Clock that advances by `step` every time it is read.
#[derive(Debug)]
pub struct StepClock {
    next: Cell<u32>,
    step: u32,
}

impl StepClock {
    pub fn new(start: u32, step: u32) -> Self {
        Self {
            next: Cell::new(start),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> u32 {
        let now = self.next.get();
        self.next.set(now.wrapping_add(self.step));
        now
    }
}
