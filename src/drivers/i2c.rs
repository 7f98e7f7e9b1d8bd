//! Polled single-master I2C over a register-level peripheral.
//!
//! Every flag wait spins at most `spin_limit` polls. An expired wait is counted
//! in [`BusStats`] and the transfer carries on as if the flag had been seen, so
//! a stalled bus can never hang the telemetry loop. Burst reads report how many
//! bytes were really clocked in, which is how a stall reaches the caller.

use crate::config::I2C_SPIN_LIMIT;

/// Status flags the master waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub enum Flag {
    /// Start (or repeated start) condition generated
    StartBit,
    /// Address byte acknowledged by the slave
    AddressSent,
    /// Data register empty, next byte may be written
    TxEmpty,
    /// Data register holds a received byte
    RxNotEmpty,
}

/// Register-level operations of an I2C master peripheral.
///
/// Implementations only touch hardware; sequencing and timeouts live in
/// [`PolledI2c`].
pub trait I2cPeripheral {
    fn generate_start(&mut self);
    fn generate_stop(&mut self);
    /// Whether the next received byte is acknowledged.
    fn set_ack(&mut self, ack: bool);
    fn is_set(&mut self, flag: Flag) -> bool;
    /// Clear the address-sent condition (status register read sequence).
    fn clear_address(&mut self);
    fn write_data(&mut self, byte: u8);
    fn read_data(&mut self) -> u8;
}

#[derive(Debug, Clone, Copy)]
pub struct I2cConfig {
    /// 7-bit device address
    pub address: u8,
    /// Flag polls before a wait is abandoned
    pub spin_limit: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            address: crate::drivers::imu::registers::MPU9250_ADDR,
            spin_limit: I2C_SPIN_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub struct BusStats {
    pub transfers: u32,
    pub timeouts: u32,
}

pub struct PolledI2c<P> {
    periph: P,
    config: I2cConfig,
    stats: BusStats,
}

impl<P: I2cPeripheral> PolledI2c<P> {
    pub fn new(periph: P, config: I2cConfig) -> Self {
        Self {
            periph,
            config,
            stats: BusStats::default(),
        }
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    pub fn address(&self) -> u8 {
        self.config.address
    }

    pub fn peripheral(&self) -> &P {
        &self.periph
    }

    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.periph
    }

    /// START, ADDR(W), reg, value, STOP.
    pub fn write_register(&mut self, reg: u8, value: u8) {
        self.stats.transfers = self.stats.transfers.wrapping_add(1);
        self.start();
        self.send_address(false);
        self.send_byte(reg);
        self.send_byte(value);
        self.periph.generate_stop();
    }

    /// START, ADDR(W), reg, repeated START, ADDR(R), `buf.len()` bytes, STOP.
    ///
    /// Every byte but the last is acknowledged; the final NACK tells the slave
    /// the transfer is over. Returns the number of bytes whose receive flag was
    /// observed before its wait expired.
    pub fn read_burst(&mut self, reg: u8, buf: &mut [u8]) -> usize {
        self.stats.transfers = self.stats.transfers.wrapping_add(1);
        self.start();
        self.send_address(false);
        self.send_byte(reg);

        self.start();
        self.send_address(true);

        let last = buf.len().saturating_sub(1);
        let mut received = 0;
        for (i, slot) in buf.iter_mut().enumerate() {
            self.periph.set_ack(i != last);
            if self.wait_for(Flag::RxNotEmpty) {
                received += 1;
            }
            *slot = self.periph.read_data();
        }

        self.periph.generate_stop();
        received
    }

    fn start(&mut self) {
        self.periph.generate_start();
        self.wait_for(Flag::StartBit);
    }

    fn send_address(&mut self, read: bool) {
        self.periph.write_data((self.config.address << 1) | read as u8);
        self.wait_for(Flag::AddressSent);
        self.periph.clear_address();
    }

    fn send_byte(&mut self, byte: u8) {
        self.periph.write_data(byte);
        self.wait_for(Flag::TxEmpty);
    }

    /// Spin on `flag`; false when the poll budget ran out.
    fn wait_for(&mut self, flag: Flag) -> bool {
        for _ in 0..self.config.spin_limit {
            if self.periph.is_set(flag) {
                return true;
            }
        }
        self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
        false
    }
}
