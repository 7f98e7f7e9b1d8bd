use embedded_hal::blocking::delay::DelayMs;

use super::i2c::{BusStats, I2cPeripheral, PolledI2c};
use crate::config::IMU_SETTLE_MS;
use crate::{log_debug, log_info};

pub mod registers {
    //! MPU-9250 register map (the subset this node touches)

    pub const MPU9250_ADDR: u8 = 0x68;

    pub const SMPLRT_DIV: u8 = 0x19;
    pub const CONFIG: u8 = 0x1A;
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const ACCEL_CONFIG_2: u8 = 0x1D;
    /// First of 14 motion bytes: accel XYZ, temperature, gyro XYZ (big-endian)
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const PWR_MGMT_1: u8 = 0x6B;

    pub const MOTION_BURST_LEN: usize = 14;
}

use registers as reg;

/// m/s² per LSB at ±4 g
pub const ACCEL_SCALE: f32 = 9.80665 / 8192.0;
/// rad/s per LSB at ±2000 dps, (π / 180) / 16.4
pub const GYRO_SCALE: f32 = 0.001064225;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One motion reading. A failed read is all zeros with `valid == false`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub struct ImuSample {
    pub accel: Vector3,
    pub gyro: Vector3,
    pub valid: bool,
}

impl ImuSample {
    pub const fn invalid() -> Self {
        Self {
            accel: Vector3 {
                x: 0.0,
                y: 0.0,
                z: 0.0,
            },
            gyro: Vector3 {
                x: 0.0,
                y: 0.0,
                z: 0.0,
            },
            valid: false,
        }
    }
}

/// Unscaled register values from one burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

impl RawSample {
    pub fn from_burst(buf: &[u8; reg::MOTION_BURST_LEN]) -> Self {
        let word = |i: usize| i16::from_be_bytes([buf[i], buf[i + 1]]);
        Self {
            accel: [word(0), word(2), word(4)],
            // bytes 6..8 are the temperature, unused
            gyro: [word(8), word(10), word(12)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub enum ImuError {
    /// Burst returned fewer bytes than requested
    ShortRead { expected: usize, got: usize },
}

/// Register values written by [`Mpu9250::begin`].
#[derive(Debug, Clone, Copy)]
pub struct ImuConfig {
    /// Wake, PLL clock source
    pub pwr_mgmt_1: u8,
    /// 1 kHz / (1 + div)
    pub smplrt_div: u8,
    /// DLPF ~44 Hz
    pub dlpf: u8,
    /// ±2000 dps
    pub gyro_config: u8,
    /// ±4 g
    pub accel_config: u8,
    pub accel_config_2: u8,
    pub settle_ms: u32,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            pwr_mgmt_1: 0x01,
            smplrt_div: 9,
            dlpf: 0x03,
            gyro_config: 0x18,
            accel_config: 0x08,
            accel_config_2: 0x03,
            settle_ms: IMU_SETTLE_MS,
        }
    }
}

pub struct Mpu9250<P> {
    i2c: PolledI2c<P>,
    config: ImuConfig,
    gyro_bias_z: f32,
}

impl<P: I2cPeripheral> Mpu9250<P> {
    pub fn new(i2c: PolledI2c<P>, config: ImuConfig) -> Self {
        Self {
            i2c,
            config,
            gyro_bias_z: 0.0,
        }
    }

    /// Wake the device and program rate, filters and ranges.
    ///
    /// Writes are not acknowledged-checked, so this cannot currently fail; the
    /// `Result` is kept so callers already handle a bring-up failure.
    pub fn begin<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), ImuError> {
        log_info!("Configuring MPU-9250 at 0x{:x}...", self.i2c.address());
        let c = self.config;
        let sequence = [
            (reg::PWR_MGMT_1, c.pwr_mgmt_1),
            (reg::SMPLRT_DIV, c.smplrt_div),
            (reg::CONFIG, c.dlpf),
            (reg::GYRO_CONFIG, c.gyro_config),
            (reg::ACCEL_CONFIG, c.accel_config),
            (reg::ACCEL_CONFIG_2, c.accel_config_2),
        ];
        for (register, value) in sequence {
            log_debug!("write 0x{:x} <- 0x{:x}", register, value);
            self.i2c.write_register(register, value);
            delay.delay_ms(c.settle_ms);
        }

        let stats = self.i2c.stats();
        if stats.timeouts > 0 {
            log_info!("MPU-9250 configured with {} bus timeouts", stats.timeouts);
        } else {
            log_info!("MPU-9250 configured");
        }
        Ok(())
    }

    /// One 14-byte burst of the motion registers, unscaled.
    pub fn read_raw(&mut self) -> Result<RawSample, ImuError> {
        let mut buf = [0u8; reg::MOTION_BURST_LEN];
        let got = self.i2c.read_burst(reg::ACCEL_XOUT_H, &mut buf);
        if got != buf.len() {
            return Err(ImuError::ShortRead {
                expected: buf.len(),
                got,
            });
        }
        Ok(RawSample::from_burst(&buf))
    }

    /// Scaled, z-bias-corrected reading.
    pub fn try_read_sample(&mut self) -> Result<ImuSample, ImuError> {
        let raw = self.read_raw()?;
        let accel = |v: i16| v as f32 * ACCEL_SCALE;
        let gyro = |v: i16| v as f32 * GYRO_SCALE;
        Ok(ImuSample {
            accel: Vector3 {
                x: accel(raw.accel[0]),
                y: accel(raw.accel[1]),
                z: accel(raw.accel[2]),
            },
            gyro: Vector3 {
                x: gyro(raw.gyro[0]),
                y: gyro(raw.gyro[1]),
                z: gyro(raw.gyro[2]) - self.gyro_bias_z,
            },
            valid: true,
        })
    }

    /// Like [`Self::try_read_sample`], with a failure folded into `valid`.
    pub fn read_sample(&mut self) -> ImuSample {
        self.try_read_sample().unwrap_or(ImuSample::invalid())
    }

    pub fn gyro_bias_z(&self) -> f32 {
        self.gyro_bias_z
    }

    pub fn set_gyro_bias_z(&mut self, bias: f32) {
        self.gyro_bias_z = bias;
    }

    pub fn bus_stats(&self) -> BusStats {
        self.i2c.stats()
    }

    pub fn bus(&self) -> &PolledI2c<P> {
        &self.i2c
    }

    pub fn bus_mut(&mut self) -> &mut PolledI2c<P> {
        &mut self.i2c
    }
}

// Factory function to create the default IMU on a freshly brought-up bus
pub fn create_default_imu<P: I2cPeripheral>(periph: P) -> Mpu9250<P> {
    Mpu9250::new(
        PolledI2c::new(periph, super::i2c::I2cConfig::default()),
        ImuConfig::default(),
    )
}
