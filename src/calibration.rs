//! One-shot gyroscope z-bias estimation, run while the platform is at rest.

use embedded_hal::blocking::delay::DelayMs;

use crate::drivers::i2c::I2cPeripheral;
use crate::drivers::imu::{Mpu9250, GYRO_SCALE};
use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub struct GyroCalibration {
    /// rad/s, subtracted from every later z reading
    pub bias_z: f32,
    pub requested: u16,
    pub valid_samples: u16,
}

/// Average `samples` z-axis rates and install the mean as the driver's bias.
///
/// Failed reads are skipped and left out of the divisor. With no valid reads
/// the bias stays at zero.
pub fn calibrate_gyro_z<P, D>(
    imu: &mut Mpu9250<P>,
    delay: &mut D,
    samples: u16,
    spacing_ms: u32,
) -> GyroCalibration
where
    P: I2cPeripheral,
    D: DelayMs<u32>,
{
    log_info!("Calibrating gyro z bias over {} samples...", samples);

    let mut sum = 0.0f32;
    let mut valid: u16 = 0;
    for _ in 0..samples {
        // raw reading, so a bias installed earlier does not leak in
        if let Ok(raw) = imu.read_raw() {
            sum += raw.gyro[2] as f32 * GYRO_SCALE;
            valid += 1;
        }
        delay.delay_ms(spacing_ms);
    }

    let bias_z = if valid > 0 { sum / valid as f32 } else { 0.0 };
    if valid == 0 {
        log_warn!("Gyro calibration got no valid samples, bias left at 0");
    } else if valid < samples {
        log_warn!("Gyro calibration skipped {} failed reads", samples - valid);
    }
    imu.set_gyro_bias_z(bias_z);
    log_info!("Gyro z bias = {} rad/s ({}/{} samples)", bias_z, valid, samples);

    GyroCalibration {
        bias_z,
        requested: samples,
        valid_samples: valid,
    }
}
