pub mod encoder;
pub mod i2c;
pub mod imu;

#[cfg(test)]
pub mod mock;

pub use encoder::{EncoderBank, QuadState, TickSnapshot, Wheel};
pub use i2c::{BusStats, I2cPeripheral, PolledI2c};
pub use imu::{ImuError, ImuSample, Mpu9250, Vector3};
