#![cfg_attr(not(test), no_std)]

pub mod logging;

pub mod calibration;
pub mod config;
pub mod drivers;
pub mod protocol;
pub mod tasks;

#[cfg(feature = "stm32")]
pub mod board;

#[cfg(feature = "stm32")]
pub use board::Board;
pub use drivers::imu::ImuSample;
pub use protocol::{FrameEncoder, FrameReader, Payload};
