#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use defmt::*;
use embassy_stm32::interrupt;
use embassy_time::Delay;
use embedded_hal::blocking::delay::DelayMs;
use {defmt_rtt as _, panic_probe as _};

use wheel_telemetry::{
    board::{self, Board},
    calibration::calibrate_gyro_z,
    config::{GYRO_CAL_SAMPLES, GYRO_CAL_SPACING_MS, POWER_UP_DELAY_MS},
    drivers::{encoder::EncoderBank, imu::create_default_imu, Wheel},
    tasks::{MillisClock, TelemetryNode},
};

static CLOCK: MillisClock = MillisClock::new();
static ENCODERS: EncoderBank = EncoderBank::new();

#[exception]
fn SysTick() {
    CLOCK.tick();
}

// FR phase B (PB3)
#[interrupt]
fn EXTI3() {
    board::handle_encoder_edges(&ENCODERS, Wheel::FrontRight);
}

// BR phase A (PB4)
#[interrupt]
fn EXTI4() {
    board::handle_encoder_edges(&ENCODERS, Wheel::BackRight);
}

// FL (PA8, PA9) and BR phase B (PB5)
#[interrupt]
fn EXTI9_5() {
    board::handle_encoder_edges(&ENCODERS, Wheel::FrontLeft);
    board::handle_encoder_edges(&ENCODERS, Wheel::BackRight);
}

// BL (PA10, PA11) and FR phase A (PA15)
#[interrupt]
fn EXTI15_10() {
    board::handle_encoder_edges(&ENCODERS, Wheel::BackLeft);
    board::handle_encoder_edges(&ENCODERS, Wheel::FrontRight);
}

/// Stop here and leave recovery to the watchdog.
fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

#[entry]
fn main() -> ! {
    info!("Starting wheel telemetry node");
    let board = match Board::init() {
        Ok(board) => board,
        Err(e) => {
            error!("Board bring-up failed: {:?}", e);
            halt()
        }
    };

    let mut delay = Delay;
    delay.delay_ms(POWER_UP_DELAY_MS);

    let mut imu = create_default_imu(board.imu_bus);
    if let Err(e) = imu.begin(&mut delay) {
        error!("IMU initialization failed: {:?}", e);
        halt()
    }
    info!("IMU configured");

    calibrate_gyro_z(&mut imu, &mut delay, GYRO_CAL_SAMPLES, GYRO_CAL_SPACING_MS);

    ENCODERS.seed(board::sample_wheel);
    board::enable_encoder_interrupts();
    info!("Encoder interrupts enabled");

    TelemetryNode::new(&CLOCK, &ENCODERS, imu, board.link).run()
}
