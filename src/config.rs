// Centralize all configuration constants
pub const TELEMETRY_RATE_HZ: u32 = 100;
pub const TELEMETRY_PERIOD_MS: u32 = 1000 / TELEMETRY_RATE_HZ;
pub const SYSTICK_HZ: u32 = 1000;
pub const SYSCLK_HZ: u32 = 72_000_000;
pub const UART_BAUDRATE: u32 = 921_600;
pub const I2C_FREQUENCY_HZ: u32 = 100_000;

// Flag polls before a bus wait gives up; wall-clock length scales with SYSCLK
pub const I2C_SPIN_LIMIT: u32 = 10_000;

// Gyro z-bias calibration
pub const GYRO_CAL_SAMPLES: u16 = 400;
pub const GYRO_CAL_SPACING_MS: u32 = 2;

// Bring-up delays
pub const POWER_UP_DELAY_MS: u32 = 100;
pub const IMU_SETTLE_MS: u32 = 10;

// Loop statistics are reported once per second
pub const STATS_REPORT_CYCLES: u32 = TELEMETRY_RATE_HZ;
pub const IMU_ERROR_LOG_EVERY: u32 = 100;
