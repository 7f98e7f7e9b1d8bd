use embedded_hal::blocking::serial::Write;
use portable_atomic::{AtomicU32, Ordering};

use crate::config::{IMU_ERROR_LOG_EVERY, STATS_REPORT_CYCLES, TELEMETRY_PERIOD_MS};
use crate::drivers::encoder::EncoderBank;
use crate::drivers::i2c::I2cPeripheral;
use crate::drivers::imu::{ImuSample, Mpu9250};
use crate::protocol::{FrameEncoder, Payload};
use crate::{log_info, log_warn};

pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Millisecond counter advanced by the 1 kHz SysTick interrupt. Wraps after
/// ~49.7 days; all interval maths is wrapping.
pub struct MillisClock {
    ms: AtomicU32,
}

impl MillisClock {
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    pub const fn starting_at(ms: u32) -> Self {
        Self {
            ms: AtomicU32::new(ms),
        }
    }

    /// Tick handler body.
    #[inline]
    pub fn tick(&self) {
        self.ms.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for MillisClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MillisClock {
    #[inline]
    fn now_ms(&self) -> u32 {
        self.ms.load(Ordering::Relaxed)
    }
}

/// Fixed-interval gate. The served marker jumps to the clock reading at
/// service time, so an overrun delays the next frame but never queues extras.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period_ms: u32,
    last_served: u32,
}

impl Cadence {
    pub const fn new(period_ms: u32, last_served: u32) -> Self {
        Self {
            period_ms,
            last_served,
        }
    }

    /// True when a cycle is due at `now`; the cycle is then marked served.
    pub fn poll(&mut self, now: u32) -> bool {
        if now.wrapping_sub(self.last_served) < self.period_ms {
            return false;
        }
        self.last_served = now;
        true
    }

    /// Milliseconds past the due time if `now` were served.
    pub fn lateness(&self, now: u32) -> u32 {
        now.wrapping_sub(self.last_served)
            .saturating_sub(self.period_ms)
    }

    pub fn last_served(&self) -> u32 {
        self.last_served
    }
}

#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub struct LoopStats {
    pub cycles: u32,
    pub imu_failures: u32,
    pub consecutive_imu_failures: u32,
    pub link_errors: u32,
    /// Worst service lateness since the last report
    pub max_late_ms: u32,
}

/// Main-context telemetry loop: snapshot ticks, read the IMU, emit a frame.
pub struct TelemetryNode<'a, C, P, W> {
    clock: &'a C,
    encoders: &'a EncoderBank,
    imu: Mpu9250<P>,
    link: FrameEncoder<W>,
    cadence: Cadence,
    stats: LoopStats,
}

impl<'a, C, P, W> TelemetryNode<'a, C, P, W>
where
    C: Clock,
    P: I2cPeripheral,
    W: Write<u8>,
{
    pub fn new(clock: &'a C, encoders: &'a EncoderBank, imu: Mpu9250<P>, link: W) -> Self {
        Self {
            clock,
            encoders,
            imu,
            link: FrameEncoder::new(link),
            cadence: Cadence::new(TELEMETRY_PERIOD_MS, 0),
            stats: LoopStats::default(),
        }
    }

    /// Busy-wait service loop. Never returns.
    pub fn run(&mut self) -> ! {
        log_info!("Telemetry loop running at {} ms period", TELEMETRY_PERIOD_MS);
        loop {
            let _ = self.poll();
        }
    }

    /// One non-blocking pass: serves a cycle if one is due and returns its payload.
    pub fn poll(&mut self) -> Option<Payload> {
        let now = self.clock.now_ms();
        let late = self.cadence.lateness(now);
        if !self.cadence.poll(now) {
            return None;
        }
        self.stats.max_late_ms = self.stats.max_late_ms.max(late);
        Some(self.serve(now))
    }

    fn serve(&mut self, now: u32) -> Payload {
        // The only critical section; the IMU read happens after it, with
        // interrupts enabled.
        let ticks = self.encoders.snapshot();

        let sample = match self.imu.try_read_sample() {
            Ok(sample) => {
                if self.stats.consecutive_imu_failures > 0 {
                    log_info!(
                        "IMU recovered after {} consecutive errors",
                        self.stats.consecutive_imu_failures
                    );
                    self.stats.consecutive_imu_failures = 0;
                }
                sample
            }
            Err(e) => {
                self.stats.imu_failures = self.stats.imu_failures.wrapping_add(1);
                self.stats.consecutive_imu_failures += 1;
                if self.stats.consecutive_imu_failures % IMU_ERROR_LOG_EVERY == 1 {
                    log_warn!("IMU read error #{}: {:?}", self.stats.imu_failures, e);
                }
                ImuSample::invalid()
            }
        };

        let payload = Payload::new(now, &ticks, &sample);
        if let Err(e) = self.link.send(&payload) {
            self.stats.link_errors = self.stats.link_errors.wrapping_add(1);
            if self.stats.link_errors % IMU_ERROR_LOG_EVERY == 1 {
                log_warn!("Frame transmit failed: {:?}", e);
            }
        }

        self.stats.cycles = self.stats.cycles.wrapping_add(1);
        if self.stats.cycles % STATS_REPORT_CYCLES == 0 {
            self.report();
        }
        payload
    }

    fn report(&mut self) {
        let bus = self.imu.bus_stats();
        log_info!(
            "Telemetry: {} frames, {} IMU failures, {} bus timeouts, {} link errors, max late {} ms",
            self.link.frames_sent(),
            self.stats.imu_failures,
            bus.timeouts,
            self.stats.link_errors,
            self.stats.max_late_ms
        );
        self.stats.max_late_ms = 0;
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn last_served(&self) -> u32 {
        self.cadence.last_served()
    }

    pub fn imu_mut(&mut self) -> &mut Mpu9250<P> {
        &mut self.imu
    }

    pub fn link(&self) -> &W {
        self.link.link()
    }
}
