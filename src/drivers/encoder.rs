//! Interrupt-driven quadrature decoding for the four wheel encoders.
//!
//! Each edge on either phase pin resamples both pins and looks the
//! (previous, new) state pair up in [`TRANSITIONS`]. The per-wheel state lives
//! in an [`EncoderBank`] that is shared between the EXTI handlers (writers) and
//! the telemetry loop (reader); every access goes through one critical section.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Wheel positions, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub enum Wheel {
    FrontLeft = 0,
    FrontRight = 1,
    BackLeft = 2,
    BackRight = 3,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::BackLeft,
        Wheel::BackRight,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Two-bit pin state, `A << 1 | B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuadState(u8);

impl QuadState {
    pub const fn from_pins(a: bool, b: bool) -> Self {
        Self(((a as u8) << 1) | b as u8)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b11)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Delta for every `(prev << 2) | new` index.
///
/// Gray sequence 00 -> 01 -> 11 -> 10 -> 00 counts up, the reverse counts down.
/// Repeats and double steps (missed edge or bounce) count zero.
pub const TRANSITIONS: [i8; 16] = [
    //   new: 00  01  10  11
    /* 00 */ 0, 1, -1, 0,
    /* 01 */ -1, 0, 0, 1,
    /* 10 */ 1, 0, 0, -1,
    /* 11 */ 0, -1, 1, 0,
];

#[inline]
pub const fn transition_delta(prev: QuadState, new: QuadState) -> i8 {
    TRANSITIONS[((prev.0 << 2) | new.0) as usize]
}

/// Per-wheel decoder state.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderChannel {
    prev: QuadState,
    ticks: i32,
}

impl EncoderChannel {
    pub const fn new() -> Self {
        Self {
            prev: QuadState(0),
            ticks: 0,
        }
    }

    /// Baseline capture; must run before edge interrupts are unmasked.
    pub fn seed(&mut self, state: QuadState) {
        self.prev = state;
    }

    /// Apply one sampled edge and return the delta that was added.
    pub fn on_edge(&mut self, new: QuadState) -> i8 {
        let delta = transition_delta(self.prev, new);
        self.ticks = self.ticks.wrapping_add(delta as i32);
        self.prev = new;
        delta
    }

    pub fn ticks(&self) -> i32 {
        self.ticks
    }

    pub fn state(&self) -> QuadState {
        self.prev
    }
}

/// Four cumulative tick counts captured at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "stm32", derive(defmt::Format))]
pub struct TickSnapshot {
    pub ticks: [i32; 4],
}

impl TickSnapshot {
    pub fn get(&self, wheel: Wheel) -> i32 {
        self.ticks[wheel.index()]
    }
}

/// The only state shared between interrupt and main context.
pub struct EncoderBank {
    channels: Mutex<CriticalSectionRawMutex, RefCell<[EncoderChannel; 4]>>,
}

impl EncoderBank {
    pub const fn new() -> Self {
        Self {
            channels: Mutex::new(RefCell::new([EncoderChannel::new(); 4])),
        }
    }

    /// Record the current pin levels of every wheel as the decode baseline.
    pub fn seed(&self, mut sample: impl FnMut(Wheel) -> QuadState) {
        self.channels.lock(|channels| {
            let mut channels = channels.borrow_mut();
            for wheel in Wheel::ALL {
                channels[wheel.index()].seed(sample(wheel));
            }
        });
    }

    /// Edge handler body. Touches only the given wheel's channel.
    pub fn on_edge(&self, wheel: Wheel, new: QuadState) {
        self.channels.lock(|channels| {
            channels.borrow_mut()[wheel.index()].on_edge(new);
        });
    }

    /// Copy all four tick counts inside a single critical section.
    pub fn snapshot(&self) -> TickSnapshot {
        self.channels.lock(|channels| {
            let channels = channels.borrow();
            TickSnapshot {
                ticks: [
                    channels[0].ticks,
                    channels[1].ticks,
                    channels[2].ticks,
                    channels[3].ticks,
                ],
            }
        })
    }
}

impl Default for EncoderBank {
    fn default() -> Self {
        Self::new()
    }
}
