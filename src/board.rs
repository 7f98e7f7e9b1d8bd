use cortex_m::peripheral::syst::SystClkSource;
use embassy_stm32::gpio::{Input, Pull};
use embassy_stm32::interrupt::{self, InterruptExt, Priority};
use embassy_stm32::mode::Blocking;
use embassy_stm32::pac;
use embassy_stm32::pac::gpio::Gpio;
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{self, Config as UsartConfig, UartTx};
use embassy_stm32::{i2c, rcc, Config};

use crate::config::{I2C_FREQUENCY_HZ, SYSCLK_HZ, SYSTICK_HZ, UART_BAUDRATE};
use crate::drivers::encoder::{EncoderBank, QuadState, Wheel};
use crate::drivers::i2c::{Flag, I2cPeripheral};

// ── Encoder wiring ────────────────────────────────────────
//   FL: PA8 / PA9     BL: PA10 / PA11
//   FR: PA15 / PB3    BR: PB4 / PB5     (FR/BR sit on the JTAG pins)
// EXTI line number == pin number on every one of them.
const fn phase_pins(wheel: Wheel) -> [(Gpio, usize); 2] {
    match wheel {
        Wheel::FrontLeft => [(pac::GPIOA, 8), (pac::GPIOA, 9)],
        Wheel::BackLeft => [(pac::GPIOA, 10), (pac::GPIOA, 11)],
        Wheel::FrontRight => [(pac::GPIOA, 15), (pac::GPIOB, 3)],
        Wheel::BackRight => [(pac::GPIOB, 4), (pac::GPIOB, 5)],
    }
}

fn port_index(port: Gpio) -> u8 {
    if port.as_ptr() == pac::GPIOB.as_ptr() {
        1
    } else {
        0
    }
}

#[inline]
fn pin_high(port: Gpio, pin: usize) -> bool {
    port.idr().read().0 & (1 << pin) != 0
}

/// Current A/B levels of one wheel.
#[inline]
pub fn sample_wheel(wheel: Wheel) -> QuadState {
    let [(pa, a), (pb, b)] = phase_pins(wheel);
    QuadState::from_pins(pin_high(pa, a), pin_high(pb, b))
}

/// Read-and-clear an EXTI pending bit.
#[inline]
fn take_pending(line: usize) -> bool {
    let pending = pac::EXTI.pr(0).read().line(line);
    if pending {
        pac::EXTI.pr(0).write(|w| w.set_line(line, true));
    }
    pending
}

/// EXTI handler body: an edge on either phase pin resamples both.
#[inline]
pub fn handle_encoder_edges(encoders: &EncoderBank, wheel: Wheel) {
    let mut fired = false;
    for (_, line) in phase_pins(wheel) {
        fired |= take_pending(line);
    }
    if fired {
        encoders.on_edge(wheel, sample_wheel(wheel));
    }
}

/// Route all eight phase pins to EXTI on both edges and unmask the IRQs.
/// The encoder bank must already be seeded.
pub fn enable_encoder_interrupts() {
    for wheel in Wheel::ALL {
        for (port, line) in phase_pins(wheel) {
            pac::AFIO
                .exticr(line / 4)
                .modify(|w| w.set_exti(line % 4, port_index(port)));
            pac::EXTI.rtsr(0).modify(|w| w.set_line(line, true));
            pac::EXTI.ftsr(0).modify(|w| w.set_line(line, true));
            pac::EXTI.pr(0).write(|w| w.set_line(line, true));
            pac::EXTI.imr(0).modify(|w| w.set_line(line, true));
        }
    }

    interrupt::EXTI3.set_priority(Priority::P1);
    interrupt::EXTI4.set_priority(Priority::P1);
    interrupt::EXTI9_5.set_priority(Priority::P1);
    interrupt::EXTI15_10.set_priority(Priority::P1);
    unsafe {
        interrupt::EXTI3.enable();
        interrupt::EXTI4.enable();
        interrupt::EXTI9_5.enable();
        interrupt::EXTI15_10.enable();
    }
}

// ── I²C1 register access ──────────────────────────────────
/// I2C1 driven directly at register level. The embassy driver is kept alive
/// only for the pin / timing setup it performed.
pub struct Stm32I2c {
    _owner: i2c::I2c<'static, Blocking>,
    regs: pac::i2c::I2c,
}

impl I2cPeripheral for Stm32I2c {
    fn generate_start(&mut self) {
        self.regs.cr1().modify(|w| w.set_start(true));
    }

    fn generate_stop(&mut self) {
        self.regs.cr1().modify(|w| w.set_stop(true));
    }

    fn set_ack(&mut self, ack: bool) {
        self.regs.cr1().modify(|w| w.set_ack(ack));
    }

    fn is_set(&mut self, flag: Flag) -> bool {
        let sr1 = self.regs.sr1().read();
        match flag {
            Flag::StartBit => sr1.start(),
            Flag::AddressSent => sr1.addr(),
            Flag::TxEmpty => sr1.txe(),
            Flag::RxNotEmpty => sr1.rxne(),
        }
    }

    fn clear_address(&mut self) {
        // ADDR clears on SR1 read followed by SR2 read
        let _ = self.regs.sr1().read();
        let _ = self.regs.sr2().read();
    }

    fn write_data(&mut self, byte: u8) {
        self.regs.dr().write(|w| w.set_dr(byte));
    }

    fn read_data(&mut self) -> u8 {
        self.regs.dr().read().dr()
    }
}

#[derive(Debug, defmt::Format)]
pub enum BoardError {
    Uart(usart::ConfigError),
    CorePeripheralsTaken,
}

impl From<usart::ConfigError> for BoardError {
    fn from(e: usart::ConfigError) -> Self {
        Self::Uart(e)
    }
}

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    pub imu_bus: Stm32I2c,
    pub link: UartTx<'static, Blocking>,
    _encoder_pins: [Input<'static>; 8],
}

impl Board {
    /// Clocks, pins, SysTick, UART and I²C. Encoder EXTI stays masked until
    /// [`enable_encoder_interrupts`].
    pub fn init() -> Result<Self, BoardError> {
        // 8 MHz HSE * 9 = 72 MHz, APB1 at 36 MHz
        let mut config = Config::default();
        config.rcc.hse = Some(rcc::Hse {
            freq: Hertz(8_000_000),
            mode: rcc::HseMode::Oscillator,
        });
        config.rcc.pll = Some(rcc::Pll {
            src: rcc::PllSource::HSE,
            prediv: rcc::PllPreDiv::DIV1,
            mul: rcc::PllMul::MUL9,
        });
        config.rcc.sys = rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = rcc::AHBPrescaler::DIV1;
        config.rcc.apb1_pre = rcc::APBPrescaler::DIV2;
        config.rcc.apb2_pre = rcc::APBPrescaler::DIV1;
        let p = embassy_stm32::init(config);

        // Free PA15 / PB3 / PB4 from JTAG, keep SWD
        pac::AFIO.mapr().modify(|w| w.set_swj_cfg(0b010));

        let encoder_pins = [
            Input::new(p.PA8, Pull::Up),
            Input::new(p.PA9, Pull::Up),
            Input::new(p.PA10, Pull::Up),
            Input::new(p.PA11, Pull::Up),
            Input::new(p.PA15, Pull::Up),
            Input::new(p.PB3, Pull::Up),
            Input::new(p.PB4, Pull::Up),
            Input::new(p.PB5, Pull::Up),
        ];

        let mut core = cortex_m::Peripherals::take().ok_or(BoardError::CorePeripheralsTaken)?;
        core.SYST.set_clock_source(SystClkSource::Core);
        core.SYST.set_reload(SYSCLK_HZ / SYSTICK_HZ - 1);
        core.SYST.clear_current();
        core.SYST.enable_interrupt();
        core.SYST.enable_counter();

        let mut us_cfg = UsartConfig::default();
        us_cfg.baudrate = UART_BAUDRATE;
        let link = UartTx::new_blocking(p.USART3, p.PB10, us_cfg)?;

        // I²C1 on PB6 (SCL) / PB7 (SDA), external pull-ups
        let i2c1 = i2c::I2c::new_blocking(
            p.I2C1,
            p.PB6,
            p.PB7,
            Hertz(I2C_FREQUENCY_HZ),
            i2c::Config::default(),
        );

        Ok(Self {
            imu_bus: Stm32I2c {
                _owner: i2c1,
                regs: pac::I2C1,
            },
            link,
            _encoder_pins: encoder_pins,
        })
    }
}
