// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Board wiring for an RP2040-based probe: a bit-banged single-wire
//! link to the target's Debug Module, USB-CDC as the host transport,
//! a three-colour status LED, and the reset/mode button. Everything
//! that isn't board wiring lives in `rv003dbg_probe` and the crates
//! below it; this file only implements the HIL traits those crates
//! define and runs the tick loop.

#![no_std]
#![no_main]

use cortex_m::delay::Delay;
use defmt_rtt as _;
use panic_probe as _;

use rp_pico::hal;
use rp_pico::hal::pac;
use rp_pico::hal::gpio::{FunctionSio, Pin, PinId, PullDown, SioInput, SioOutput};
use rp_pico::hal::gpio::bank0::{Gpio16, Gpio17, Gpio18, Gpio19, Gpio20};
use rp_pico::hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

use rv003dbg_dm::time::Clock as DmClock;
use rv003dbg_dm::{DebugModule, Swio};
use rv003dbg_probe::hil::{Button, StatusLed, UsbByteIo};
use rv003dbg_probe::Probe;
use rv003dbg_target::TargetContext;

/// Half-period of one single-wire bit cell, tuned for the DM's 1 MHz
/// nominal bit rate. Bit-banged directly: this link predates any UART
/// or PIO program written for it.
const BIT_HALF_PERIOD_NS: u32 = 500;

type SwioLine = Pin<Gpio16, FunctionSio<SioOutput>, PullDown>;
type LedRed = Pin<Gpio17, FunctionSio<SioOutput>, PullDown>;
type LedGreen = Pin<Gpio18, FunctionSio<SioOutput>, PullDown>;
type LedBlue = Pin<Gpio19, FunctionSio<SioOutput>, PullDown>;
type ButtonPin = Pin<Gpio20, FunctionSio<SioInput>, PullDown>;

/// Bit-bang transport on a single open-drain-ish GPIO, shared between
/// the `line_reset` pulse and word-at-a-time register access. The
/// encoding itself (start bit, 32 data bits, parity, turnaround) is
/// the DM's single-wire frame; this struct only ever toggles the pin
/// and counts cycles.
struct BitBangSwio {
    line: SwioLine,
    delay: Delay,
}

impl BitBangSwio {
    fn new(line: SwioLine, delay: Delay) -> Self {
        BitBangSwio { line, delay }
    }

    fn half_bit_delay(&mut self) {
        self.delay.delay_us(BIT_HALF_PERIOD_NS / 1000 + 1);
    }

    fn write_bit(&mut self, bit: bool) {
        if bit {
            let _ = self.line.set_high();
        } else {
            let _ = self.line.set_low();
        }
        self.half_bit_delay();
        self.half_bit_delay();
    }

    fn write_word(&mut self, addr: u8, value: u32) {
        self.write_bit(true); // start
        for i in (0..7).rev() {
            self.write_bit((addr >> i) & 1 != 0);
        }
        self.write_bit(true); // write, not read
        for i in (0..32).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    fn write_read_request(&mut self, addr: u8) {
        self.write_bit(true); // start
        for i in (0..7).rev() {
            self.write_bit((addr >> i) & 1 != 0);
        }
        self.write_bit(false); // read, not write
    }
}

impl Swio for BitBangSwio {
    fn get(&mut self, addr: u8) -> u32 {
        self.write_read_request(addr);
        let mut value = 0u32;
        for _ in 0..32 {
            self.half_bit_delay();
            let bit = self.line.is_high().unwrap_or(false);
            self.half_bit_delay();
            value = (value << 1) | u32::from(bit);
        }
        value
    }

    fn put(&mut self, addr: u8, value: u32) {
        self.write_word(addr, value);
    }

    fn line_reset(&mut self) {
        cortex_m::interrupt::free(|_| {
            let _ = self.line.set_low();
            self.delay.delay_us(8);
            let _ = self.line.set_high();
        });
    }
}

struct RgbLed {
    red: LedRed,
    green: LedGreen,
    blue: LedBlue,
}

impl RgbLed {
    fn set(&mut self, r: bool, g: bool, b: bool) {
        let _ = if r { self.red.set_high() } else { self.red.set_low() };
        let _ = if g { self.green.set_high() } else { self.green.set_low() };
        let _ = if b { self.blue.set_high() } else { self.blue.set_low() };
    }
}

impl StatusLed for RgbLed {
    fn off(&mut self) {
        self.set(false, false, false);
    }
    fn green(&mut self) {
        self.set(false, true, false);
    }
    fn cyan(&mut self) {
        self.set(false, true, true);
    }
    fn red(&mut self) {
        self.set(true, false, false);
    }
    fn blue(&mut self) {
        self.set(false, false, true);
    }
    fn magenta(&mut self) {
        self.set(true, false, true);
    }
}

struct GpioButton {
    pin: ButtonPin,
}

impl Button for GpioButton {
    fn pressed(&mut self) -> bool {
        self.pin.is_high().unwrap_or(false)
    }
}

struct MonotonicClock {
    timer: hal::Timer,
}

impl DmClock for MonotonicClock {
    fn now_us(&self) -> u32 {
        self.timer.get_counter_low()
    }
}

struct CdcUsb<'a> {
    device: UsbDevice<'a, UsbBus>,
    serial: SerialPort<'a, UsbBus>,
}

impl<'a> UsbByteIo for CdcUsb<'a> {
    fn try_read(&mut self) -> Option<u8> {
        if !self.device.poll(&mut [&mut self.serial]) {
            return None;
        }
        let mut buf = [0u8; 1];
        match self.serial.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    fn try_write(&mut self, byte: u8) -> bool {
        self.device.poll(&mut [&mut self.serial]);
        self.serial.write(&[byte]).is_ok()
    }

    fn connected(&mut self) -> bool {
        self.device.poll(&mut [&mut self.serial]);
        self.device.state() == UsbDeviceState::Configured
    }
}

static mut USB_BUS: Option<UsbBusAllocator<UsbBus>> = None;

#[cortex_m_rt::entry]
fn main() -> ! {
    let mut pac = pac::Peripherals::take().unwrap();
    let core = pac::CorePeripherals::take().unwrap();

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        rp_pico::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let delay = Delay::new(core.SYST, clocks.system_clock.freq().to_Hz());
    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);

    let sio = hal::Sio::new(pac.SIO);
    let pins = rp_pico::Pins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);

    let swio = BitBangSwio::new(pins.gpio16.into_push_pull_output(), delay);
    let led = RgbLed {
        red: pins.gpio17.into_push_pull_output(),
        green: pins.gpio18.into_push_pull_output(),
        blue: pins.gpio19.into_push_pull_output(),
    };
    let button = GpioButton { pin: pins.gpio20.into_pull_down_input() };

    let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    ));
    // Safety: the allocator outlives every USB class/device built from
    // it below, and this function never returns, so the `'static`
    // borrow is sound for the program's whole lifetime.
    let usb_bus_ref = unsafe {
        USB_BUS = Some(usb_bus);
        USB_BUS.as_ref().unwrap()
    };

    let serial = SerialPort::new(usb_bus_ref);
    let device = UsbDeviceBuilder::new(usb_bus_ref, UsbVidPid(0x1209, 0x0003))
        .manufacturer("rv003dbg")
        .product("rv003dbg probe")
        .serial_number("0")
        .device_class(usbd_serial::USB_CLASS_CDC)
        .build();
    let mut usb = CdcUsb { device, serial };

    let mut led = led;
    let mut button = button;
    let clock = MonotonicClock { timer };
    let mut ctx = TargetContext::new(DebugModule::new(swio));
    let mut probe = Probe::new();

    loop {
        probe.tick(&mut ctx, &clock, &mut usb, &mut led, &mut button);
    }
}
