//! A minimal hardware model standing in for a real simulated design.
//!
//! It gives every adapter something sensible to talk to:
//!
//! - JTAG: a single-bit bypass register between `tdi` and `tdo`
//! - UART: the target echoes every bit it receives
//! - GPIO: outputs mirror inputs
//! - Chained clients: a free-running JTAG master and a listening SWD master
use simbridge_client::{JtagClientPins, SwdClientPins};
use simbridge_protocol::gpio::{GpioPins, line_mask};
use simbridge_server::{jtag::JtagPins, uart::UartPins};

/// Ticks per half period of the clocks driven towards a remote target.
const MASTER_HALF_PERIOD: u64 = 4;

#[derive(Debug, Default)]
pub struct LoopbackTarget {
    pub jtag: JtagPins,
    pub uart: UartPins,
    pub gpio: GpioPins,
    pub jtag_master: JtagClientPins,
    pub swd_master: SwdClientPins,
    pub gpio_remote: GpioPins,
    output_mask: u128,
    bypass: bool,
    last_tck: bool,
}

impl LoopbackTarget {
    pub fn new(gpio_outputs: usize) -> LoopbackTarget {
        LoopbackTarget {
            output_mask: line_mask(gpio_outputs),
            jtag_master: JtagClientPins {
                tms_oe: true,
                ..JtagClientPins::default()
            },
            ..LoopbackTarget::default()
        }
    }

    /// Evaluates the design for tick `t`, before the adapters see the pins.
    pub fn eval(&mut self, t: u64) {
        // Bypass register: capture on the rising edge, shift out on the falling edge.
        match (self.last_tck, self.jtag.tck) {
            (false, true) => self.bypass = self.jtag.tdi,
            (true, false) => self.jtag.tdo = self.bypass,
            _ => {}
        }
        self.last_tck = self.jtag.tck;

        self.uart.tx = self.uart.rx;

        self.gpio.outputs = self.gpio.inputs & self.output_mask;
        self.gpio_remote.outputs = self.gpio_remote.inputs & self.output_mask;

        let master_clock = (t / MASTER_HALF_PERIOD) % 2 == 1;
        self.jtag_master.tck = master_clock;
        // Walk a slow pattern into the remote TAP, staying in Run-Test/Idle.
        self.jtag_master.tdi = (t / (8 * MASTER_HALF_PERIOD)) % 2 == 1;
        self.jtag_master.tms = false;
        self.swd_master.swclk = master_clock;
    }
}
