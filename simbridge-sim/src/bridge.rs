//! The set of adapters attached to one simulation, and the clock that drives them.
use simbridge_client::{GpioClient, JtagClient, JtagClientPins, SwdClient, SwdClientPins};
use simbridge_protocol::{error::ReadError, gpio::GpioPins, hook::CycleHook};
use simbridge_server::{
    gpio::GpioServer,
    jtag::{JtagPins, JtagServer},
    uart::{UartPins, UartServer},
};

use crate::model::LoopbackTarget;

/// Owns every enabled adapter and the tick counter.
///
/// Each `do_*` method is a no-op when its adapter is disabled, and otherwise hands the
/// current tick to the adapter, which applies its own rate divider. Dropping the bridge
/// stops all server transports.
#[derive(Default)]
pub struct Bridge {
    tick: u64,
    pub jtag_server: Option<JtagServer>,
    pub uart_server: Option<UartServer>,
    pub gpio_server: Option<GpioServer>,
    pub jtag_client: Option<JtagClient>,
    pub swd_client: Option<SwdClient>,
    pub gpio_client: Option<GpioClient>,
}

impl Bridge {
    pub fn new() -> Bridge {
        Bridge::default()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advances simulation time by one tick.
    pub fn advance(&mut self) {
        self.tick += 1;
    }

    pub fn do_jtag_server(&mut self, pins: &mut JtagPins) {
        if let Some(server) = &mut self.jtag_server {
            let Ok(()) = server.cycle(self.tick, pins);
        }
    }

    pub fn do_uart_server(&mut self, pins: &mut UartPins) {
        if let Some(server) = &mut self.uart_server {
            let Ok(()) = server.cycle(self.tick, pins);
        }
    }

    pub fn do_gpio_server(&mut self, pins: &mut GpioPins) {
        if let Some(server) = &mut self.gpio_server {
            let Ok(()) = server.cycle(self.tick, pins);
        }
    }

    pub fn do_jtag_client(&mut self, pins: &mut JtagClientPins) -> Result<(), ReadError> {
        match &mut self.jtag_client {
            Some(client) => client.cycle(self.tick, pins),
            None => Ok(()),
        }
    }

    pub fn do_swd_client(&mut self, pins: &mut SwdClientPins) -> Result<(), ReadError> {
        match &mut self.swd_client {
            Some(client) => client.cycle(self.tick, pins),
            None => Ok(()),
        }
    }

    pub fn do_gpio_client(&mut self, pins: &mut GpioPins) -> Result<(), ReadError> {
        match &mut self.gpio_client {
            Some(client) => client.cycle(self.tick, pins),
            None => Ok(()),
        }
    }

    /// Evaluates the target for the current tick, runs every adapter and advances time.
    pub fn step(&mut self, target: &mut LoopbackTarget) -> Result<(), ReadError> {
        target.eval(self.tick);
        self.do_jtag_server(&mut target.jtag);
        self.do_uart_server(&mut target.uart);
        self.do_gpio_server(&mut target.gpio);
        self.do_jtag_client(&mut target.jtag_master)?;
        self.do_swd_client(&mut target.swd_master)?;
        self.do_gpio_client(&mut target.gpio_remote)?;
        self.advance();
        Ok(())
    }

    /// Steps until `timeout` ticks have passed, or forever if `timeout` is zero.
    pub fn run(&mut self, target: &mut LoopbackTarget, timeout: u64) -> Result<(), ReadError> {
        while timeout == 0 || self.tick < timeout {
            self.step(target)?;
        }
        log::info!("Timeout reached after {} ticks", self.tick);
        Ok(())
    }
}
