//! # JTAG/SWD Bitbang Adapter
//!
//! Applies OpenOCD `remote_bitbang` commands to the JTAG pins of the simulated target.
//! SWD targets are served by the same adapter: SWCLK is wired to `tck` and SWDIO to `tms`,
//! and the `'S'` query reports both `tdo` and the current SWDIO level.
//!
//! Per due tick at most one command is applied. The adapter keeps no state between
//! cycles besides the pins themselves.
use std::{convert::Infallible, io, net::ToSocketAddrs};

use simbridge_protocol::{
    bitbang::{Command, Sample},
    hook::{CycleHook, RateDivider},
};

use crate::transport::{Builder, Config, FlushPolicy, Transport};

/// Default rate divider of the bitbang adapter.
pub const DEFAULT_DIVIDER: u32 = 8;

/// Pin levels of a JTAG (or SWD) target. `srst` is active low.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct JtagPins {
    pub tck: bool,
    /// TMS, or SWDIO for SWD targets
    pub tms: bool,
    pub tdi: bool,
    /// Driven by the target
    pub tdo: bool,
    pub srst: bool,
}

impl Default for JtagPins {
    fn default() -> Self {
        JtagPins {
            tck: false,
            tms: false,
            tdi: false,
            tdo: false,
            srst: true,
        }
    }
}

impl JtagPins {
    /// Applies a decoded command. Returns the response byte for queries.
    pub fn apply(&mut self, command: Command) -> Option<u8> {
        match command {
            Command::Signals { tck, tms, tdi } => {
                self.tck = tck;
                self.tms = tms;
                self.tdi = tdi;
                None
            }
            Command::Reset { srst, .. } => {
                self.srst = Command::srst_level(srst);
                None
            }
            Command::ReadTdo | Command::ReadSwd => Sample {
                tdo: self.tdo,
                swdio: self.tms,
            }
            .response_to(command),
            Command::Blink { .. } | Command::Ignored(_) => None,
        }
    }
}

pub struct JtagServer {
    transport: Transport,
    divider: RateDivider,
}

impl JtagServer {
    /// Starts listening with the batched flush policy suited for TDO samples.
    pub fn bind(addr: impl ToSocketAddrs, divider: RateDivider) -> io::Result<JtagServer> {
        let transport = Builder::new()
            .flush_policy(FlushPolicy::BITBANG)
            .start("JTAGServer", addr)?;
        Ok(JtagServer::new(transport, divider))
    }

    pub fn bind_with_config(
        addr: impl ToSocketAddrs,
        divider: RateDivider,
        config: Config,
    ) -> io::Result<JtagServer> {
        Ok(JtagServer::new(
            Transport::start("JTAGServer", addr, config)?,
            divider,
        ))
    }

    pub fn new(transport: Transport, divider: RateDivider) -> JtagServer {
        JtagServer { transport, divider }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn divider(&self) -> RateDivider {
        self.divider
    }
}

impl CycleHook for JtagServer {
    type Pins = JtagPins;
    type Error = Infallible;

    fn cycle(&mut self, tick: u64, pins: &mut JtagPins) -> Result<(), Infallible> {
        if !self.divider.is_due(tick) {
            return Ok(());
        }
        let Some(byte) = self.transport.commands().pop() else {
            return Ok(());
        };
        let command = Command::from_byte(byte);
        log::trace!("JTAGServer: t={} cmd={:?}", tick, command);
        if let Some(response) = pins.apply(command) {
            self.transport.respond(response);
        }
        Ok(())
    }
}
