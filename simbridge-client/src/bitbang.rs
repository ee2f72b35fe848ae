use std::{
    io::{self, Read},
    net::{TcpStream, ToSocketAddrs},
};

use simbridge_protocol::{
    bitbang::{Command, Sample},
    error::ReadError,
    hook::{CycleHook, RateDivider},
};

use crate::write_all;

/// A bitbang connection to a remote JTAG server.
struct Link {
    tcp: TcpStream,
}

impl Link {
    fn connect(addr: impl ToSocketAddrs) -> io::Result<Link> {
        let tcp = TcpStream::connect(addr)?;
        tcp.set_nodelay(true)?;
        Ok(Link { tcp })
    }

    fn send(&mut self, commands: &[u8]) -> Result<(), ReadError> {
        log::trace!("bitbang send: {:?}", commands);
        write_all(&mut self.tcp, commands)?;
        Ok(())
    }

    /// Drives the remote pins and waits for the answer to the `'S'` query.
    fn exchange(&mut self, signals: Command) -> Result<Sample, ReadError> {
        self.send(&[signals.to_byte(), Command::ReadSwd.to_byte()])?;
        let mut buf = [0_u8; 1];
        self.tcp.read_exact(&mut buf)?;
        Sample::from_byte(buf[0])
    }
}

/// Local JTAG master pins mirrored onto a remote target.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct JtagClientPins {
    pub tck: bool,
    pub tdi: bool,
    /// Also an input while `tms_oe` is low
    pub tms: bool,
    /// Whether the local side drives `tms`
    pub tms_oe: bool,
    /// Sampled from the remote target
    pub tdo: bool,
}

/// Connects the local JTAG master to the JTAG server of another simulator.
pub struct JtagClient {
    link: Link,
    divider: RateDivider,
    last_tck: Option<bool>,
}

impl JtagClient {
    pub fn connect(addr: impl ToSocketAddrs, divider: RateDivider) -> io::Result<JtagClient> {
        let link = Link::connect(addr)?;
        log::info!("Connected to remote JTAG {}", link.tcp.peer_addr()?);
        Ok(JtagClient {
            link,
            divider,
            last_tck: None,
        })
    }
}

impl CycleHook for JtagClient {
    type Pins = JtagClientPins;
    type Error = ReadError;

    fn cycle(&mut self, tick: u64, pins: &mut JtagClientPins) -> Result<(), ReadError> {
        if !self.divider.is_due(tick) || self.last_tck == Some(pins.tck) {
            return Ok(());
        }
        self.last_tck = Some(pins.tck);

        let sample = self
            .link
            .exchange(Command::signals(pins.tck, pins.tms, pins.tdi))?;
        pins.tdo = sample.tdo;
        if !pins.tms_oe {
            pins.tms = sample.swdio;
        }
        Ok(())
    }
}

/// Local SWD master pins mirrored onto a remote target.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SwdClientPins {
    pub swclk: bool,
    pub swdout: bool,
    /// Whether the local side drives SWDIO
    pub swdoe: bool,
    /// SWDIO as driven by the remote target
    pub swdin: bool,
}

/// Connects the local SWD master to the JTAG server of another simulator.
///
/// SWCLK travels as `tck` and SWDIO as `tms`. The remote target's SWDIO output is read back
/// through the `tdo` bit of the `'S'` response.
pub struct SwdClient {
    link: Link,
    divider: RateDivider,
    last_swclk: bool,
}

impl SwdClient {
    pub fn connect(addr: impl ToSocketAddrs, divider: RateDivider) -> io::Result<SwdClient> {
        let link = Link::connect(addr)?;
        log::info!("Connected to remote SWD {}", link.tcp.peer_addr()?);
        Ok(SwdClient {
            link,
            divider,
            last_swclk: false,
        })
    }
}

impl CycleHook for SwdClient {
    type Pins = SwdClientPins;
    type Error = ReadError;

    fn cycle(&mut self, tick: u64, pins: &mut SwdClientPins) -> Result<(), ReadError> {
        // SWCLK is divided from the system clock, only edges matter.
        if !self.divider.is_due(tick) || pins.swclk == self.last_swclk {
            return Ok(());
        }
        self.last_swclk = pins.swclk;

        let signals = Command::signals(pins.swclk, pins.swdout, false);
        if pins.swdoe {
            self.link.send(&[signals.to_byte()])
        } else {
            pins.swdin = self.link.exchange(signals)?.tdo;
            Ok(())
        }
    }
}
