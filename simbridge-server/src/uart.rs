//! # UART Byte Adapter
//!
//! Converts between the serial bit stream on the simulated UART pins and whole bytes on
//! the socket. The bit timing is fixed: the adapter samples on even ticks (32 samples per
//! bit) so one bit lasts [`BIT_PERIOD`] ticks. A target running at a different baud rate
//! is not detected and produces garbage.
//!
//! Two independent state machines run on every due tick, each advancing only on its own
//! bit boundaries:
//!
//! - [`UartReceiver`] watches the target's serial output and assembles bytes for the host
//! - [`UartTransmitter`] shifts bytes from the host into the target's serial input
use std::{convert::Infallible, io, net::ToSocketAddrs};

use simbridge_protocol::hook::{CycleHook, RateDivider};

use crate::transport::{Builder, Transport};

/// Ticks per serial bit.
pub const BIT_PERIOD: u64 = 64;

/// Default rate divider of the UART adapter, i.e. every other half-tick.
pub const DEFAULT_DIVIDER: u32 = 2;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
enum RxPhase {
    #[default]
    Idle,
    Data,
    Stop,
}

/// Assembles bytes from the target's serial output, LSB first.
#[derive(Debug)]
pub struct UartReceiver {
    phase: RxPhase,
    start: Option<u64>,
    shift: u8,
    count: u8,
    last_level: bool,
}

impl Default for UartReceiver {
    fn default() -> Self {
        UartReceiver {
            phase: RxPhase::Idle,
            start: None,
            shift: 0,
            count: 0,
            last_level: true,
        }
    }
}

impl UartReceiver {
    pub fn new() -> UartReceiver {
        UartReceiver::default()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == RxPhase::Idle
    }

    /// Samples `level` at tick `t`. Returns the received byte when its stop bit is sampled.
    ///
    /// A low stop bit is reported but the byte is delivered anyway.
    pub fn sample(&mut self, t: u64, level: bool) -> Option<u8> {
        let falling = self.last_level && !level;
        self.last_level = level;
        if let Some(start) = self.start
            && (t - start) % BIT_PERIOD != 0
        {
            return None;
        }

        match self.phase {
            RxPhase::Idle => {
                if falling {
                    self.phase = RxPhase::Data;
                    self.start = Some(t);
                }
                None
            }
            RxPhase::Data => {
                self.shift >>= 1;
                if level {
                    self.shift |= 0x80;
                }
                self.count += 1;
                if self.count == 8 {
                    self.phase = RxPhase::Stop;
                }
                None
            }
            RxPhase::Stop => {
                if !level {
                    log::warn!("UARTServer: stop bit error at t={}", t);
                }
                let byte = self.shift;
                *self = UartReceiver {
                    last_level: level,
                    ..UartReceiver::default()
                };
                Some(byte)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
enum TxPhase {
    #[default]
    Idle,
    Data,
    Stop,
    Done,
}

/// Drives bytes onto the target's serial input: start bit, 8 data bits LSB first, stop bit.
#[derive(Debug, Default)]
pub struct UartTransmitter {
    phase: TxPhase,
    start: Option<u64>,
    shift: u8,
    count: u8,
}

impl UartTransmitter {
    pub fn new() -> UartTransmitter {
        UartTransmitter::default()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == TxPhase::Idle
    }

    /// Advances the transmitter at tick `t`. When idle, `next` is asked for the next byte.
    pub fn drive(&mut self, t: u64, line: &mut bool, next: impl FnOnce() -> Option<u8>) {
        if let Some(start) = self.start
            && (t - start) % BIT_PERIOD != 0
        {
            return;
        }

        match self.phase {
            TxPhase::Idle => {
                if let Some(byte) = next() {
                    *line = false;
                    self.shift = byte;
                    self.phase = TxPhase::Data;
                    self.start = Some(t);
                }
            }
            TxPhase::Data => {
                *line = self.shift & 1 != 0;
                self.shift >>= 1;
                self.count += 1;
                if self.count == 8 {
                    self.phase = TxPhase::Stop;
                }
            }
            TxPhase::Stop => {
                *line = true;
                self.phase = TxPhase::Done;
            }
            TxPhase::Done => *self = UartTransmitter::default(),
        }
    }
}

/// Serial pins of the target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UartPins {
    /// Serial output of the target, sampled by the adapter
    pub tx: bool,
    /// Serial input of the target, driven by the adapter
    pub rx: bool,
}

impl Default for UartPins {
    fn default() -> Self {
        UartPins { tx: true, rx: true }
    }
}

pub struct UartServer {
    transport: Transport,
    divider: RateDivider,
    receiver: UartReceiver,
    transmitter: UartTransmitter,
}

impl UartServer {
    pub fn bind(addr: impl ToSocketAddrs, divider: RateDivider) -> io::Result<UartServer> {
        Ok(UartServer::new(
            Builder::new().start("UARTServer", addr)?,
            divider,
        ))
    }

    pub fn new(transport: Transport, divider: RateDivider) -> UartServer {
        if BIT_PERIOD % u64::from(divider.period()) != 0 {
            log::warn!(
                "UARTServer: divider {} does not divide the bit period of {} ticks",
                divider.period(),
                BIT_PERIOD
            );
        }
        UartServer {
            transport,
            divider,
            receiver: UartReceiver::new(),
            transmitter: UartTransmitter::new(),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

impl CycleHook for UartServer {
    type Pins = UartPins;
    type Error = Infallible;

    fn cycle(&mut self, tick: u64, pins: &mut UartPins) -> Result<(), Infallible> {
        if !self.divider.is_due(tick) {
            return Ok(());
        }
        if let Some(byte) = self.receiver.sample(tick, pins.tx) {
            log::trace!("UARTServer: => {:02x}", byte);
            self.transport.respond(byte);
        }
        let commands = self.transport.commands();
        self.transmitter.drive(tick, &mut pins.rx, || commands.pop());
        Ok(())
    }
}
