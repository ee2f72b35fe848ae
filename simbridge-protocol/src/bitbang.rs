//! Command and response bytes of the OpenOCD `remote_bitbang` protocol, extended with
//! the `'S'` query used for SWD.

use crate::error::ReadError;

const SIGNALS_BASE: u8 = b'0';
const RESET_BASE: u8 = b'r';

/// A single command byte sent from the debugger to the simulated target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Drive the clock, mode-select (or SWDIO) and data-in lines.
    Signals { tck: bool, tms: bool, tdi: bool },
    /// Reset control. Both flags are "asserted" flags, the pins themselves are active low.
    Reset { trst: bool, srst: bool },
    /// Sample TDO. Answered with `'0'` or `'1'`.
    ReadTdo,
    /// Sample TDO and SWDIO. Answered with one byte in `'0'..='3'`.
    ReadSwd,
    /// Debugger LED control. Has no effect on the target.
    Blink { on: bool },
    /// Any byte outside the command set. Silently dropped by the adapter.
    Ignored(u8),
}

impl Command {
    /// Convenience constructor for a [`Command::Signals`] byte.
    pub fn signals(tck: bool, tms: bool, tdi: bool) -> Command {
        Command::Signals { tck, tms, tdi }
    }

    /// Decodes one byte received on the wire. This never fails, unknown bytes map to
    /// [`Command::Ignored`].
    pub fn from_byte(byte: u8) -> Command {
        match byte {
            b'0'..=b'7' => {
                let bits = byte - SIGNALS_BASE;
                Command::Signals {
                    tck: bits & 4 != 0,
                    tms: bits & 2 != 0,
                    tdi: bits & 1 != 0,
                }
            }
            b'r'..=b'u' => {
                let bits = byte - RESET_BASE;
                Command::Reset {
                    trst: bits & 2 != 0,
                    srst: bits & 1 != 0,
                }
            }
            b'R' => Command::ReadTdo,
            b'S' => Command::ReadSwd,
            b'B' => Command::Blink { on: true },
            b'b' => Command::Blink { on: false },
            other => Command::Ignored(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Command::Signals { tck, tms, tdi } => {
                SIGNALS_BASE | (u8::from(tck) << 2) | (u8::from(tms) << 1) | u8::from(tdi)
            }
            Command::Reset { trst, srst } => RESET_BASE + ((u8::from(trst) << 1) | u8::from(srst)),
            Command::ReadTdo => b'R',
            Command::ReadSwd => b'S',
            Command::Blink { on: true } => b'B',
            Command::Blink { on: false } => b'b',
            Command::Ignored(byte) => byte,
        }
    }

    /// Whether the command expects exactly one response byte.
    pub fn is_query(&self) -> bool {
        matches!(self, Command::ReadTdo | Command::ReadSwd)
    }

    /// The level of the active-low SRST pin after applying a [`Command::Reset`].
    pub fn srst_level(srst_asserted: bool) -> bool {
        !srst_asserted
    }
}

/// The pin levels reported back to the debugger for a query command.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Sample {
    pub tdo: bool,
    pub swdio: bool,
}

impl Sample {
    /// Response byte for [`Command::ReadTdo`].
    pub fn tdo_byte(self) -> u8 {
        if self.tdo { b'1' } else { b'0' }
    }

    /// Response byte for [`Command::ReadSwd`]: `'0' + tdo + 2 * swdio`.
    pub fn swd_byte(self) -> u8 {
        b'0' + u8::from(self.tdo) + 2 * u8::from(self.swdio)
    }

    /// The response byte for `query`, or `None` if `query` is not a query command.
    pub fn response_to(self, query: Command) -> Option<u8> {
        match query {
            Command::ReadTdo => Some(self.tdo_byte()),
            Command::ReadSwd => Some(self.swd_byte()),
            _ => None,
        }
    }

    /// Parses a response byte. Answers to `'R'` parse with `swdio` cleared.
    pub fn from_byte(byte: u8) -> Result<Sample, ReadError> {
        match byte {
            b'0'..=b'3' => {
                let bits = byte - b'0';
                Ok(Sample {
                    tdo: bits & 1 != 0,
                    swdio: bits & 2 != 0,
                })
            }
            other => Err(ReadError::InvalidResponse(other)),
        }
    }
}
