//! # Simulation Bridge Protocol Library
//!
//! This crate contains the wire formats spoken between a cycle-driven hardware simulator
//! and a TCP peer such as an OpenOCD `remote_bitbang` client, a UART terminal or a second
//! simulator instance.
//!
//! ## Overview
//!
//! Every unit on the wire is a single byte. There are no length prefixes and no message
//! boundaries except for the GPIO batch delimiter. This library allows you to:
//!
//! - Decode bitbang command bytes into pin levels and encode pin samples as response bytes
//! - Encode a wide GPIO bus as a stream of level-change events
//! - Apply received GPIO events to an input bus
//! - Frame both protocols for async peers (feature `tokio`)
//!
//! It also defines [`hook::CycleHook`] and [`hook::RateDivider`], the contract through which
//! the simulation clock drives every adapter of the bridge, server or client.
//!
//! ## Bitbang Commands
//!
//! | Byte | Meaning |
//! |---|---|
//! | `'0'..='7'` | set `tdi` (bit 0), `tms`/`swdio` (bit 1), `tck` (bit 2) |
//! | `'r'..='u'` | reset control, bit 0 asserts `srst` (active low), bit 1 asserts `trst` |
//! | `'R'` | sample `tdo`, answered with `'0'` or `'1'` |
//! | `'S'` | sample `tdo` and `swdio`, answered with `'0' + tdo + 2 * swdio` |
//! | `'b'`, `'B'` | LED control, no response |
//!
//! ```
//! use simbridge_protocol::bitbang::{Command, Sample};
//!
//! let cmd = Command::from_byte(b'5');
//! assert_eq!(cmd, Command::Signals { tck: true, tms: false, tdi: true });
//! assert_eq!(cmd.to_byte(), b'5');
//!
//! let sample = Sample { tdo: true, swdio: true };
//! assert_eq!(sample.swd_byte(), b'3');
//! assert_eq!(Sample::from_byte(b'3').unwrap(), sample);
//! ```
//!
//! ## GPIO Delta Events
//!
//! A GPIO event is `index | (level << 7)`. The first encode after activation reports every
//! line, later encodes only report lines that changed.
//!
//! ```
//! use simbridge_protocol::gpio::{GpioDeltaEncoder, GpioEvent};
//!
//! let mut encoder = GpioDeltaEncoder::new(8);
//! let mut resync = Vec::new();
//! encoder.encode(0x00, |event| resync.push(event));
//! assert_eq!(resync.len(), 8);
//!
//! let mut bytes = Vec::new();
//! encoder.encode(0x05, |event| bytes.push(event.to_byte()));
//! assert_eq!(bytes, vec![0x80, 0x82]);
//! assert_eq!(GpioEvent::from_byte(0x82), GpioEvent { index: 2, level: true });
//! ```
//!
//! ## Error Handling
//!
//! Malformed commands are never errors: they decode to [`bitbang::Command::Ignored`].
//! Only a peer reading responses can observe a malformed byte, reported as
//! [`error::ReadError`].

pub mod bitbang;
pub mod error;
pub mod gpio;
pub mod hook;

#[cfg(feature = "tokio")]
pub mod codec;
