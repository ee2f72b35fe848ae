//! # Simulation Bridge Client
//!
//! Client counterparts of the bridge adapters, used to chain two simulator instances.
//! One simulator runs a server adapter, the other one connects to it with a client from
//! this crate and mirrors its local pins onto the remote ones.
//!
//! ## Overview
//!
//! Unlike the server adapters, the clients do their I/O inline on the simulation thread:
//!
//! - [`JtagClient`] and [`SwdClient`] exchange one command and one response byte on every
//!   edge of the local clock, blocking until the remote simulator answers
//! - [`GpioClient`] sends changed outputs as a delimited batch and drains whatever inputs
//!   the remote simulator reported so far, without blocking on reads
//!
//! ## Error Handling
//!
//! There is no reconnect logic. Every hook returns a [`ReadError`] when the connection
//! fails or the peer answers with garbage. The two simulators are out of sync from that
//! point on, so callers should abort.
//!
//! ```no_run
//! use simbridge_client::{JtagClient, JtagClientPins};
//! use simbridge_protocol::hook::{CycleHook, RateDivider};
//!
//! let mut client = JtagClient::connect("127.0.0.1:2345", RateDivider::EVERY_TICK)?;
//! let mut pins = JtagClientPins::default();
//! for tick in 0..1000 {
//!     pins.tck = tick % 4 >= 2;
//!     if let Err(e) = client.cycle(tick, &mut pins) {
//!         eprintln!("JTAG client failed: {}", e);
//!         std::process::exit(1);
//!     }
//! }
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## Related Crates
//!
//! - `simbridge-server` - the server adapters these clients connect to
//! - `simbridge-protocol` - wire formats
mod bitbang;
mod gpio;

pub use bitbang::{JtagClient, JtagClientPins, SwdClient, SwdClientPins};
pub use gpio::GpioClient;
pub use simbridge_protocol::error::ReadError;

use std::{
    io::{self, ErrorKind, Write},
    net::TcpStream,
    thread,
};

/// Writes all of `data`, also on a non-blocking stream.
pub(crate) fn write_all(tcp: &mut TcpStream, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match tcp.write(data) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::yield_now(),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
