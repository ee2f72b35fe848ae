//! # Simulation Bridge Server Library
//!
//! This crate relays debug signals between a cycle-driven hardware simulator and a TCP peer.
//! Each adapter listens on its own port, accepts one peer at a time and exchanges pin
//! levels with the simulated hardware once per due clock tick.
//!
//! ## Architecture
//!
//! - **[`channel`]**: lock-free single-producer/single-consumer byte queues, the only state
//!   shared between threads
//! - **[`transport::Transport`]**: owns the listener and a background thread that moves
//!   bytes between the socket and the two channels, re-accepting after a disconnect
//! - **Adapters** implementing [`simbridge_protocol::hook::CycleHook`], called from the
//!   simulation thread:
//!   - [`jtag::JtagServer`]: OpenOCD `remote_bitbang` for JTAG and SWD
//!   - [`uart::UartServer`]: serial bit stream to bytes and back
//!   - [`gpio::GpioServer`]: delta encoded GPIO bus
//!
//! ## Thread Model
//!
//! Adapter state lives on the simulation thread only. The transport thread sees raw bytes
//! and nothing else, so no locks are involved. A hook never blocks: an empty command
//! queue means nothing to do this cycle, a full response queue drops the byte with a
//! warning.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use simbridge_protocol::hook::{CycleHook, RateDivider};
//! use simbridge_server::jtag::{JtagPins, JtagServer};
//!
//! let mut server = JtagServer::bind("127.0.0.1:2345", RateDivider::new(8).unwrap())?;
//! let mut pins = JtagPins::default();
//! for tick in 0.. {
//!     // advance the hardware model, which reads tck/tms/tdi/srst and drives tdo
//!     let _ = server.cycle(tick, &mut pins);
//! }
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Binding errors are returned from the constructors and are meant to be fatal. Anything
//! that goes wrong later (peer loss, full queues, malformed bytes) is logged or ignored,
//! and the simulation keeps running.
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics: connection lifecycle at `info`,
//! queue anomalies at `warn` and byte dumps at `trace` (or `debug` with
//! [`transport::Config::debug`]).
pub mod channel;
pub mod gpio;
pub mod jtag;
pub mod transport;
pub mod uart;
