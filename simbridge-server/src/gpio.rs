//! # GPIO Delta Adapter
//!
//! Reports changes of the target's GPIO outputs to the peer and applies the peer's
//! changes to the target's GPIO inputs. Outputs are sent unterminated and flushed by the
//! transport. Inputs arrive in batches terminated by
//! [`FLUSH`](simbridge_protocol::gpio::FLUSH); one batch is applied
//! per due tick so both simulators stay cycle aligned.
use std::{convert::Infallible, io, iter, net::ToSocketAddrs};

pub use simbridge_protocol::gpio::GpioPins;
use simbridge_protocol::{
    gpio::{GpioDeltaEncoder, MAX_LINES, apply_events},
    hook::{CycleHook, RateDivider},
};

use crate::transport::{Builder, Transport};

/// Default rate divider of the GPIO adapters.
pub const DEFAULT_DIVIDER: u32 = 2;

pub struct GpioServer {
    transport: Transport,
    divider: RateDivider,
    encoder: GpioDeltaEncoder,
    input_count: usize,
}

impl GpioServer {
    pub fn bind(
        addr: impl ToSocketAddrs,
        divider: RateDivider,
        input_count: usize,
        output_count: usize,
    ) -> io::Result<GpioServer> {
        Ok(GpioServer::new(
            Builder::new().start("GPIOServer", addr)?,
            divider,
            input_count,
            output_count,
        ))
    }

    pub fn new(
        transport: Transport,
        divider: RateDivider,
        input_count: usize,
        output_count: usize,
    ) -> GpioServer {
        GpioServer {
            transport,
            divider,
            encoder: GpioDeltaEncoder::new(output_count),
            input_count: input_count.min(MAX_LINES),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

impl CycleHook for GpioServer {
    type Pins = GpioPins;
    type Error = Infallible;

    fn cycle(&mut self, tick: u64, pins: &mut GpioPins) -> Result<(), Infallible> {
        if !self.divider.is_due(tick) {
            return Ok(());
        }
        let (commands, responses) = self.transport.split();

        self.encoder.encode(pins.outputs, |event| {
            if !responses.push(event.to_byte()) {
                log::warn!("GPIOServer: failed to send GPIO {}", event.index);
            }
        });

        let outcome = apply_events(
            &mut pins.inputs,
            self.input_count,
            iter::from_fn(|| commands.pop()),
        );
        if outcome.consumed > 0 && !outcome.delimited {
            log::trace!("GPIOServer: partial batch of {} bytes", outcome.consumed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::Config;
    use simbridge_protocol::gpio::FLUSH;
    use std::{
        io::{Read, Write},
        net::TcpStream,
        thread,
        time::{Duration, Instant},
    };

    fn connected_server(input_count: usize, output_count: usize) -> (GpioServer, TcpStream) {
        let transport = Transport::start("GPIOServer", "127.0.0.1:0", Config::default()).unwrap();
        let peer = TcpStream::connect(transport.local_addr()).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        (
            GpioServer::new(transport, RateDivider::EVERY_TICK, input_count, output_count),
            peer,
        )
    }

    fn wait_for_commands(server: &mut GpioServer, count: usize) {
        let start = Instant::now();
        while server.transport.commands().len() < count {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out");
            thread::yield_now();
        }
    }

    #[test]
    fn outputs_resync_then_report_changes() {
        let (mut server, mut peer) = connected_server(0, 8);
        let mut pins = GpioPins::default();
        server.cycle(0, &mut pins).unwrap();
        let mut resync = [0; 8];
        peer.read_exact(&mut resync).unwrap();
        assert_eq!(resync, [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);

        pins.outputs = 0x05;
        server.cycle(1, &mut pins).unwrap();
        server.cycle(2, &mut pins).unwrap();
        let mut changes = [0; 2];
        peer.read_exact(&mut changes).unwrap();
        assert_eq!(changes, [0x80, 0x82]);
    }

    #[test]
    fn inputs_apply_one_batch_per_cycle() {
        let (mut server, mut peer) = connected_server(4, 0);
        peer.write_all(&[0x80, 0x82, FLUSH, 0x83, 0x80 | 9, FLUSH])
            .unwrap();
        wait_for_commands(&mut server, 6);

        let mut pins = GpioPins::default();
        server.cycle(0, &mut pins).unwrap();
        assert_eq!(pins.inputs, 0b0101);
        server.cycle(1, &mut pins).unwrap();
        // Line 9 is beyond the declared count.
        assert_eq!(pins.inputs, 0b1101);
        server.cycle(2, &mut pins).unwrap();
        assert_eq!(pins.inputs, 0b1101);
    }
}
