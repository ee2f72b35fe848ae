use std::{
    io::{self, ErrorKind, Read},
    net::{TcpStream, ToSocketAddrs},
};

use bytes::{BufMut, BytesMut};
use simbridge_protocol::{
    error::ReadError,
    gpio::{FLUSH, GpioDeltaEncoder, GpioEvent, GpioPins, MAX_LINES},
    hook::{CycleHook, RateDivider},
};

use crate::write_all;

const READ_CHUNK: usize = 256;

/// Connects the local GPIO bus to the GPIO server of another simulator.
///
/// Local outputs become the remote inputs and vice versa. A due tick with changed outputs
/// sends one batch terminated by [`FLUSH`]. Every due tick then applies each input change
/// the remote side reported so far. Reads never block.
pub struct GpioClient {
    tcp: TcpStream,
    divider: RateDivider,
    encoder: GpioDeltaEncoder,
    input_count: usize,
    outbound: BytesMut,
}

impl GpioClient {
    pub fn connect(
        addr: impl ToSocketAddrs,
        divider: RateDivider,
        input_count: usize,
        output_count: usize,
    ) -> io::Result<GpioClient> {
        let tcp = TcpStream::connect(addr)?;
        tcp.set_nodelay(true)?;
        tcp.set_nonblocking(true)?;
        log::info!("Connected to remote GPIO {}", tcp.peer_addr()?);
        Ok(GpioClient {
            tcp,
            divider,
            encoder: GpioDeltaEncoder::new(output_count),
            input_count: input_count.min(MAX_LINES),
            outbound: BytesMut::with_capacity(MAX_LINES + 1),
        })
    }

    fn send_outputs(&mut self, outputs: u128) -> Result<(), ReadError> {
        let outbound = &mut self.outbound;
        outbound.clear();
        let changed = self
            .encoder
            .encode(outputs, |event| outbound.put_u8(event.to_byte()));
        // The server applies one batch per due tick, an empty batch would only queue up.
        if changed == 0 {
            return Ok(());
        }
        outbound.put_u8(FLUSH);
        write_all(&mut self.tcp, &self.outbound)?;
        Ok(())
    }

    fn receive_inputs(&mut self, inputs: &mut u128) -> Result<(), ReadError> {
        let mut buf = [0_u8; READ_CHUNK];
        loop {
            match self.tcp.read(&mut buf) {
                Ok(0) => return Err(ReadError::Disconnected),
                Ok(n) => {
                    log::trace!("GPIOClient: recvd={:02x?}", &buf[..n]);
                    for byte in &buf[..n] {
                        GpioEvent::from_byte(*byte).apply(inputs, self.input_count);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl CycleHook for GpioClient {
    type Pins = GpioPins;
    type Error = ReadError;

    fn cycle(&mut self, tick: u64, pins: &mut GpioPins) -> Result<(), ReadError> {
        if !self.divider.is_due(tick) {
            return Ok(());
        }
        self.send_outputs(pins.outputs)?;
        self.receive_inputs(&mut pins.inputs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        io::Write,
        net::TcpListener,
        thread,
        time::{Duration, Instant},
    };

    #[test]
    fn sends_delimited_batches_and_applies_inputs() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut tcp, _) = listener.accept().unwrap();
            tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut batches = [0_u8; 5];
            tcp.read_exact(&mut batches).unwrap();
            tcp.write_all(&[0x81, 0x83]).unwrap();
            // Hand the stream back so it stays open until the client is done.
            (batches, tcp)
        });

        let mut client = GpioClient::connect(addr, RateDivider::EVERY_TICK, 4, 2).unwrap();
        let mut pins = GpioPins {
            inputs: 0,
            outputs: 0b10,
        };
        client.cycle(0, &mut pins).unwrap();
        client.cycle(1, &mut pins).unwrap();
        pins.outputs = 0b11;
        client.cycle(2, &mut pins).unwrap();
        let (batches, _tcp) = server.join().unwrap();

        let start = Instant::now();
        while pins.inputs != 0b1010 {
            assert!(start.elapsed() < Duration::from_secs(5), "inputs never arrived");
            client.cycle(3, &mut pins).unwrap();
        }
        // Resync of both lines, nothing for the unchanged tick, then line 0.
        assert_eq!(batches, [0x00, 0x81, FLUSH, 0x80, FLUSH]);
    }

    #[test]
    fn unchanged_outputs_send_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut tcp, _) = listener.accept().unwrap();
            tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut received = Vec::new();
            tcp.read_to_end(&mut received).unwrap();
            received
        });

        let mut client = GpioClient::connect(addr, RateDivider::EVERY_TICK, 8, 8).unwrap();
        let mut pins = GpioPins {
            inputs: 0,
            outputs: 0x5A,
        };
        for tick in 0..1000 {
            client.cycle(tick, &mut pins).unwrap();
        }
        drop(client);

        let received = server.join().unwrap();
        assert_eq!(received.len(), 9, "one resync batch only");
        assert_eq!(received.iter().filter(|b| **b == FLUSH).count(), 1);
    }

    #[test]
    fn closed_peer_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || drop(listener.accept().unwrap()));
        let mut client = GpioClient::connect(addr, RateDivider::EVERY_TICK, 1, 1).unwrap();
        server.join().unwrap();

        let mut pins = GpioPins::default();
        let start = Instant::now();
        loop {
            if client.cycle(0, &mut pins).is_err() {
                break;
            }
            assert!(start.elapsed() < Duration::from_secs(5), "close never noticed");
            thread::sleep(Duration::from_millis(1));
        }
    }
}
