use std::{
    io::{self, ErrorKind, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    os::fd::AsRawFd,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use bytes::{Buf, BufMut, BytesMut};
use nix::sys::socket::{Shutdown, shutdown};

use crate::channel::{self, Consumer, Producer};

const READ_CHUNK: usize = 256;
const ACCEPT_RETRY: Duration = Duration::from_millis(10);

/// When bytes queued by the adapter are written to the socket.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlushPolicy {
    /// Write whatever is queued on every poll iteration.
    Immediate,
    /// Collect bytes and write them once more than `threshold` are pending, or once a
    /// non-empty batch has waited `max_idle_polls` poll iterations.
    Batched {
        threshold: usize,
        max_idle_polls: u32,
    },
}

impl FlushPolicy {
    /// Batching used for bitbang TDO samples.
    pub const BITBANG: FlushPolicy = FlushPolicy::Batched {
        threshold: 33,
        max_idle_polls: 10_000,
    };
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of each of the two byte channels.
    pub channel_capacity: usize,
    /// Unconsumed inbound bytes above which the simulation is reported as lagging.
    pub backlog_warning: usize,
    pub flush: FlushPolicy,
    /// Log every received and sent chunk at debug level instead of trace.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_capacity: 4096,
            backlog_warning: 100,
            flush: FlushPolicy::Immediate,
            debug: false,
        }
    }
}

/// Builder to start a [Transport] with modified configuration options
///
/// # Example
///
/// ```no_run
/// use simbridge_server::transport::{Builder, FlushPolicy};
///
/// let transport = Builder::new()
///     .flush_policy(FlushPolicy::BITBANG)
///     .channel_capacity(1024)
///     .start("JTAGServer", "127.0.0.1:2345")
///     .expect("port should be free");
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn backlog_warning(mut self, bytes: usize) -> Self {
        self.config.backlog_warning = bytes;
        self
    }

    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.config.flush = policy;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn config(self) -> Config {
        self.config
    }

    /// Bind and start the transport
    pub fn start(self, name: &'static str, addr: impl ToSocketAddrs) -> io::Result<Transport> {
        Transport::start(name, addr, self.config)
    }
}

/// A TCP listener serving one peer at a time on a background thread.
///
/// Bytes received from the peer are queued as commands, bytes queued as responses by the
/// adapter are written to the peer. When the peer disconnects the thread goes back to
/// accepting, queued bytes in both directions are kept.
pub struct Transport {
    name: &'static str,
    local_addr: SocketAddr,
    listener: TcpListener,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    commands: Consumer,
    responses: Producer,
}

impl Transport {
    /// Binds `addr` and spawns the session thread. A bind failure is returned to the caller,
    /// it indicates a configuration error.
    pub fn start(
        name: &'static str,
        addr: impl ToSocketAddrs,
        config: Config,
    ) -> io::Result<Transport> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        log::info!("{} listening on {}", name, local_addr);

        let (inbound, commands) = channel::channel(config.channel_capacity);
        let (responses, outbound) = channel::channel(config.channel_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(false));

        let session = Session {
            name,
            listener: listener.try_clone()?,
            running: Arc::clone(&running),
            connected: Arc::clone(&connected),
            inbound,
            outbound,
            batch: Batch::new(config.flush),
            backlog: Backlog::new(config.backlog_warning),
            config,
        };
        let thread = thread::Builder::new()
            .name(format!("{}-transport", name))
            .spawn(move || session.run())?;

        Ok(Transport {
            name,
            local_addr,
            listener,
            running,
            connected,
            thread: Some(thread),
            commands,
            responses,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether a peer is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Bytes received from the peer, read by the adapter.
    pub fn commands(&mut self) -> &mut Consumer {
        &mut self.commands
    }

    /// Bytes for the peer, written by the adapter.
    pub fn responses(&mut self) -> &mut Producer {
        &mut self.responses
    }

    /// Both adapter-side handles at once.
    pub fn split(&mut self) -> (&mut Consumer, &mut Producer) {
        (&mut self.commands, &mut self.responses)
    }

    /// Queues a response byte, reporting a full channel. Never blocks.
    pub fn respond(&mut self, byte: u8) -> bool {
        let queued = self.responses.push(byte);
        if !queued {
            log::warn!("{}: response queue full, dropping 0x{:02x}", self.name, byte);
        }
        queued
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        // Shutting down the listening socket makes a pending accept return.
        if let Err(e) = shutdown(self.listener.as_raw_fd(), Shutdown::Both) {
            log::debug!("{}: listener shutdown failed ({}), waking accept", self.name, e);
            let mut wake_addr = self.local_addr;
            if wake_addr.ip().is_unspecified() {
                wake_addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into());
            }
            let _ = TcpStream::connect(wake_addr);
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("{}: transport thread panicked", self.name);
        }
    }
}

/// Outbound bytes waiting to be written, and the decision when to write them.
#[derive(Debug)]
struct Batch {
    policy: FlushPolicy,
    pending: BytesMut,
    idle_polls: u32,
}

impl Batch {
    fn new(policy: FlushPolicy) -> Batch {
        let capacity = match policy {
            FlushPolicy::Immediate => READ_CHUNK,
            FlushPolicy::Batched { threshold, .. } => threshold + 1,
        };
        Batch {
            policy,
            pending: BytesMut::with_capacity(capacity),
            idle_polls: 0,
        }
    }

    /// Moves queued responses into the batch. Returns whether the batch must be written now.
    fn poll(&mut self, outbound: &mut Consumer) -> bool {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            let n = outbound.pop_slice(&mut chunk);
            if n == 0 {
                break;
            }
            self.pending.put_slice(&chunk[..n]);
        }
        if self.pending.is_empty() {
            return false;
        }
        match self.policy {
            FlushPolicy::Immediate => true,
            FlushPolicy::Batched {
                threshold,
                max_idle_polls,
            } => {
                self.idle_polls += 1;
                self.pending.len() > threshold || self.idle_polls >= max_idle_polls
            }
        }
    }

    fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drops `n` written bytes from the front of the batch.
    fn written(&mut self, n: usize) {
        self.pending.advance(n);
        if self.pending.is_empty() {
            self.idle_polls = 0;
        }
    }
}

/// Tracks whether the unconsumed command backlog is above the warning threshold.
#[derive(Debug)]
struct Backlog {
    threshold: usize,
    warned: bool,
}

impl Backlog {
    fn new(threshold: usize) -> Backlog {
        Backlog {
            threshold,
            warned: false,
        }
    }

    /// Returns true when `len` crosses the threshold, once per crossing.
    fn exceeded(&mut self, len: usize) -> bool {
        if len > self.threshold {
            let first = !self.warned;
            self.warned = true;
            first
        } else {
            self.warned = false;
            false
        }
    }
}

/// State owned by the transport thread.
struct Session {
    name: &'static str,
    listener: TcpListener,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    inbound: Producer,
    outbound: Consumer,
    batch: Batch,
    backlog: Backlog,
    config: Config,
}

impl Session {
    fn run(mut self) {
        while self.running.load(Ordering::Acquire) {
            let (stream, peer) = match self.listener.accept() {
                Ok(connection) => connection,
                Err(e) => {
                    if self.running.load(Ordering::Acquire) {
                        log::error!("{}: accept failed: {}", self.name, e);
                        thread::sleep(ACCEPT_RETRY);
                    }
                    continue;
                }
            };
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            log::info!("{} connected to {}", self.name, peer);
            self.connected.store(true, Ordering::Release);
            let result = self.serve(stream);
            self.connected.store(false, Ordering::Release);
            match result {
                Ok(()) if self.running.load(Ordering::Acquire) => {
                    log::info!("{}: connection closed, restarting...", self.name)
                }
                Ok(()) => {}
                Err(e) => log::error!("{}: connection error: {}, restarting...", self.name, e),
            }
        }
        log::info!("{} terminating", self.name);
    }

    /// Serves one peer until it disconnects or the transport stops.
    fn serve(&mut self, mut tcp: TcpStream) -> io::Result<()> {
        tcp.set_nonblocking(true)?;
        tcp.set_nodelay(true)?;

        let mut buf = [0_u8; READ_CHUNK];
        while self.running.load(Ordering::Acquire) {
            let mut idle = true;
            match tcp.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    idle = false;
                    self.enqueue(&buf[..n]);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
            self.check_backlog();

            if self.batch.poll(&mut self.outbound) {
                idle = false;
                if self.config.debug {
                    log::debug!("{}: resp={:02x?}", self.name, self.batch.pending());
                } else {
                    log::trace!("{}: resp={:02x?}", self.name, self.batch.pending());
                }
                write_batch(&mut tcp, &mut self.batch, &self.running)?;
            }

            if idle {
                thread::yield_now();
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, data: &[u8]) {
        if self.config.debug {
            log::debug!("{}: recvd={:02x?} len={}", self.name, data, data.len());
        } else {
            log::trace!("{}: recvd={:02x?} len={}", self.name, data, data.len());
        }
        let queued = self.inbound.push_slice(data);
        if queued < data.len() {
            log::warn!(
                "{}: command queue full, dropped {} bytes",
                self.name,
                data.len() - queued
            );
        }
    }

    fn check_backlog(&mut self) {
        let backlog = self.inbound.len();
        if self.backlog.exceeded(backlog) {
            log::warn!(
                "{}: {} unconsumed command bytes, simulation is not keeping up",
                self.name,
                backlog
            );
        }
    }
}

/// Writes the whole batch to a non-blocking stream. Written bytes leave the batch as they
/// go, so after an error only the unsent tail is kept for the next peer.
fn write_batch(tcp: &mut TcpStream, batch: &mut Batch, running: &AtomicBool) -> io::Result<()> {
    while !batch.pending().is_empty() {
        match tcp.write(batch.pending()) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => batch.written(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if !running.load(Ordering::Acquire) {
                    return Err(io::Error::from(ErrorKind::Interrupted));
                }
                thread::yield_now();
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let start = Instant::now();
        while !condition() {
            assert!(start.elapsed() < TIMEOUT, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn collect(transport: &mut Transport, count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        wait_for(|| {
            while let Some(byte) = transport.commands().pop() {
                out.push(byte);
            }
            out.len() >= count
        });
        out
    }

    #[test]
    fn batch_immediate_flushes_every_poll() {
        let (mut tx, mut rx) = channel::channel(64);
        let mut batch = Batch::new(FlushPolicy::Immediate);
        assert!(!batch.poll(&mut rx));
        assert!(tx.push(b'1'));
        assert!(batch.poll(&mut rx));
        assert_eq!(batch.pending(), b"1");
        let sent = batch.pending().len();
        batch.written(sent);
        assert!(!batch.poll(&mut rx));
    }

    #[test]
    fn batch_flushes_above_threshold() {
        let (mut tx, mut rx) = channel::channel(64);
        let mut batch = Batch::new(FlushPolicy::BITBANG);
        assert_eq!(tx.push_slice(&[b'0'; 33]), 33);
        assert!(!batch.poll(&mut rx));
        assert!(tx.push(b'1'));
        assert!(batch.poll(&mut rx));
        assert_eq!(batch.pending().len(), 34);
    }

    #[test]
    fn batch_flushes_after_idle_polls() {
        let (mut tx, mut rx) = channel::channel(64);
        let mut batch = Batch::new(FlushPolicy::Batched {
            threshold: 33,
            max_idle_polls: 10_000,
        });
        assert!(tx.push(b'1'));
        for _ in 0..9_999 {
            assert!(!batch.poll(&mut rx));
        }
        assert!(batch.poll(&mut rx));
        let sent = batch.pending().len();
        batch.written(sent);
        // The idle counter starts over with the next batch.
        assert!(tx.push(b'0'));
        assert!(!batch.poll(&mut rx));
    }

    #[test]
    fn batch_never_holds_more_than_threshold() {
        let (mut tx, mut rx) = channel::channel(256);
        let mut batch = Batch::new(FlushPolicy::BITBANG);
        let mut state = 7_u32;
        for _ in 0..2_000 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let burst = (state >> 16) as usize % 12;
            assert_eq!(tx.push_slice(&vec![b'1'; burst]), burst);
            if batch.poll(&mut rx) {
                let sent = batch.pending().len();
                batch.written(sent);
            }
            assert!(batch.pending().len() <= 33);
        }
    }

    #[test]
    fn partial_write_keeps_only_the_tail() {
        let (mut tx, mut rx) = channel::channel(64);
        let mut batch = Batch::new(FlushPolicy::Immediate);
        assert_eq!(tx.push_slice(b"01101"), 5);
        assert!(batch.poll(&mut rx));
        batch.written(3);
        assert_eq!(batch.pending(), b"01");

        // Later responses queue up behind the unsent tail.
        assert!(tx.push(b'1'));
        assert!(batch.poll(&mut rx));
        assert_eq!(batch.pending(), b"011");
        batch.written(3);
        assert!(batch.pending().is_empty());
    }

    #[test]
    fn backlog_warns_once_per_crossing() {
        let mut backlog = Backlog::new(100);
        let warnings: Vec<bool> = [100, 101, 150, 50, 101]
            .into_iter()
            .map(|len| backlog.exceeded(len))
            .collect();
        assert_eq!(warnings, vec![false, true, false, false, true]);
    }

    #[test]
    fn backlog_threshold_follows_config() {
        let config = Builder::new().backlog_warning(4).config();
        let mut backlog = Backlog::new(config.backlog_warning);
        assert!(!backlog.exceeded(4));
        assert!(backlog.exceeded(5));
        assert!(!backlog.exceeded(5));
    }

    #[test]
    fn moves_bytes_both_ways() {
        let mut transport = Transport::start("test", "127.0.0.1:0", Config::default()).unwrap();
        let mut peer = TcpStream::connect(transport.local_addr()).unwrap();
        peer.set_read_timeout(Some(TIMEOUT)).unwrap();

        peer.write_all(b"R01").unwrap();
        assert_eq!(collect(&mut transport, 3), b"R01");

        assert!(transport.respond(b'1'));
        let mut buf = [0; 1];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"1");
    }

    #[test]
    fn reconnect_keeps_unflushed_responses() {
        let mut transport = Transport::start("test", "127.0.0.1:0", Config::default()).unwrap();
        let peer = TcpStream::connect(transport.local_addr()).unwrap();
        wait_for(|| transport.is_connected());
        drop(peer);
        wait_for(|| !transport.is_connected());

        for byte in b"0110" {
            assert!(transport.respond(*byte));
        }

        let mut peer = TcpStream::connect(transport.local_addr()).unwrap();
        peer.set_read_timeout(Some(TIMEOUT)).unwrap();
        let mut buf = [0; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0110");

        peer.write_all(b"S").unwrap();
        assert_eq!(collect(&mut transport, 1), b"S");
    }

    #[test]
    fn drop_stops_waiting_thread() {
        let transport = Transport::start("test", "127.0.0.1:0", Config::default()).unwrap();
        let addr = transport.local_addr();
        drop(transport);
        // The listener is gone once drop has joined the thread.
        assert!(TcpStream::connect(addr).is_err());
    }

    #[test]
    fn bind_error_is_reported() {
        let transport = Transport::start("first", "127.0.0.1:0", Config::default()).unwrap();
        let taken = transport.local_addr();
        assert!(Transport::start("second", taken, Config::default()).is_err());
    }
}
