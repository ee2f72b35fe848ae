//! Two simulations connected through a server adapter and its client counterpart.
use std::time::{Duration, Instant};

use simbridge_client::{GpioClient, JtagClient, JtagClientPins, SwdClient, SwdClientPins};
use simbridge_protocol::{
    gpio::GpioPins,
    hook::{CycleHook, RateDivider},
};
use simbridge_server::{
    gpio::{self, GpioServer},
    jtag::{JtagPins, JtagServer},
    transport::Config,
};
use simbridge_tests::SimThread;

const TIMEOUT: Duration = Duration::from_secs(5);

fn jtag_server() -> (JtagServer, std::net::SocketAddr) {
    let server =
        JtagServer::bind_with_config("127.0.0.1:0", RateDivider::EVERY_TICK, Config::default())
            .unwrap();
    let addr = server.transport().local_addr();
    (server, addr)
}

#[test]
fn jtag_client_drives_remote_target() {
    let (server, addr) = jtag_server();
    let remote = SimThread::spawn(server, JtagPins::default(), |pins: &mut JtagPins| {
        pins.tdo = !pins.tdi;
    });

    let mut client = JtagClient::connect(addr, RateDivider::EVERY_TICK).unwrap();
    let mut pins = JtagClientPins {
        tms_oe: true,
        ..JtagClientPins::default()
    };
    for tick in 0..64 {
        pins.tck = tick % 2 == 1;
        pins.tdi = tick % 4 < 2;
        client.cycle(tick, &mut pins).unwrap();
        assert_eq!(pins.tdo, !pins.tdi, "tick {}", tick);
    }

    let remote_pins = remote.stop();
    assert_eq!(remote_pins.tck, pins.tck);
    assert_eq!(remote_pins.tdi, pins.tdi);
}

#[test]
fn jtag_client_follows_remote_tms_when_not_driving() {
    let (server, addr) = jtag_server();
    let remote = SimThread::spawn(server, JtagPins::default(), |_: &mut JtagPins| {});

    let mut client = JtagClient::connect(addr, RateDivider::EVERY_TICK).unwrap();
    let mut pins = JtagClientPins {
        tms: true,
        tms_oe: true,
        ..JtagClientPins::default()
    };
    client.cycle(0, &mut pins).unwrap();
    assert!(pins.tms);

    // Released: TMS now follows what the remote side reports.
    pins.tms_oe = false;
    pins.tck = true;
    client.cycle(1, &mut pins).unwrap();
    assert!(pins.tms);
    drop(remote);
}

#[test]
fn swd_client_reads_remote_swdio() {
    let (server, addr) = jtag_server();
    let remote = SimThread::spawn(server, JtagPins::default(), |pins: &mut JtagPins| {
        // The remote target drives SWDIO back through TDO while the host listens.
        pins.tdo = pins.tck;
    });

    let mut client = SwdClient::connect(addr, RateDivider::EVERY_TICK).unwrap();
    let mut pins = SwdClientPins::default();
    for tick in 0..32 {
        pins.swclk = tick % 2 == 0;
        pins.swdoe = tick < 16;
        pins.swdout = true;
        client.cycle(tick, &mut pins).unwrap();
        if !pins.swdoe {
            assert_eq!(pins.swdin, pins.swclk, "tick {}", tick);
        }
    }
    let remote_pins = remote.stop();
    assert!(remote_pins.tms);
}

#[test]
fn gpio_buses_cross_over() {
    let mut server = GpioServer::bind("127.0.0.1:0", RateDivider::EVERY_TICK, 16, 16).unwrap();
    let addr = server.transport().local_addr();
    let mut client = GpioClient::connect(
        addr,
        RateDivider::new(gpio::DEFAULT_DIVIDER).unwrap(),
        16,
        16,
    )
    .unwrap();

    let mut server_pins = GpioPins {
        inputs: 0,
        outputs: 0xA5A5,
    };
    let mut client_pins = GpioPins {
        inputs: 0xFFFF,
        outputs: 0x0F0F,
    };

    let start = Instant::now();
    let mut tick = 0;
    while client_pins.inputs != 0xA5A5 || server_pins.inputs != 0x0F0F {
        assert!(start.elapsed() < TIMEOUT, "buses never converged");
        let Ok(()) = server.cycle(tick, &mut server_pins);
        client.cycle(tick, &mut client_pins).unwrap();
        tick += 1;
    }

    // A single change travels as a single event.
    server_pins.outputs ^= 1 << 15;
    client_pins.outputs ^= 1;
    while client_pins.inputs != 0x25A5 || server_pins.inputs != 0x0F0E {
        assert!(start.elapsed() < TIMEOUT, "change never arrived");
        let Ok(()) = server.cycle(tick, &mut server_pins);
        client.cycle(tick, &mut client_pins).unwrap();
        tick += 1;
    }
}
