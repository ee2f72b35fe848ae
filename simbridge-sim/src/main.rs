//! # Simulation Bridge Harness
//!
//! Runs a loopback target model on a free-running clock and attaches the bridge adapters
//! selected on the command line.
//!
//! ## Overview
//!
//! The harness plays the role a simulator testbench plays in a real setup: it owns the
//! pins of the design, evaluates the design once per tick and calls every enabled adapter
//! afterwards. Server adapters let external tools (OpenOCD, a terminal, another simulator)
//! connect. Client adapters connect this simulation to the servers of another one.
//!
//! ```text
//! simbridge --jtag-server --uart-server 7000
//! simbridge --jtag-client --gpio-client --host 10.0.0.2 --timeout 1000000
//! ```
pub mod bridge;
pub mod model;

use std::error::Error;
use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use clap_num::number_range;
use env_logger::Env;
use simbridge_client::{GpioClient, JtagClient, SwdClient};
use simbridge_protocol::{gpio::MAX_LINES, hook::RateDivider};
use simbridge_server::{
    gpio::{self, GpioServer},
    jtag::{self, JtagServer},
    transport::{Builder, FlushPolicy},
    uart::{self, UartServer},
};

use crate::{bridge::Bridge, model::LoopbackTarget};

const DEFAULT_JTAG_PORT: &str = "2345";
const DEFAULT_UART_PORT: &str = "7777";
const DEFAULT_GPIO_PORT: &str = "8888";

fn line_count(s: &str) -> Result<usize, String> {
    number_range(s, 1, MAX_LINES)
}

fn divider(s: &str) -> Result<RateDivider, String> {
    let period = number_range(s, 1, u32::MAX)?;
    RateDivider::new(period).ok_or_else(|| "divider must not be zero".to_string())
}

#[derive(Parser)]
#[command(about = "Bridge a simulated design to JTAG, UART and GPIO peers over TCP", long_about=None)]
struct Args {
    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = DEFAULT_JTAG_PORT)]
    jtag_server: Option<u16>,

    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = DEFAULT_UART_PORT)]
    uart_server: Option<u16>,

    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = DEFAULT_GPIO_PORT)]
    gpio_server: Option<u16>,

    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = DEFAULT_JTAG_PORT)]
    jtag_client: Option<u16>,

    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = DEFAULT_JTAG_PORT)]
    swd_client: Option<u16>,

    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = DEFAULT_GPIO_PORT)]
    gpio_client: Option<u16>,

    /// Address the servers listen on
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Address of the simulator the clients connect to
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Stop after this many ticks, 0 runs forever
    #[arg(short, long, default_value = "0")]
    timeout: u64,

    #[arg(long, default_value = "8", value_parser = line_count)]
    gpio_inputs: usize,

    #[arg(long, default_value = "8", value_parser = line_count)]
    gpio_outputs: usize,

    /// Overrides the rate divider of the JTAG server, or of the JTAG and SWD clients
    #[arg(long, value_parser = divider)]
    jtag_divider: Option<RateDivider>,

    /// Overrides the rate divider of the GPIO server and client
    #[arg(long, value_parser = divider)]
    gpio_divider: Option<RateDivider>,

    /// Dump every byte exchanged by the servers at debug level
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn listen_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind, port)
    }

    fn remote_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.host, port)
    }
}

fn divider_or(divider: Option<RateDivider>, default: u32) -> RateDivider {
    divider
        .or(RateDivider::new(default))
        .unwrap_or(RateDivider::EVERY_TICK)
}

/// Binds the servers and connects the clients. Any failure here is a configuration error.
fn attach(args: &Args) -> Result<Bridge, Box<dyn Error>> {
    let mut bridge = Bridge::new();

    if let Some(port) = args.jtag_server {
        let transport = Builder::new()
            .flush_policy(FlushPolicy::BITBANG)
            .debug(args.debug)
            .start("JTAGServer", args.listen_addr(port))?;
        let divider = divider_or(args.jtag_divider, jtag::DEFAULT_DIVIDER);
        log::debug!("JTAG server divider {}", divider.period());
        bridge.jtag_server = Some(JtagServer::new(transport, divider));
    }
    if let Some(port) = args.uart_server {
        let transport = Builder::new()
            .debug(args.debug)
            .start("UARTServer", args.listen_addr(port))?;
        bridge.uart_server = Some(UartServer::new(
            transport,
            divider_or(None, uart::DEFAULT_DIVIDER),
        ));
    }
    if let Some(port) = args.gpio_server {
        let transport = Builder::new()
            .debug(args.debug)
            .start("GPIOServer", args.listen_addr(port))?;
        bridge.gpio_server = Some(GpioServer::new(
            transport,
            divider_or(args.gpio_divider, gpio::DEFAULT_DIVIDER),
            args.gpio_inputs,
            args.gpio_outputs,
        ));
    }

    if let Some(port) = args.jtag_client {
        bridge.jtag_client = Some(JtagClient::connect(
            args.remote_addr(port),
            divider_or(args.jtag_divider, 1),
        )?);
    }
    if let Some(port) = args.swd_client {
        bridge.swd_client = Some(SwdClient::connect(
            args.remote_addr(port),
            divider_or(args.jtag_divider, 1),
        )?);
    }
    if let Some(port) = args.gpio_client {
        bridge.gpio_client = Some(GpioClient::connect(
            args.remote_addr(port),
            divider_or(args.gpio_divider, gpio::DEFAULT_DIVIDER),
            args.gpio_inputs,
            args.gpio_outputs,
        )?);
    }
    Ok(bridge)
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting simulation bridge");

    let args = Args::parse();
    log::debug!(
        "Parsed arguments: bind={}, host={}, timeout={}",
        args.bind,
        args.host,
        args.timeout
    );

    let mut bridge = match attach(&args) {
        Ok(bridge) => bridge,
        Err(e) => {
            log::error!("Failed to set up the bridge: {}", e);
            std::process::exit(1);
        }
    };

    let mut target = LoopbackTarget::new(args.gpio_outputs);
    if let Err(e) = bridge.run(&mut target, args.timeout) {
        log::error!("Connection to the remote simulator lost: {}", e);
        std::process::exit(1);
    }
}
