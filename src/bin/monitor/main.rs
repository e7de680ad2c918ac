mod gui;

use clap::Parser;
use gui::engage_gui;
use log::info;
use std::{error::Error, net::UdpSocket};

/// Plots the records a running `tactileforce` sends.
#[derive(Debug, Parser)]
#[clap(version, about)]
struct MonitorArgs {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Seconds of history to keep on screen
    #[arg(short, long, default_value_t = 10.0)]
    window: f64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = MonitorArgs::parse();

    let socket = UdpSocket::bind(("0.0.0.0", args.port))?;
    socket.set_nonblocking(true)?;
    info!("listening on {}", socket.local_addr()?);

    engage_gui(socket, args.window)
}
