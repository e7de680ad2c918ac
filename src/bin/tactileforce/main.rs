//! Calibrates the fingertip sensors and streams filtered readings to the
//! configured UDP client.

use clap::Parser;
use log::{info, warn};
use serial2::SerialPort;
use std::error::Error;
use tactileforce::{
    args::{CommandTask, TactileForceArgs},
    config::{Config, ForceSensorConfig, TactileSensorConfig},
    control_loop::{CancellationToken, ControlLoop},
    dummy_sensor::{SimulatedAdc, SimulatedSerial},
    force_sensor::{ForceTorqueSensor, FORCE_CHANNELS},
    gui::{device_selector, ContinueDialog},
    handshake::HandshakeTimeouts,
    sensor::ChannelSource,
    tactile_sensor::{TactileSensor, TACTILE_CHANNELS},
    transport::UdpSink,
};

// Example:
// RUST_LOG=info cargo run --bin tactileforce -- --simulate run

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = TactileForceArgs::parse_suggesting();

    let config = Config::from_path(&args.config)?;
    info!("loaded {}", args.config.display());

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    let sink = UdpSink::connect(&config.client.ip, config.client.port)?;
    let mut control = ControlLoop::new(
        config.simulation,
        Box::new(sink),
        Box::new(ContinueDialog::new()),
    );

    if args.command == CommandTask::Run {
        if let Some(force_config) = &config.force_sensor {
            let Some(sensor) = force_sensor(force_config, &args)? else {
                info!("no serial port chosen, exiting");
                return Ok(());
            };
            control = control.with_force_sensor(sensor, &force_config.filter)?;
        }
    }

    match &config.tactile_sensor {
        Some(tactile_config) => {
            let scale = tactile_config
                .output_scale
                .unwrap_or(args.command.default_tactile_scale());
            let sensor = tactile_sensor(tactile_config, args.simulate)?;
            control = control.with_tactile_sensor(sensor, &tactile_config.filter, scale)?;
        }
        None if args.command == CommandTask::Calibrate => {
            return Err("calibrate needs a tactile_sensor section in the configuration".into());
        }
        None => {}
    }

    if args.command == CommandTask::Calibrate {
        info!("streaming the tactile array uncalibrated, Ctrl-C to stop");
        control = control.without_calibration();
    }

    let stats = control.run(&cancel)?;
    info!(
        "done: {} ticks in the last run, {:.3} ms per tick ({:.3} ms last), {} overruns",
        stats.ticks,
        stats.mean_ms(),
        stats.last_ms(),
        stats.overruns
    );
    Ok(())
}

/// Opens the force/torque sensor, asking the operator for a port if none is
/// configured. `None` if they declined to pick one.
fn force_sensor(
    config: &ForceSensorConfig,
    args: &TactileForceArgs,
) -> Result<Option<Box<dyn ChannelSource<FORCE_CHANNELS>>>, Box<dyn Error>> {
    if args.simulate {
        info!("simulating the force/torque sensor");
        let source = SimulatedSerial::constant([0.4, -0.2, 2.5, 0.01, 0.02, -0.005])
            .with_noise(0.05)
            .with_garbage(0.01);
        let sensor = ForceTorqueSensor::start(source, config, &HandshakeTimeouts::default())?;
        return Ok(Some(Box::new(sensor)));
    }

    let mut config = config.clone();
    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if config.port.is_empty() {
        match device_selector(SerialPort::available_ports()?)? {
            Some(port) => config.port = port.to_string_lossy().into_owned(),
            None => return Ok(None),
        }
    }

    let sensor = ForceTorqueSensor::open(&config)?;
    if !sensor.is_streaming() {
        warn!("force/torque acquisition stopped right after setup");
    }
    Ok(Some(Box::new(sensor)))
}

fn tactile_sensor(
    config: &TactileSensorConfig,
    simulate: bool,
) -> Result<Box<dyn ChannelSource<TACTILE_CHANNELS>>, Box<dyn Error>> {
    if simulate {
        info!("simulating the tactile array");
        let adc = SimulatedAdc::new(vec![1.2, 1.0, 0.9, 1.1], 0.01, config.v_ref);
        return Ok(Box::new(TactileSensor::new(adc, config.v_ref)));
    }
    spi_tactile_sensor(config)
}

#[cfg(unix)]
fn spi_tactile_sensor(
    config: &TactileSensorConfig,
) -> Result<Box<dyn ChannelSource<TACTILE_CHANNELS>>, Box<dyn Error>> {
    use tactileforce::{gpio::GpioLine, spidev::Spidev, tactile_sensor::Mcp3204};

    info!("opening {} at {} Hz", config.spi_device, config.spi_speed_hz);
    let bus = Spidev::open(&config.spi_device, config.spi_speed_hz)?;
    let adc = Mcp3204::new(bus, config.v_ref);
    let mut sensor = TactileSensor::new(adc, config.v_ref);
    if let Some(pin) = config.led_pin {
        info!("switching the tactile LEDs on ({} line {pin})", config.gpio_chip);
        let led = GpioLine::request_output(&config.gpio_chip, pin)?;
        sensor = sensor.with_led(Box::new(led))?;
    }
    Ok(Box::new(sensor))
}

#[cfg(not(unix))]
fn spi_tactile_sensor(
    _config: &TactileSensorConfig,
) -> Result<Box<dyn ChannelSource<TACTILE_CHANNELS>>, Box<dyn Error>> {
    Err("the tactile array needs a Linux spidev device; try --simulate".into())
}
