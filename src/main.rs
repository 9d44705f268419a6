//! Yosemitech Sensor CLI
//!
//! A command-line interface (CLI) application for Yosemitech water-quality sensors
//! using Modbus RTU (RS-485) or Modbus TCP through a gateway.
//!
//! This tool allows users to:
//! - Print model metadata, serial number and firmware version.
//! - Start and stop measurements and read the measured values.
//! - Read and change the slave address.
//! - Read and write calibration constants, including the pH and cap coefficients.
//! - Run an interactive three point pH calibration.
//! - Run the cleaning brush and configure its interval.
//! - Poll several sensors on one bus in daemon mode, configured by a YAML file.
//!
//! The CLI leverages the `yosemitech_lib` crate for protocol definitions and sensor operations.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::{panic, time::Duration};
use tokio_modbus::client::sync::Context as ModbusContext;
use yosemitech_lib::{
    calibration::CALIBRATION_POINTS,
    codec,
    protocol as proto,
    sensor::Sensor,
    sequencer::{SensorSession, Sequencer},
};

mod commandline;
mod config;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

macro_rules! print_values {
    ($sensor:expr) => {
        let values = $sensor
            .read_values()
            .with_context(|| "Cannot read values")?;
        println!(
            "{} ({}): {}",
            $sensor.parameter(),
            $sensor.unit(),
            values
        );
    };
}

macro_rules! print_calibration {
    ($sensor:expr) => {
        let calibration = $sensor
            .read_calibration()
            .with_context(|| "Cannot read calibration")?;
        println!("Calibration: {}", calibration);
    };
}

macro_rules! print_brush_interval {
    ($sensor:expr) => {
        let interval = $sensor
            .read_brush_interval()
            .with_context(|| "Cannot read brush interval")?;
        println!("Brush interval: {}", interval);
    };
}

/// Calculates the minimum recommended delay for Modbus RTU based on baud rate.
/// This is 3.5 character times of 11 bits each.
fn minimum_rtu_delay(baud_rate: u32) -> Duration {
    const PRACTICAL_MIN_INTER_FRAME_DELAY_MICROS: u64 = 1_750;
    if baud_rate == 0 {
        return Duration::from_millis(16);
    }
    let bits_per_char = 11.0;
    let char_time_secs = bits_per_char / baud_rate as f64;
    let delay_micros = (3.5 * char_time_secs * 1_000_000.0) as u64;
    Duration::from_micros(delay_micros.max(PRACTICAL_MIN_INTER_FRAME_DELAY_MICROS))
}

/// Checks if the user-provided RTU delay is sufficient; if not, uses the calculated minimum.
fn check_rtu_delay(user_delay: Duration, baud_rate: u32) -> Duration {
    let min_rtu_delay = minimum_rtu_delay(baud_rate);
    if user_delay < min_rtu_delay {
        warn!(
            "User-defined RTU delay of {user_delay:?} is below the recommended minimum of {min_rtu_delay:?} for {baud_rate} baud. Using minimum."
        );
        min_rtu_delay
    } else {
        user_delay
    }
}

/// Asks the user, unless `--yes` was given.
fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .show_default(true)
        .interact()
        .context("Failed to get user confirmation.")
}

/// Prompts the user for confirmation when an operation requires only one sensor on the bus.
fn confirm_only_one_sensor_connected(assume_yes: bool) -> Result<bool> {
    println!(
        "WARNING: This operation should only be performed if a SINGLE sensor \
         is connected to the Modbus RTU bus segment."
    );
    println!("Multiple devices may lead to unpredictable behavior or communication errors.");
    confirm("Do you want to continue with this understanding?", assume_yes)
}

/// Opens the Modbus context described by the command-line arguments.
fn create_context(
    connection: &commandline::CliConnection,
    delay: &mut Duration,
) -> Result<(ModbusContext, proto::Address)> {
    match connection {
        commandline::CliConnection::Tcp { address, slave, .. } => {
            let socket_addr = address
                .parse()
                .with_context(|| format!("Invalid TCP address format: '{address}'"))?;
            info!("Attempting to connect via TCP to {socket_addr}...");
            let ctx = tokio_modbus::client::sync::tcp::connect(socket_addr).with_context(|| {
                format!("Failed to connect to Modbus TCP gateway at {socket_addr}")
            })?;
            Ok((ctx, *slave))
        }
        commandline::CliConnection::Rtu {
            device,
            baud_rate,
            address,
            ..
        } => {
            info!(
                "Attempting to connect via RTU to device {device} (Address: {address}, Baud: {baud_rate})..."
            );
            *delay = check_rtu_delay(*delay, *baud_rate);
            let ctx = tokio_modbus::client::sync::rtu::connect(
                &yosemitech_lib::tokio_common::serial_port_builder(device, *baud_rate),
            )
            .with_context(|| format!("Cannot open serial port {device}"))?;
            Ok((ctx, *address))
        }
    }
}

/// Polls every configured sensor until interrupted.
fn run_daemon(
    ctx: &mut ModbusContext,
    config: &config::DaemonConfig,
    delay: Duration,
    dump_frames: bool,
) -> Result<()> {
    let mut sessions: Vec<_> = config
        .sensors
        .iter()
        .map(|sensor| {
            let mut session = SensorSession::new(sensor.model, sensor.address);
            if dump_frames {
                session.set_debug_sink(Box::new(std::io::stderr()));
            }
            (sensor.name.as_str(), session)
        })
        .collect();

    for (name, session) in sessions.iter_mut() {
        if let Err(error) = Sequencer::start_measurement(ctx, session) {
            warn!("Cannot start measurement of '{name}': {error}");
        }
        std::thread::sleep(delay);
    }
    std::thread::sleep(config.warm_up);

    loop {
        for (name, session) in sessions.iter_mut() {
            match Sequencer::read_values(ctx, session) {
                Ok(values) => println!(
                    "{name}: {} ({}): {values}",
                    session.model().parameter(),
                    session.model().unit()
                ),
                Err(error) => warn!("Cannot read '{name}': {error}"),
            }
            std::thread::sleep(delay);
        }
        std::thread::sleep(config.poll_interval);
    }
}

/// Walks the user through a three point pH calibration.
fn handle_ph_calibration(
    sensor: &mut Sensor<'_, ModbusContext>,
    assume_yes: bool,
) -> Result<()> {
    let mut calibration = sensor.begin_ph_calibration()?;
    println!(
        "Three point pH calibration. Rinse the sensor between standards, \
         recommended standards are 4.00, 6.86 and 9.18."
    );
    let recommended = [4.00_f32, 6.86, 9.18];
    for (n, default) in (1..=CALIBRATION_POINTS).zip(recommended) {
        let ph: f32 = Input::new()
            .with_prompt(format!("pH of standard {n}"))
            .default(default)
            .interact_text()
            .context("Failed to read pH value")?;
        if !confirm(
            "Is the sensor immersed and stable for at least one minute?",
            assume_yes,
        )? {
            info!("pH calibration aborted by user.");
            return Ok(());
        }
        sensor
            .submit_ph_calibration_point(&mut calibration, ph)
            .with_context(|| format!("Cannot submit calibration point {n} (pH {ph})"))?;
        println!("Point {n} (pH {ph}) accepted.");
    }
    let status = sensor
        .check_ph_calibration(&mut calibration)
        .with_context(|| "Cannot read calibration status")?;
    if status.accepted() {
        println!("Calibration succeeded: {status}");
        Ok(())
    } else {
        bail!("Calibration failed: {status}");
    }
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "Yosemitech CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let command = args.connection.command();
    if command == &commandline::CliCommands::QuerySlaveId
        && !confirm_only_one_sensor_connected(args.yes)?
    {
        info!("QuerySlaveId command aborted by user.");
        return Ok(());
    }

    let mut delay = args.delay;
    let (mut ctx, address) = create_context(&args.connection, &mut delay)?;
    ctx.set_timeout(args.timeout);

    if let commandline::CliCommands::Daemon { config_file } = command {
        let config = config::DaemonConfig::load(config_file)?;
        info!(
            "Starting daemon mode: {} sensors, interval={:?}",
            config.sensors.len(),
            config.poll_interval
        );
        return run_daemon(&mut ctx, &config, delay, args.dump_frames);
    }

    let mut sensor = Sensor::new(&mut ctx, args.model, address);
    if args.dump_frames {
        sensor.set_debug_sink(Box::new(std::io::stderr()));
    }

    match command {
        commandline::CliCommands::Daemon { .. } => unreachable!("Daemon is handled earlier."),
        commandline::CliCommands::Info => {
            info!("Executing: Info");
            println!("Model: {}", sensor.model_name());
            println!("Parameter: {} ({})", sensor.parameter(), sensor.unit());
            let serial = sensor
                .read_serial_number()
                .with_context(|| "Cannot read serial number")?;
            println!("Serial number: {serial}");
            std::thread::sleep(delay);
            let version = sensor
                .read_version()
                .with_context(|| "Cannot read version")?;
            println!("Version: {version}");
        }
        commandline::CliCommands::Start => {
            info!("Executing: Start Measurement");
            sensor
                .start_measurement()
                .with_context(|| "Cannot start measurement")?;
            println!("Measurement started.");
        }
        commandline::CliCommands::Stop => {
            info!("Executing: Stop Measurement");
            sensor
                .stop_measurement()
                .with_context(|| "Cannot stop measurement")?;
            println!("Measurement stopped.");
        }
        commandline::CliCommands::Read { start } => {
            info!("Executing: Read Values");
            if let Some(warm_up) = start {
                sensor
                    .start_measurement()
                    .with_context(|| "Cannot start measurement")?;
                std::thread::sleep(delay.max(*warm_up));
            }
            print_values!(sensor);
        }
        commandline::CliCommands::ReadTemperature => {
            info!("Executing: Read Temperature");
            let temperature = sensor
                .read_temperature()
                .with_context(|| "Cannot read temperature")?;
            println!("Temperature: {temperature} °C");
        }
        commandline::CliCommands::ReadPotential => {
            info!("Executing: Read Potential");
            let potential = sensor
                .read_potential()
                .with_context(|| "Cannot read potential")?;
            println!("Potential: {potential} mV");
        }
        commandline::CliCommands::QuerySlaveId => {
            info!("Executing: Query Slave Address (Broadcast)");
            let address = sensor
                .read_slave_id()
                .with_context(|| "Cannot read slave address")?;
            println!("Slave address: {address}");
        }
        commandline::CliCommands::SetSlaveId { new_address } => {
            info!("Executing: Set Slave Address to {new_address}");
            if !confirm(
                &format!("Change slave address from {address} to {new_address}?"),
                args.yes,
            )? {
                info!("SetSlaveId command aborted by user.");
                return Ok(());
            }
            sensor
                .set_slave_id(*new_address)
                .with_context(|| format!("Failed to set new slave address to {new_address}"))?;
            println!(
                "Slave address successfully set to {new_address}. Subsequent communication must use this new address."
            );
        }
        commandline::CliCommands::ReadCalibration => {
            info!("Executing: Read Calibration");
            print_calibration!(sensor);
        }
        commandline::CliCommands::SetCalibration { k, b } => {
            info!("Executing: Set Calibration K={k} B={b}");
            if !confirm("Overwrite the calibration constants?", args.yes)? {
                info!("SetCalibration command aborted by user.");
                return Ok(());
            }
            sensor
                .set_calibration(codec::Calibration { k: *k, b: *b })
                .with_context(|| "Failed to set calibration")?;
            std::thread::sleep(delay);
            print_calibration!(sensor);
        }
        commandline::CliCommands::SetCapCoefficients { coefficients } => {
            info!("Executing: Set Cap Coefficients {coefficients:?}");
            if !confirm("Overwrite the cap coefficients?", args.yes)? {
                info!("SetCapCoefficients command aborted by user.");
                return Ok(());
            }
            sensor
                .set_cap_coefficients(coefficients)
                .with_context(|| "Failed to set cap coefficients")?;
            println!("Cap coefficients written.");
        }
        commandline::CliCommands::SetPhCalibration {
            factory,
            coefficients,
        } => {
            let factory_coefficients = codec::PH_FACTORY_COEFFICIENTS;
            let coefficients: &[f32] = if *factory {
                &factory_coefficients
            } else {
                coefficients
            };
            info!("Executing: Set pH Calibration {coefficients:?}");
            if !confirm("Overwrite the pH calibration coefficients?", args.yes)? {
                info!("SetPhCalibration command aborted by user.");
                return Ok(());
            }
            sensor
                .set_ph_calibration(coefficients)
                .with_context(|| "Failed to set pH calibration")?;
            println!("pH calibration coefficients written.");
        }
        commandline::CliCommands::PhCalibrate => {
            info!("Executing: pH Calibration");
            handle_ph_calibration(&mut sensor, args.yes)?;
        }
        commandline::CliCommands::Brush => {
            info!("Executing: Activate Brush");
            sensor
                .activate_brush()
                .with_context(|| "Cannot activate brush")?;
            println!("Brush activated.");
        }
        commandline::CliCommands::ReadBrushInterval => {
            info!("Executing: Read Brush Interval");
            print_brush_interval!(sensor);
        }
        commandline::CliCommands::SetBrushInterval { minutes } => {
            info!("Executing: Set Brush Interval to {minutes}");
            sensor
                .set_brush_interval(*minutes)
                .with_context(|| format!("Failed to set brush interval to {minutes}"))?;
            std::thread::sleep(delay);
            print_brush_interval!(sensor);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_rtu_delay_calculation() {
        // 3.5 char times = 38.5 / baud
        assert_eq!(minimum_rtu_delay(1200).as_micros(), 32083);
        assert_eq!(minimum_rtu_delay(4800).as_micros(), 8020);
        assert_eq!(minimum_rtu_delay(9600).as_micros(), 4010);
        assert_eq!(minimum_rtu_delay(19200).as_micros(), 2005);
        // clamped
        assert_eq!(minimum_rtu_delay(38400).as_micros(), 1750);
        assert_eq!(minimum_rtu_delay(0), Duration::from_millis(16));
    }

    #[test]
    fn test_check_rtu_delay() {
        let min_delay_9600 = minimum_rtu_delay(9600);
        assert_eq!(check_rtu_delay(Duration::from_millis(3), 9600), min_delay_9600);
        assert_eq!(
            check_rtu_delay(Duration::from_millis(5), 9600),
            Duration::from_millis(5)
        );
        assert_eq!(check_rtu_delay(min_delay_9600, 9600), min_delay_9600);
    }

    #[test]
    fn test_confirm_assumes_yes() {
        assert!(confirm("never shown", true).unwrap());
    }
}
