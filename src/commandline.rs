use crate::config::DaemonConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::{path::PathBuf, time::Duration};
use yosemitech_lib::{codec, model::SensorModel, protocol as proto};

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

fn parse_address(s: &str) -> Result<proto::Address, String> {
    let address_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::Address::try_from(address_val).map_err(|e| e.to_string())
}

fn parse_model(s: &str) -> Result<SensorModel, String> {
    s.parse::<SensorModel>()
}

fn parse_finite(s: &str) -> Result<f32, String> {
    let value = s
        .parse::<f32>()
        .map_err(|e| format!("Invalid number format: {e}"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{s} is not a finite number"))
    }
}

fn parse_brush_interval(s: &str) -> Result<codec::BrushInterval, String> {
    let minutes = s
        .parse::<u32>()
        .map_err(|e| format!("Invalid minutes format: {e}"))?;
    codec::BrushInterval::try_from(minutes).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliConnection {
    /// Connect to a sensor through a Modbus TCP gateway.
    Tcp {
        /// The IP address and port of the gateway.
        /// Example: "192.168.1.100:502".
        address: String,

        /// The Modbus slave address of the sensor behind the gateway (1 to 247).
        #[arg(short, long, default_value_t = proto::Address::default(), value_parser = parse_address)]
        slave: proto::Address,

        #[command(subcommand)]
        command: CliCommands,
    },
    /// Connect to a sensor via Modbus RTU (RS-485).
    Rtu {
        /// Serial port device name.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
        device: String,

        /// Baud rate for serial communication, 8N1.
        #[arg(long, default_value_t = proto::FACTORY_DEFAULT_BAUD_RATE)]
        baud_rate: u32,

        /// The Modbus slave address of the sensor (1 to 247).
        /// Can be specified in decimal or hexadecimal (e.g., "0x01").
        #[arg(short, long, default_value_t = proto::Address::default(), value_parser = parse_address, verbatim_doc_comment)]
        address: proto::Address,

        #[command(subcommand)]
        command: CliCommands,
    },
}

impl CliConnection {
    pub fn command(&self) -> &CliCommands {
        match self {
            CliConnection::Tcp { command, .. } | CliConnection::Rtu { command, .. } => command,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Poll every sensor listed in a YAML file and print the readings.
    /// The slave address on the command line is ignored, each sensor brings its own.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// The configuration file with poll interval and sensor list.
        #[arg(long, default_value = DaemonConfig::DEFAULT_CONFIG_FILE)]
        config_file: PathBuf,
    },

    /// Print model, parameter, unit, serial number and version.
    Info,

    /// Tell the sensor to start measuring.
    Start,

    /// Tell the sensor to stop measuring.
    Stop,

    /// Read the measured parameter with temperature and error code where available.
    Read {
        /// Send the start command first and wait for the given time before reading.
        #[arg(long, value_parser = humantime::parse_duration)]
        start: Option<Duration>,
    },

    /// Read the temperature in °C.
    ReadTemperature,

    /// Read the electrode potential in mV (pH sensors only).
    ReadPotential,

    /// Query the slave address of the connected sensor.
    /// This command sends a request to the broadcast address.
    /// **Warning:** Ensure only ONE sensor is connected to the RS-485 bus
    /// when using this command to avoid response collisions.
    #[clap(verbatim_doc_comment)]
    QuerySlaveId,

    /// Set a new slave address.
    /// **Important:** After changing the address, you must use the new address
    /// for subsequent communication with this sensor.
    #[clap(verbatim_doc_comment)]
    SetSlaveId {
        /// The new address (1 to 247), decimal or hexadecimal.
        #[arg(value_parser = parse_address)]
        new_address: proto::Address,
    },

    /// Read the K/B calibration constants.
    ReadCalibration,

    /// Write the K/B calibration constants (every model except pH).
    SetCalibration {
        /// Slope K.
        #[arg(value_parser = parse_finite, allow_hyphen_values = true)]
        k: f32,
        /// Offset B.
        #[arg(value_parser = parse_finite, allow_hyphen_values = true)]
        b: f32,
    },

    /// Write the cap coefficients K0 to K7 (dissolved oxygen sensors only).
    /// The values are printed on the sensor cap.
    #[clap(verbatim_doc_comment)]
    SetCapCoefficients {
        #[arg(num_args = codec::CAP_COEFFICIENTS, value_parser = parse_finite, allow_hyphen_values = true)]
        coefficients: Vec<f32>,
    },

    /// Write the pH calibration coefficients K1 to K6 (pH sensors only).
    SetPhCalibration {
        /// Restore the factory coefficients.
        #[arg(long, conflicts_with = "coefficients")]
        factory: bool,

        #[arg(num_args = codec::PH_COEFFICIENTS, value_parser = parse_finite, allow_hyphen_values = true, required_unless_present = "factory")]
        coefficients: Vec<f32>,
    },

    /// Run an interactive three point pH calibration (pH sensors only).
    PhCalibrate,

    /// Run the cleaning brush once (Y511, Y513, Y514).
    Brush,

    /// Read how often the brush runs, in minutes.
    ReadBrushInterval,

    /// Set how often the brush runs.
    SetBrushInterval {
        /// Interval in minutes.
        #[arg(value_parser = parse_brush_interval)]
        minutes: codec::BrushInterval,
    },
}

const fn about_text() -> &'static str {
    "Yosemitech sensor CLI - Interact with Yosemitech water-quality sensors via Modbus RTU/TCP."
}

#[derive(Parser, Debug)]
#[command(name="yosemitech", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is off.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Specifies the connection method and the command.
    #[command(subcommand)]
    pub connection: CliConnection,

    /// The sensor model. Decides which commands are available.
    #[arg(global = true, short, long, default_value = "Unknown", value_parser = parse_model)]
    pub model: SensorModel,

    /// Modbus I/O timeout for read/write operations.
    /// Examples: "1s", "500ms".
    #[arg(global = true, long, default_value = "1s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,

    /// Minimum delay between multiple Modbus commands sent to the same device.
    /// Important for Modbus RTU, especially with USB-to-RS485 converters that need time
    /// to switch between transmitting (TX) and receiving (RX) modes.
    /// Examples: "50ms", "100ms".
    #[arg(global = true, long, default_value = "50ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Duration,

    /// Do not ask for confirmation.
    #[arg(global = true, short, long)]
    pub yes: bool,

    /// Print every Modbus request and reply as hex to stderr.
    #[arg(global = true, long)]
    pub dump_frames: bool,
}
