//! A library for Yosemitech water-quality sensors speaking Modbus RTU.
//!
//! The crate is layered:
//!
//! 1.  **Sensor Handle**: [`sensor::Sensor`] binds a transport to one sensor and
//!     offers every operation of its model. This is the recommended entry point.
//!
//! 2.  **Stateless Operations**: [`sequencer::Sequencer`] turns one logical operation
//!     into validated Modbus transactions for a [`sequencer::SensorSession`], with
//!     retries on timeout.
//!
//! 3.  **Protocol Data**: [`registry`] maps each model to its register table,
//!     [`codec`] converts between register words and typed values.
//!
//! Any Modbus master can be plugged in by implementing [`sequencer::Transport`].
//! With the `tokio-rtu-sync` or `tokio-tcp-sync` feature the synchronous
//! `tokio-modbus` context implements it, see [`tokio_common`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use yosemitech_lib::{model::SensorModel, protocol::Address, sensor::Sensor};
//! use tokio_modbus::client::sync::tcp;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let socket_addr = "192.168.1.100:502".parse()?;
//!     let mut ctx = tcp::connect(socket_addr)?;
//!     let mut sensor = Sensor::new(&mut ctx, SensorModel::Y520, Address::default());
//!
//!     println!("Serial number: {}", sensor.read_serial_number()?);
//!     sensor.start_measurement()?;
//!     println!("{}: {}", sensor.parameter(), sensor.read_values()?);
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod codec;
pub mod error;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod sensor;
pub mod sequencer;

#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "tokio-rtu-sync", feature = "tokio-tcp-sync")))
)]
#[cfg(any(feature = "tokio-rtu-sync", feature = "tokio-tcp-sync"))]
pub mod tokio_common;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
