//! Transport over a synchronous `tokio-modbus` context, RTU or TCP.
//!
//! The context owns CRC, byte framing and the response timeout. A request that times
//! out on the context is reported as [`TransportError::Timeout`] so the
//! [`crate::sequencer`] can retry it.
use crate::{
    protocol::{RawFrame, Reply, Request},
    sequencer::{Transport, TransportError},
};
use std::borrow::Cow;
use tokio_modbus::{prelude::SyncClient, slave::SlaveContext, Slave};

/// The parity used for serial communication.
pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
/// The number of stop bits used for serial communication.
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The number of data bits used for serial communication.
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

/// Creates a `tokio_serial::SerialPortBuilder` with the sensor's line settings (8N1).
///
/// # Arguments
///
/// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
/// * `baud_rate` - The baud rate, 9600 unless the sensor was reconfigured.
pub fn serial_port_builder(device: &str, baud_rate: u32) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, baud_rate)
        .parity(*PARITY)
        .stop_bits(*STOP_BITS)
        .data_bits(*DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
}

fn to_modbus_request(request: &Request) -> tokio_modbus::Request<'_> {
    match request {
        Request::ReadHoldingRegisters { address, quantity } => {
            tokio_modbus::Request::ReadHoldingRegisters(*address, *quantity)
        }
        Request::WriteSingleRegister { address, value } => {
            tokio_modbus::Request::WriteSingleRegister(*address, *value)
        }
        Request::WriteMultipleRegisters { address, values } => {
            tokio_modbus::Request::WriteMultipleRegisters(
                *address,
                Cow::Borrowed(values.as_slice()),
            )
        }
    }
}

fn from_modbus_response(response: tokio_modbus::Response) -> Result<Reply, TransportError> {
    match response {
        tokio_modbus::Response::ReadHoldingRegisters(words) => Ok(Reply::Registers(words)),
        tokio_modbus::Response::WriteSingleRegister(address, value) => {
            Ok(Reply::WriteSingleRegister(address, value))
        }
        tokio_modbus::Response::WriteMultipleRegisters(address, quantity) => {
            Ok(Reply::WriteMultipleRegisters(address, quantity))
        }
        other => Err(TransportError::Protocol(format!(
            "unexpected response {other:?}"
        ))),
    }
}

fn map_tokio_error(error: tokio_modbus::Error) -> TransportError {
    match error {
        tokio_modbus::Error::Transport(err) if err.kind() == std::io::ErrorKind::TimedOut => {
            TransportError::Timeout
        }
        tokio_modbus::Error::Transport(err) => TransportError::Io(err),
        other => TransportError::Protocol(other.to_string()),
    }
}

impl Transport for tokio_modbus::client::sync::Context {
    fn transact(&mut self, frame: &RawFrame) -> Result<Reply, TransportError> {
        self.set_slave(Slave(frame.slave));
        match self.call(to_modbus_request(&frame.request)) {
            Ok(Ok(response)) => from_modbus_response(response),
            Ok(Err(exception)) => Err(TransportError::Exception(exception.to_string())),
            Err(error) => Err(map_tokio_error(error)),
        }
    }
}
