//! Wire level types of the Yosemitech Modbus dialect.
//!
//! The byte level RTU framing and CRC belong to the Modbus master. This module only
//! describes what goes into a request and what is expected back.
use crate::error::{Mismatch, ValidationError};
use std::fmt;

/// Modbus function code: read holding registers.
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
/// Modbus function code: write single register.
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
/// Modbus function code: write multiple registers.
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Slave address every sensor on the bus answers. Only used to query the slave ID, so
/// it is not a valid [`Address`].
pub const BROADCAST_SLAVE: u8 = 0xFF;

/// Factory default baud rate of all Yosemitech sensors (8N1).
pub const FACTORY_DEFAULT_BAUD_RATE: u32 = 9600;

/// A Modbus slave address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Address(u8);

impl Address {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;

    /// Decodes the slave ID register, which carries the address in its high byte.
    pub fn decode_from_register(word: u16) -> std::result::Result<Self, Mismatch> {
        let [address, _] = word.to_be_bytes();
        Self::try_from(address).map_err(|_| Mismatch::SlaveAddress(address))
    }

    pub fn encode_for_write_register(&self) -> u16 {
        (self.0 as u16) << 8
    }
}

impl std::ops::Deref for Address {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Address(0x01)
    }
}

impl TryFrom<u8> for Address {
    type Error = ValidationError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Address(value))
        } else {
            Err(ValidationError::AddressOutOfRange(value))
        }
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> u8 {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// The protocol data unit of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ReadHoldingRegisters { address: u16, quantity: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    /// An empty `values` is the vendor trigger command (quantity 0, no payload).
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
}

impl Request {
    pub fn function_code(&self) -> u8 {
        match self {
            Request::ReadHoldingRegisters { .. } => READ_HOLDING_REGISTERS,
            Request::WriteSingleRegister { .. } => WRITE_SINGLE_REGISTER,
            Request::WriteMultipleRegisters { .. } => WRITE_MULTIPLE_REGISTERS,
        }
    }
}

/// A request addressed to one slave. Transient, dropped once the transaction completes.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub slave: u8,
    pub request: Request,
}

impl RawFrame {
    /// Renders slave address, function code and data bytes. The CRC is left to the master.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.slave, self.request.function_code()];
        match &self.request {
            Request::ReadHoldingRegisters { address, quantity } => {
                bytes.extend_from_slice(&address.to_be_bytes());
                bytes.extend_from_slice(&quantity.to_be_bytes());
            }
            Request::WriteSingleRegister { address, value } => {
                bytes.extend_from_slice(&address.to_be_bytes());
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Request::WriteMultipleRegisters { address, values } => {
                bytes.extend_from_slice(&address.to_be_bytes());
                bytes.extend_from_slice(&(values.len() as u16).to_be_bytes());
                bytes.push((values.len() * 2) as u8);
                for value in values {
                    bytes.extend_from_slice(&value.to_be_bytes());
                }
            }
        }
        bytes
    }
}

/// The decoded response to a [`RawFrame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Registers(Vec<u16>),
    /// Echo of address and value.
    WriteSingleRegister(u16, u16),
    /// Echo of address and quantity.
    WriteMultipleRegisters(u16, u16),
}

impl Reply {
    pub fn function_code(&self) -> u8 {
        match self {
            Reply::Registers(_) => READ_HOLDING_REGISTERS,
            Reply::WriteSingleRegister(..) => WRITE_SINGLE_REGISTER,
            Reply::WriteMultipleRegisters(..) => WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Renders the reply as it appeared on the wire, without CRC.
    pub fn to_bytes(&self, slave: u8) -> Vec<u8> {
        let mut bytes = vec![slave, self.function_code()];
        match self {
            Reply::Registers(words) => {
                bytes.push((words.len() * 2) as u8);
                for word in words {
                    bytes.extend_from_slice(&word.to_be_bytes());
                }
            }
            Reply::WriteSingleRegister(a, b) | Reply::WriteMultipleRegisters(a, b) => {
                bytes.extend_from_slice(&a.to_be_bytes());
                bytes.extend_from_slice(&b.to_be_bytes());
            }
        }
        bytes
    }
}

/// Formats bytes as space separated upper case hex pairs.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
