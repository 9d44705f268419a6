//! Error types shared by every layer of the driver.
use crate::{model::SensorModel, registry::RegisterOperation};

/// Caller supplied a parameter the sensor cannot accept.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Address {0} is out of range (1-247)")]
    AddressOutOfRange(u8),

    #[error("Expected {expected} coefficients, got {actual}")]
    CoefficientCount { expected: usize, actual: usize },

    #[error("Value {0} is not a finite number")]
    NotFinite(f32),

    #[error("Fixed-point value {0} is out of range (0-255.99)")]
    FixedPointOutOfRange(f32),

    #[error("pH standard {0} is out of range (0-14)")]
    PhOutOfRange(f32),

    #[error("Brush interval of {0} minutes is out of range")]
    BrushIntervalOutOfRange(u32),

    #[error("All {0} calibration points have already been submitted")]
    TooManyPoints(u8),

    #[error("No calibration point has been submitted yet")]
    NoPointsSubmitted,

    #[error("Calibration sequence is already finished, start a new one")]
    SequenceFinished,
}

/// Describes how a reply deviated from its request.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    /// A read returned the wrong number of registers.
    RegisterCount { expected: u16, actual: usize },
    /// A write was echoed with a different address, value or quantity.
    Echo {
        expected: (u16, u16),
        actual: (u16, u16),
    },
    /// The reply belongs to another function code.
    FunctionCode { expected: u8, actual: u8 },
    /// The sensor reported a slave address outside 1-247.
    SlaveAddress(u8),
    /// The master could not parse the reply.
    Malformed(String),
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mismatch::RegisterCount { expected, actual } => {
                write!(f, "expected {expected} registers, got {actual}")
            }
            Mismatch::Echo { expected, actual } => write!(
                f,
                "expected echo {:#06X}/{:#06X}, got {:#06X}/{:#06X}",
                expected.0, expected.1, actual.0, actual.1
            ),
            Mismatch::FunctionCode { expected, actual } => {
                write!(f, "expected function code {expected:#04X}, got {actual:#04X}")
            }
            Mismatch::SlaveAddress(address) => {
                write!(f, "reported slave address {address:#04x} is out of range")
            }
            Mismatch::Malformed(reason) => write!(f, "malformed response: {reason}"),
        }
    }
}

/// Represents all possible errors of a sensor operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The model does not define the operation. No I/O was attempted.
    #[error("{operation} is not supported by {model}")]
    Unsupported {
        model: SensorModel,
        operation: RegisterOperation,
    },

    /// No complete response arrived, retries included.
    #[error("No response after {attempts} attempts")]
    Timeout { attempts: u8 },

    /// The response shape is inconsistent with the request.
    #[error("Framing mismatch: {0}")]
    FramingMismatch(Mismatch),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The sensor answered with a Modbus exception.
    #[error("Modbus exception: {0}")]
    Exception(String),

    /// Transport failure other than a timeout.
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    /// A previous step of the calibration sequence failed.
    #[error("Calibration sequence was aborted, restart required")]
    CalibrationAborted,
}

impl From<Mismatch> for Error {
    fn from(mismatch: Mismatch) -> Self {
        Error::FramingMismatch(mismatch)
    }
}

/// The result type for sensor operations.
pub type Result<T> = std::result::Result<T, Error>;
