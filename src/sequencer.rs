//! Command sequencer.
//!
//! Turns one logical operation into framed Modbus transactions, issues them through a
//! [`Transport`], validates the replies and decodes them with the [`crate::codec`].
//!
//! Every operation resolves its register entry for the session's model first, so an
//! operation the model does not define fails before any I/O. Transport timeouts are
//! retried up to [`SensorSession::retries`] times. Exceptions, malformed replies and
//! other I/O errors are surfaced immediately.
//!
//! The functions here are stateless apart from the [`SensorSession`] they are given,
//! and block until the sensor answers or the transport gives up. See
//! [`crate::sensor::Sensor`] for a stateful handle.
use crate::{
    codec::{self, BrushInterval, Calibration, CalibrationStatus, Measurement, Version},
    error::{Error, Mismatch, Result, ValidationError},
    model::SensorModel,
    protocol::{self as proto, Address, RawFrame, Reply, Request},
    registry::{self, Encoding, RegisterEntry, RegisterOperation},
};
use log::*;
use std::io::Write;

/// Default number of protocol level retries after a transport timeout.
pub const MAX_RETRIES: u8 = 2;

/// Failure reported by a [`Transport`].
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// No or only a partial response within the transport's timeout.
    #[error("Timeout")]
    Timeout,

    /// The slave answered with a Modbus exception.
    #[error("Modbus exception: {0}")]
    Exception(String),

    /// The reply could not be parsed as an answer to the request.
    #[error("Malformed response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A half-duplex Modbus master, able to run one request/response exchange.
///
/// Implementations own byte level framing, CRC and the response timeout.
pub trait Transport {
    fn transact(&mut self, frame: &RawFrame) -> std::result::Result<Reply, TransportError>;
}

/// Driver enable line of an RS-485 transceiver.
pub trait EnableLine {
    /// Takes the bus for transmission.
    fn enable(&mut self);
    /// Gives the bus back.
    fn disable(&mut self);
}

/// Keeps the enable line asserted for one exchange.
struct EnableGuard<'a, L: EnableLine + ?Sized>(&'a mut L);

impl<'a, L: EnableLine + ?Sized> EnableGuard<'a, L> {
    fn new(line: &'a mut L) -> Self {
        line.enable();
        Self(line)
    }
}

impl<L: EnableLine + ?Sized> Drop for EnableGuard<'_, L> {
    fn drop(&mut self) {
        self.0.disable();
    }
}

/// Identity of one physical sensor.
///
/// The transport is not part of the session; it is borrowed per operation.
pub struct SensorSession {
    model: SensorModel,
    address: Address,
    retries: u8,
    enable_line: Option<Box<dyn EnableLine + Send>>,
    debug_sink: Option<Box<dyn Write + Send>>,
}

impl SensorSession {
    pub fn new(model: SensorModel, address: Address) -> Self {
        Self {
            model,
            address,
            retries: MAX_RETRIES,
            enable_line: None,
            debug_sink: None,
        }
    }

    /// Asserts `line` around every exchange of this session.
    pub fn with_enable_line(mut self, line: Box<dyn EnableLine + Send>) -> Self {
        self.enable_line = Some(line);
        self
    }

    pub fn model(&self) -> SensorModel {
        self.model
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn retries(&self) -> u8 {
        self.retries
    }

    pub fn set_retries(&mut self, retries: u8) {
        self.retries = retries;
    }

    /// Writes every request and reply as a hex line to `sink`.
    pub fn set_debug_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.debug_sink = Some(sink);
    }

    pub fn stop_debugging(&mut self) {
        self.debug_sink = None;
    }

    fn dump(&mut self, direction: &str, bytes: &[u8]) {
        let line = proto::hex(bytes);
        trace!("{direction} {line}");
        if let Some(sink) = self.debug_sink.as_mut() {
            if let Err(err) = writeln!(sink, "{direction} {line}") {
                debug!("Cannot write to debug sink: {err}");
            }
        }
    }
}

impl std::fmt::Debug for SensorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSession")
            .field("model", &self.model)
            .field("address", &self.address)
            .field("retries", &self.retries)
            .field("enable_line", &self.enable_line.is_some())
            .field("debug_sink", &self.debug_sink.is_some())
            .finish()
    }
}

/// Stateless operations of the Yosemitech protocol.
#[derive(Debug)]
pub struct Sequencer;

impl Sequencer {
    /// Runs one exchange, retrying on timeout.
    fn transact<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        frame: &RawFrame,
    ) -> Result<Reply> {
        let attempts = session.retries.saturating_add(1);
        for attempt in 1..=attempts {
            session.dump(">>", &frame.to_bytes());
            let result = match session.enable_line.as_mut() {
                Some(line) => {
                    let _guard = EnableGuard::new(line.as_mut());
                    transport.transact(frame)
                }
                None => transport.transact(frame),
            };
            match result {
                Ok(reply) => {
                    session.dump("<<", &reply.to_bytes(frame.slave));
                    return Ok(reply);
                }
                Err(TransportError::Timeout) => {
                    warn!(
                        "Timeout from slave {:#04x} (attempt {attempt}/{attempts})",
                        frame.slave
                    );
                }
                Err(TransportError::Exception(exception)) => {
                    return Err(Error::Exception(exception))
                }
                Err(TransportError::Protocol(reason)) => {
                    return Err(Mismatch::Malformed(reason).into())
                }
                Err(TransportError::Io(err)) => return Err(Error::Io(err)),
            }
        }
        Err(Error::Timeout { attempts })
    }

    /// Reads the registers of `operation` and decodes them.
    fn read_and_decode<T, V, F>(
        transport: &mut T,
        session: &mut SensorSession,
        slave: u8,
        operation: RegisterOperation,
        decoder: F,
    ) -> Result<V>
    where
        T: Transport + ?Sized,
        F: FnOnce(&RegisterEntry, &[u16]) -> std::result::Result<V, Mismatch>,
    {
        let entry = registry::resolve(session.model, operation)?;
        debug!("{} {operation} from {slave:#04x}", session.model);
        let frame = RawFrame {
            slave,
            request: Request::ReadHoldingRegisters {
                address: entry.address,
                quantity: entry.count,
            },
        };
        match Self::transact(transport, session, &frame)? {
            Reply::Registers(words) if words.len() == entry.count as usize => {
                Ok(decoder(entry, &words)?)
            }
            Reply::Registers(words) => Err(Mismatch::RegisterCount {
                expected: entry.count,
                actual: words.len(),
            }
            .into()),
            other => Err(Mismatch::FunctionCode {
                expected: proto::READ_HOLDING_REGISTERS,
                actual: other.function_code(),
            }
            .into()),
        }
    }

    /// Writes `value` to the single register of `entry` and checks the echo.
    fn write_single<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        entry: &RegisterEntry,
        value: u16,
    ) -> Result<()> {
        debug!("{} {} to {}", session.model, entry.operation, session.address);
        let frame = RawFrame {
            slave: *session.address,
            request: Request::WriteSingleRegister {
                address: entry.address,
                value,
            },
        };
        match Self::transact(transport, session, &frame)? {
            Reply::WriteSingleRegister(address, echoed)
                if address == entry.address && echoed == value =>
            {
                Ok(())
            }
            Reply::WriteSingleRegister(address, echoed) => Err(Mismatch::Echo {
                expected: (entry.address, value),
                actual: (address, echoed),
            }
            .into()),
            other => Err(Mismatch::FunctionCode {
                expected: proto::WRITE_SINGLE_REGISTER,
                actual: other.function_code(),
            }
            .into()),
        }
    }

    /// Writes `values` starting at the register of `entry` and checks the echo.
    ///
    /// An empty `values` sends the vendor trigger command.
    fn write_multiple<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        entry: &RegisterEntry,
        values: Vec<u16>,
    ) -> Result<()> {
        debug!("{} {} to {}", session.model, entry.operation, session.address);
        let quantity = values.len() as u16;
        let frame = RawFrame {
            slave: *session.address,
            request: Request::WriteMultipleRegisters {
                address: entry.address,
                values,
            },
        };
        match Self::transact(transport, session, &frame)? {
            Reply::WriteMultipleRegisters(address, echoed)
                if address == entry.address && echoed == quantity =>
            {
                Ok(())
            }
            Reply::WriteMultipleRegisters(address, echoed) => Err(Mismatch::Echo {
                expected: (entry.address, quantity),
                actual: (address, echoed),
            }
            .into()),
            other => Err(Mismatch::FunctionCode {
                expected: proto::WRITE_MULTIPLE_REGISTERS,
                actual: other.function_code(),
            }
            .into()),
        }
    }

    fn trigger<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        operation: RegisterOperation,
    ) -> Result<()> {
        let entry = registry::resolve(session.model, operation)?;
        Self::write_multiple(transport, session, entry, Vec::new())
    }

    /// Encodes `values` as the floats `operation` expects and writes them.
    fn write_floats<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        operation: RegisterOperation,
        values: &[f32],
    ) -> Result<()> {
        let entry = registry::resolve(session.model, operation)?;
        let expected = match entry.encoding {
            Encoding::Float32(count) => count as usize,
            _ => entry.count as usize / codec::FLOAT_REGISTERS,
        };
        let words = codec::encode_coefficients(values, expected)?;
        Self::write_multiple(transport, session, entry, words)
    }

    fn read_single_float<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        operation: RegisterOperation,
    ) -> Result<f32> {
        let slave = *session.address;
        Self::read_and_decode(transport, session, slave, operation, |_, words| {
            Ok(codec::decode_floats(words, 1)?[0])
        })
    }

    /// Returns the model the session was created with. No I/O.
    pub fn model(session: &SensorSession) -> SensorModel {
        session.model
    }

    /// Reads the serial number.
    pub fn read_serial_number<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<String> {
        let slave = *session.address;
        Self::read_and_decode(
            transport,
            session,
            slave,
            RegisterOperation::SerialNumber,
            |_, words| Ok(codec::decode_ascii(words)),
        )
    }

    /// Reads the hardware and software version.
    pub fn read_version<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<Version> {
        let slave = *session.address;
        Self::read_and_decode(
            transport,
            session,
            slave,
            RegisterOperation::Version,
            |_, words| Version::decode_from_holding_registers(words),
        )
    }

    /// Reads the slave address the sensor is configured with.
    ///
    /// The request goes to [`proto::BROADCAST_SLAVE`], so only one sensor may be
    /// connected to the bus. A reported address outside 1-247 is a framing mismatch.
    pub fn read_slave_id<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<Address> {
        Self::read_and_decode(
            transport,
            session,
            proto::BROADCAST_SLAVE,
            RegisterOperation::ReadSlaveId,
            |_, words| Address::decode_from_register(words[0]),
        )
    }

    /// Changes the slave address of the sensor.
    ///
    /// On success the session uses `new_address` for every following operation. On
    /// failure the session address is left unchanged.
    pub fn set_slave_id<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        new_address: Address,
    ) -> Result<()> {
        let entry = registry::resolve(session.model, RegisterOperation::WriteSlaveId)?;
        Self::write_single(
            transport,
            session,
            entry,
            new_address.encode_for_write_register(),
        )?;
        info!(
            "Slave address changed from {} to {new_address}",
            session.address
        );
        session.address = new_address;
        Ok(())
    }

    /// Tells the sensor to start measuring.
    pub fn start_measurement<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<()> {
        Self::trigger(transport, session, RegisterOperation::StartMeasurement)
    }

    /// Tells the sensor to stop measuring.
    pub fn stop_measurement<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<()> {
        Self::trigger(transport, session, RegisterOperation::StopMeasurement)
    }

    /// Reads every field of the primary value block the model defines.
    pub fn read_values<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<Measurement> {
        let slave = *session.address;
        Self::read_and_decode(
            transport,
            session,
            slave,
            RegisterOperation::PrimaryValues,
            |entry, words| match entry.encoding {
                Encoding::Measurement(layout) => Measurement::decode(layout, words),
                _ => Err(Mismatch::Malformed(format!(
                    "{:?} is not a measurement block",
                    entry.encoding
                ))),
            },
        )
    }

    /// Reads the temperature in °C.
    pub fn read_temperature<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<f32> {
        Self::read_single_float(transport, session, RegisterOperation::Temperature)
    }

    /// Reads the raw electrode potential in mV.
    pub fn read_potential<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<f32> {
        Self::read_single_float(transport, session, RegisterOperation::Potential)
    }

    /// Reads the K/B calibration constants.
    pub fn read_calibration<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<Calibration> {
        let slave = *session.address;
        Self::read_and_decode(
            transport,
            session,
            slave,
            RegisterOperation::ReadCalibration,
            |_, words| Calibration::decode_from_holding_registers(words),
        )
    }

    /// Writes the K/B calibration constants.
    pub fn set_calibration<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        calibration: Calibration,
    ) -> Result<()> {
        Self::write_floats(
            transport,
            session,
            RegisterOperation::WriteCalibration,
            &[calibration.k, calibration.b],
        )
    }

    /// Writes the eight cap coefficients K0 to K7 of a dissolved oxygen sensor.
    pub fn set_cap_coefficients<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        coefficients: &[f32],
    ) -> Result<()> {
        Self::write_floats(
            transport,
            session,
            RegisterOperation::WriteCapCoefficients,
            coefficients,
        )
    }

    /// Writes the six pH calibration coefficients K1 to K6.
    pub fn set_ph_calibration<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        coefficients: &[f32],
    ) -> Result<()> {
        Self::write_floats(
            transport,
            session,
            RegisterOperation::WritePhCalibration,
            coefficients,
        )
    }

    /// Submits the pH value of the standard the sensor is currently immersed in.
    pub fn submit_ph_calibration_point<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        ph: f32,
    ) -> Result<()> {
        let entry = registry::resolve(session.model, RegisterOperation::PhCalibrationPoint)?;
        if !(0.0..=14.0).contains(&ph) {
            return Err(ValidationError::PhOutOfRange(ph).into());
        }
        let words = codec::encode_floats(&[ph])?;
        Self::write_multiple(transport, session, entry, words)
    }

    /// Reads the status of the last pH calibration.
    pub fn read_ph_calibration_status<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<CalibrationStatus> {
        let slave = *session.address;
        Self::read_and_decode(
            transport,
            session,
            slave,
            RegisterOperation::PhCalibrationStatus,
            |_, words| CalibrationStatus::decode_from_holding_registers(words),
        )
    }

    /// Runs the cleaning brush once. One sweep takes about 10 seconds.
    ///
    /// Requires hardware Rev1.0 and software Rev1.7 or later.
    pub fn activate_brush<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<()> {
        Self::trigger(transport, session, RegisterOperation::ActivateBrush)
    }

    /// Reads how often the brush runs while the sensor is powered.
    pub fn read_brush_interval<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<BrushInterval> {
        let slave = *session.address;
        Self::read_and_decode(
            transport,
            session,
            slave,
            RegisterOperation::ReadBrushInterval,
            |_, words| BrushInterval::decode_from_holding_registers(words),
        )
    }

    /// Sets how often the brush runs while the sensor is powered.
    pub fn set_brush_interval<T: Transport + ?Sized>(
        transport: &mut T,
        session: &mut SensorSession,
        interval: BrushInterval,
    ) -> Result<()> {
        let entry = registry::resolve(session.model, RegisterOperation::WriteBrushInterval)?;
        Self::write_single(
            transport,
            session,
            entry,
            interval.encode_for_write_register(),
        )
    }
}
