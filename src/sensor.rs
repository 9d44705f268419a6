//! Stateful handle on one Yosemitech sensor.
//!
//! [`Sensor`] binds a borrowed [`Transport`] to a [`SensorSession`] and forwards each
//! operation to the [`Sequencer`]. Model name, parameter and unit come from a static
//! table keyed by the model the sensor was created with; the sensor itself does not
//! report them.
//!
//! ## Example
//!
//! ```no_run
//! use yosemitech_lib::{model::SensorModel, protocol::Address, sensor::Sensor};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = yosemitech_lib::tokio_common::serial_port_builder("/dev/ttyUSB0", 9600);
//!     let mut ctx = tokio_modbus::client::sync::rtu::connect(&builder)?;
//!     ctx.set_timeout(Duration::from_secs(1));
//!
//!     let mut sensor = Sensor::new(&mut ctx, SensorModel::Y511, Address::try_from(1)?);
//!     sensor.start_measurement()?;
//!     let values = sensor.read_values()?;
//!     println!("{}: {} {}", sensor.parameter(), values.value, sensor.unit());
//!     Ok(())
//! }
//! ```
use crate::{
    calibration::PhCalibration,
    codec::{BrushInterval, Calibration, CalibrationStatus, Measurement, Version},
    error::Result,
    model::SensorModel,
    protocol::Address,
    sequencer::{EnableLine, SensorSession, Sequencer, Transport},
};
use std::io::Write;

/// One sensor on a borrowed transport.
///
/// Operations block until the sensor answers or the retries are used up. The sensor
/// does not cache anything, each call is a fresh round trip.
pub struct Sensor<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    session: SensorSession,
}

impl<'t, T: Transport + ?Sized> Sensor<'t, T> {
    pub fn new(transport: &'t mut T, model: SensorModel, address: Address) -> Self {
        Self::from_session(transport, SensorSession::new(model, address))
    }

    pub fn from_session(transport: &'t mut T, session: SensorSession) -> Self {
        Self { transport, session }
    }

    /// Asserts `line` around every exchange.
    pub fn with_enable_line(mut self, line: Box<dyn EnableLine + Send>) -> Self {
        self.session = self.session.with_enable_line(line);
        self
    }

    /// Releases the transport and returns the session.
    pub fn into_session(self) -> SensorSession {
        self.session
    }

    pub fn session(&self) -> &SensorSession {
        &self.session
    }

    pub fn set_debug_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.session.set_debug_sink(sink);
    }

    pub fn stop_debugging(&mut self) {
        self.session.stop_debugging();
    }

    /// The model the sensor was created with.
    pub fn model(&self) -> SensorModel {
        Sequencer::model(&self.session)
    }

    pub fn model_name(&self) -> &'static str {
        self.session.model().name()
    }

    pub fn parameter(&self) -> &'static str {
        self.session.model().parameter()
    }

    pub fn unit(&self) -> &'static str {
        self.session.model().unit()
    }

    pub fn address(&self) -> Address {
        self.session.address()
    }

    pub fn read_serial_number(&mut self) -> Result<String> {
        Sequencer::read_serial_number(self.transport, &mut self.session)
    }

    pub fn read_version(&mut self) -> Result<Version> {
        Sequencer::read_version(self.transport, &mut self.session)
    }

    /// Queries the slave address over broadcast. Only one sensor may be on the bus.
    pub fn read_slave_id(&mut self) -> Result<Address> {
        Sequencer::read_slave_id(self.transport, &mut self.session)
    }

    /// Changes the slave address. Following operations use the new address.
    pub fn set_slave_id(&mut self, new_address: Address) -> Result<()> {
        Sequencer::set_slave_id(self.transport, &mut self.session, new_address)
    }

    pub fn start_measurement(&mut self) -> Result<()> {
        Sequencer::start_measurement(self.transport, &mut self.session)
    }

    pub fn stop_measurement(&mut self) -> Result<()> {
        Sequencer::stop_measurement(self.transport, &mut self.session)
    }

    /// Reads the parameter in [`Self::unit`], plus temperature (°C) and error code
    /// where the model reports them.
    pub fn read_values(&mut self) -> Result<Measurement> {
        Sequencer::read_values(self.transport, &mut self.session)
    }

    /// Reads the temperature in °C.
    pub fn read_temperature(&mut self) -> Result<f32> {
        Sequencer::read_temperature(self.transport, &mut self.session)
    }

    /// Reads the electrode potential in mV. pH only.
    pub fn read_potential(&mut self) -> Result<f32> {
        Sequencer::read_potential(self.transport, &mut self.session)
    }

    pub fn read_calibration(&mut self) -> Result<Calibration> {
        Sequencer::read_calibration(self.transport, &mut self.session)
    }

    /// Writes K and B. Every model except pH.
    pub fn set_calibration(&mut self, calibration: Calibration) -> Result<()> {
        Sequencer::set_calibration(self.transport, &mut self.session, calibration)
    }

    /// Writes the cap coefficients K0 to K7. Dissolved oxygen only.
    pub fn set_cap_coefficients(&mut self, coefficients: &[f32]) -> Result<()> {
        Sequencer::set_cap_coefficients(self.transport, &mut self.session, coefficients)
    }

    /// Writes the pH coefficients K1 to K6, see
    /// [`crate::codec::PH_FACTORY_COEFFICIENTS`] for the factory values.
    pub fn set_ph_calibration(&mut self, coefficients: &[f32]) -> Result<()> {
        Sequencer::set_ph_calibration(self.transport, &mut self.session, coefficients)
    }

    /// Starts a three point pH calibration. No I/O.
    pub fn begin_ph_calibration(&self) -> Result<PhCalibration> {
        PhCalibration::begin(self.session.model())
    }

    pub fn submit_ph_calibration_point(
        &mut self,
        calibration: &mut PhCalibration,
        ph: f32,
    ) -> Result<()> {
        calibration.submit_point(self.transport, &mut self.session, ph)
    }

    pub fn check_ph_calibration(
        &mut self,
        calibration: &mut PhCalibration,
    ) -> Result<CalibrationStatus> {
        calibration.check_status(self.transport, &mut self.session)
    }

    /// Reads the raw pH calibration status mask.
    pub fn read_ph_calibration_status(&mut self) -> Result<CalibrationStatus> {
        Sequencer::read_ph_calibration_status(self.transport, &mut self.session)
    }

    /// Runs the cleaning brush once.
    pub fn activate_brush(&mut self) -> Result<()> {
        Sequencer::activate_brush(self.transport, &mut self.session)
    }

    pub fn read_brush_interval(&mut self) -> Result<BrushInterval> {
        Sequencer::read_brush_interval(self.transport, &mut self.session)
    }

    pub fn set_brush_interval(&mut self, interval: BrushInterval) -> Result<()> {
        Sequencer::set_brush_interval(self.transport, &mut self.session, interval)
    }
}

impl<T: Transport + ?Sized> std::fmt::Debug for Sensor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
