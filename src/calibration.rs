//! Three point pH calibration.
//!
//! Procedure:
//!
//! 1. Put the sensor in a standard solution and let it stabilise for one minute.
//! 2. Submit the pH of the standard with [`PhCalibration::submit_point`].
//! 3. Repeat for the second and third standard. 4.00, 6.86 and 9.18 are recommended.
//! 4. Read the outcome with [`PhCalibration::check_status`].
//!
//! Each submission is an independent transaction. The sequence only lives as long as
//! the [`PhCalibration`] value. If a transaction fails the sequence is aborted and a
//! new one has to be started. Whatever the sensor stored for the points it already
//! accepted cannot be observed or rolled back.
use crate::{
    codec::CalibrationStatus,
    error::{Error, Result, ValidationError},
    model::SensorModel,
    registry::{self, RegisterOperation},
    sequencer::{SensorSession, Sequencer, Transport},
};
use log::*;

/// Number of standards in a full calibration.
pub const CALIBRATION_POINTS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    /// The given number of points has been submitted.
    PointSubmitted(u8),
    /// The status was read and reports success without faults.
    Accepted(CalibrationStatus),
    /// The status was read and reports a fault or no success.
    Rejected(CalibrationStatus),
    /// A transaction failed. Start a new sequence.
    Aborted,
}

/// Progress of one pH calibration sequence.
#[derive(Debug)]
pub struct PhCalibration {
    state: CalibrationState,
    accepted_points: u8,
    last_status: Option<CalibrationStatus>,
}

/// Failures after which the sensor may hold partial calibration state.
fn is_transaction_failure(error: &Error) -> bool {
    matches!(
        error,
        Error::Timeout { .. } | Error::FramingMismatch(_) | Error::Exception(_) | Error::Io(_)
    )
}

impl PhCalibration {
    /// Starts a sequence for `model`. No I/O.
    pub fn begin(model: SensorModel) -> Result<Self> {
        registry::resolve(model, RegisterOperation::PhCalibrationPoint)?;
        registry::resolve(model, RegisterOperation::PhCalibrationStatus)?;
        Ok(Self {
            state: CalibrationState::Idle,
            accepted_points: 0,
            last_status: None,
        })
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Number of points the sensor acknowledged.
    pub fn accepted_points(&self) -> u8 {
        self.accepted_points
    }

    pub fn last_status(&self) -> Option<CalibrationStatus> {
        self.last_status
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state {
            CalibrationState::Aborted => Err(Error::CalibrationAborted),
            CalibrationState::Accepted(_) | CalibrationState::Rejected(_) => {
                Err(ValidationError::SequenceFinished.into())
            }
            CalibrationState::Idle | CalibrationState::PointSubmitted(_) => Ok(()),
        }
    }

    fn abort_on_failure<V>(&mut self, result: Result<V>) -> Result<V> {
        if let Err(error) = &result {
            if is_transaction_failure(error) {
                warn!(
                    "pH calibration aborted after {} points: {error}",
                    self.accepted_points
                );
                self.state = CalibrationState::Aborted;
            }
        }
        result
    }

    /// Submits the pH of the standard the sensor is immersed in.
    pub fn submit_point<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        session: &mut SensorSession,
        ph: f32,
    ) -> Result<()> {
        self.ensure_running()?;
        if self.accepted_points >= CALIBRATION_POINTS {
            return Err(ValidationError::TooManyPoints(CALIBRATION_POINTS).into());
        }
        let result = Sequencer::submit_ph_calibration_point(transport, session, ph);
        self.abort_on_failure(result)?;
        self.accepted_points += 1;
        self.state = CalibrationState::PointSubmitted(self.accepted_points);
        info!("pH calibration point {} ({ph}) accepted", self.accepted_points);
        Ok(())
    }

    /// Reads the calibration status and finishes the sequence.
    ///
    /// Every flag of the returned mask is meaningful on its own; several may be set.
    pub fn check_status<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        session: &mut SensorSession,
    ) -> Result<CalibrationStatus> {
        self.ensure_running()?;
        if self.state == CalibrationState::Idle {
            return Err(ValidationError::NoPointsSubmitted.into());
        }
        let result = Sequencer::read_ph_calibration_status(transport, session);
        let status = self.abort_on_failure(result)?;
        self.last_status = Some(status);
        self.state = if status.accepted() {
            CalibrationState::Accepted(status)
        } else {
            CalibrationState::Rejected(status)
        };
        info!("pH calibration status {status}");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{Address, Reply, Request},
        sequencer::TransportError,
        testing::StubTransport,
    };
    use assert_matches::assert_matches;

    fn ph_session() -> SensorSession {
        SensorSession::new(SensorModel::Y532, Address::default())
    }

    #[test]
    fn only_ph_sensors_calibrate() {
        assert_matches!(
            PhCalibration::begin(SensorModel::Y511),
            Err(Error::Unsupported { .. })
        );
        assert!(PhCalibration::begin(SensorModel::Y532).is_ok());
    }

    #[test]
    fn three_point_calibration() {
        let mut transport = StubTransport::default();
        let mut session = ph_session();
        let mut calibration = PhCalibration::begin(SensorModel::Y532).unwrap();

        for (n, ph) in [4.00, 6.86, 9.18].into_iter().enumerate() {
            calibration
                .submit_point(&mut transport, &mut session, ph)
                .unwrap();
            assert_eq!(calibration.state(), CalibrationState::PointSubmitted(n as u8 + 1));
        }
        transport.push_reply(Reply::Registers(vec![0x0001]));
        let status = calibration
            .check_status(&mut transport, &mut session)
            .unwrap();
        assert!(status.success());
        assert!(!status.non_matching_standards());
        assert!(!status.too_few_points());
        assert!(!status.coefficients_out_of_range());
        assert_eq!(calibration.state(), CalibrationState::Accepted(status));
        assert_eq!(calibration.last_status(), Some(status));

        let submitted: Vec<_> = transport
            .frames
            .iter()
            .filter_map(|frame| match &frame.request {
                Request::WriteMultipleRegisters { address, values } => {
                    assert_eq!(*address, 0x2300);
                    Some(crate::codec::decode_f32([values[0], values[1]]))
                }
                _ => None,
            })
            .collect();
        assert_eq!(submitted, vec![4.00, 6.86, 9.18]);
    }

    #[test]
    fn rejected_status_keeps_every_flag() {
        let mut transport = StubTransport::default();
        let mut session = ph_session();
        let mut calibration = PhCalibration::begin(SensorModel::Y532).unwrap();
        calibration
            .submit_point(&mut transport, &mut session, 6.86)
            .unwrap();
        transport.push_reply(Reply::Registers(vec![0x0005]));
        let status = calibration
            .check_status(&mut transport, &mut session)
            .unwrap();
        assert_eq!(status.raw(), 0x05);
        assert!(status.success() && status.too_few_points());
        assert_eq!(calibration.state(), CalibrationState::Rejected(status));

        assert_matches!(
            calibration.submit_point(&mut transport, &mut session, 4.0),
            Err(Error::Validation(ValidationError::SequenceFinished))
        );
    }

    #[test]
    fn fourth_point_is_refused() {
        let mut transport = StubTransport::default();
        let mut session = ph_session();
        let mut calibration = PhCalibration::begin(SensorModel::Y532).unwrap();
        for ph in [4.00, 6.86, 9.18] {
            calibration
                .submit_point(&mut transport, &mut session, ph)
                .unwrap();
        }
        assert_matches!(
            calibration.submit_point(&mut transport, &mut session, 10.0),
            Err(Error::Validation(ValidationError::TooManyPoints(3)))
        );
        assert_eq!(calibration.state(), CalibrationState::PointSubmitted(3));
        assert_eq!(transport.frames.len(), 3);
    }

    #[test]
    fn status_before_any_point_is_refused() {
        let mut transport = StubTransport::default();
        let mut session = ph_session();
        let mut calibration = PhCalibration::begin(SensorModel::Y532).unwrap();
        assert_matches!(
            calibration.check_status(&mut transport, &mut session),
            Err(Error::Validation(ValidationError::NoPointsSubmitted))
        );
        assert_eq!(calibration.state(), CalibrationState::Idle);
        assert!(transport.frames.is_empty());
    }

    #[test]
    fn transport_failure_aborts() {
        let mut transport = StubTransport::default();
        let mut session = ph_session();
        session.set_retries(0);
        let mut calibration = PhCalibration::begin(SensorModel::Y532).unwrap();
        calibration
            .submit_point(&mut transport, &mut session, 4.00)
            .unwrap();
        transport.push_failure(TransportError::Timeout);
        assert_matches!(
            calibration.submit_point(&mut transport, &mut session, 6.86),
            Err(Error::Timeout { .. })
        );
        assert_eq!(calibration.state(), CalibrationState::Aborted);
        assert_eq!(calibration.accepted_points(), 1);

        assert_matches!(
            calibration.submit_point(&mut transport, &mut session, 6.86),
            Err(Error::CalibrationAborted)
        );
        assert_matches!(
            calibration.check_status(&mut transport, &mut session),
            Err(Error::CalibrationAborted)
        );
    }

    #[test]
    fn invalid_point_does_not_abort() {
        let mut transport = StubTransport::default();
        let mut session = ph_session();
        let mut calibration = PhCalibration::begin(SensorModel::Y532).unwrap();
        assert_matches!(
            calibration.submit_point(&mut transport, &mut session, -1.0),
            Err(Error::Validation(ValidationError::PhOutOfRange(..)))
        );
        assert_eq!(calibration.state(), CalibrationState::Idle);
        calibration
            .submit_point(&mut transport, &mut session, 4.00)
            .unwrap();
        assert_eq!(calibration.state(), CalibrationState::PointSubmitted(1));
    }
}
