//! Register map registry.
//!
//! Each model exposes a different subset of operations at different registers. The
//! map is plain data: a model and an operation select one [`RegisterEntry`]. Adding a
//! model means adding rows, not code.
use crate::{
    error::{Error, Result},
    model::SensorModel,
};
use std::fmt;

/// The logical operations the sensors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterOperation {
    SerialNumber,
    Version,
    ReadSlaveId,
    WriteSlaveId,
    StartMeasurement,
    StopMeasurement,
    PrimaryValues,
    Temperature,
    Potential,
    ReadCalibration,
    WriteCalibration,
    WriteCapCoefficients,
    WritePhCalibration,
    PhCalibrationPoint,
    PhCalibrationStatus,
    ActivateBrush,
    ReadBrushInterval,
    WriteBrushInterval,
}

impl RegisterOperation {
    pub const ALL: [RegisterOperation; 18] = [
        RegisterOperation::SerialNumber,
        RegisterOperation::Version,
        RegisterOperation::ReadSlaveId,
        RegisterOperation::WriteSlaveId,
        RegisterOperation::StartMeasurement,
        RegisterOperation::StopMeasurement,
        RegisterOperation::PrimaryValues,
        RegisterOperation::Temperature,
        RegisterOperation::Potential,
        RegisterOperation::ReadCalibration,
        RegisterOperation::WriteCalibration,
        RegisterOperation::WriteCapCoefficients,
        RegisterOperation::WritePhCalibration,
        RegisterOperation::PhCalibrationPoint,
        RegisterOperation::PhCalibrationStatus,
        RegisterOperation::ActivateBrush,
        RegisterOperation::ReadBrushInterval,
        RegisterOperation::WriteBrushInterval,
    ];
}

impl fmt::Display for RegisterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the registers of an entry are accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Function 0x03.
    Read,
    /// Function 0x06.
    WriteSingle,
    /// Function 0x10.
    WriteMultiple,
    /// Function 0x10 with quantity 0 and no payload.
    Trigger,
}

/// Order of the fields in a primary value block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Temperature, parameter and an error code in the high byte of the fifth register.
    TemperatureValueError,
    TemperatureValue,
    ValueTemperature,
}

/// Data encoding of an entry's registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// ASCII text, two characters per register.
    Ascii,
    /// Two fixed-point words: integer in the high byte, hundredths in the low byte.
    Version,
    /// Address in the high byte.
    SlaveId,
    /// The given number of packed IEEE-754 floats.
    Float32(u16),
    Measurement(Layout),
    /// Bitmask in the low byte.
    StatusMask,
    Minutes,
    None,
}

/// Where and how one operation is carried out on one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEntry {
    pub operation: RegisterOperation,
    pub address: u16,
    pub count: u16,
    pub access: Access,
    pub encoding: Encoding,
}

impl RegisterEntry {
    const fn new(
        operation: RegisterOperation,
        address: u16,
        count: u16,
        access: Access,
        encoding: Encoding,
    ) -> Self {
        Self {
            operation,
            address,
            count,
            access,
            encoding,
        }
    }
}

use Access::*;
use Layout::*;
use RegisterOperation as Op;
use SensorModel::*;

const IDENTIFIED: &[SensorModel] = &[
    Y502, Y504, Y510, Y511, Y513, Y514, Y516, Y520, Y532, Y533, Y550, Unknown,
];
const OPTICAL: &[SensorModel] = &[Y502, Y504, Y510, Y511, Y513, Y514, Y516, Y550];
const ELECTRODE: &[SensorModel] = &[Y520, Y532, Y533];
const CONDUCTIVITY: &[SensorModel] = &[Y520];
const PH_ORP: &[SensorModel] = &[Y532, Y533];
const OPTICAL_AND_CONDUCTIVITY: &[SensorModel] =
    &[Y502, Y504, Y510, Y511, Y513, Y514, Y516, Y520, Y550];
const KB_CALIBRATED: &[SensorModel] =
    &[Y502, Y504, Y510, Y511, Y513, Y514, Y516, Y520, Y533, Y550];
const DISSOLVED_OXYGEN: &[SensorModel] = &[Y502, Y504];
const PH: &[SensorModel] = &[Y532];
const BRUSHED: &[SensorModel] = &[Y511, Y513, Y514];

const fn read(operation: Op, address: u16, count: u16, encoding: Encoding) -> RegisterEntry {
    RegisterEntry::new(operation, address, count, Read, encoding)
}

const fn write_single(operation: Op, address: u16, encoding: Encoding) -> RegisterEntry {
    RegisterEntry::new(operation, address, 1, WriteSingle, encoding)
}

const fn write_floats(operation: Op, address: u16, floats: u16) -> RegisterEntry {
    RegisterEntry::new(
        operation,
        address,
        floats * 2,
        WriteMultiple,
        Encoding::Float32(floats),
    )
}

const fn trigger(operation: Op, address: u16) -> RegisterEntry {
    RegisterEntry::new(operation, address, 0, Trigger, Encoding::None)
}

const FLOAT: Encoding = Encoding::Float32(1);

/// The register map. Rows for the same operation must not share a model.
static REGISTER_MAP: &[(&[SensorModel], RegisterEntry)] = &[
    (IDENTIFIED, read(Op::SerialNumber, 0x0900, 7, Encoding::Ascii)),
    (IDENTIFIED, read(Op::Version, 0x0700, 2, Encoding::Version)),
    (IDENTIFIED, read(Op::ReadSlaveId, 0x3000, 1, Encoding::SlaveId)),
    (IDENTIFIED, write_single(Op::WriteSlaveId, 0x3000, Encoding::SlaveId)),
    (ELECTRODE, trigger(Op::StartMeasurement, 0x1C00)),
    (OPTICAL, trigger(Op::StartMeasurement, 0x2500)),
    (ELECTRODE, trigger(Op::StopMeasurement, 0x1E00)),
    (OPTICAL, trigger(Op::StopMeasurement, 0x2E00)),
    (
        OPTICAL,
        read(Op::PrimaryValues, 0x2600, 5, Encoding::Measurement(TemperatureValueError)),
    ),
    (
        CONDUCTIVITY,
        read(Op::PrimaryValues, 0x2600, 4, Encoding::Measurement(TemperatureValue)),
    ),
    (
        PH_ORP,
        read(Op::PrimaryValues, 0x2800, 4, Encoding::Measurement(ValueTemperature)),
    ),
    (OPTICAL_AND_CONDUCTIVITY, read(Op::Temperature, 0x2600, 2, FLOAT)),
    (PH_ORP, read(Op::Temperature, 0x2400, 2, FLOAT)),
    (PH, read(Op::Potential, 0x1200, 2, FLOAT)),
    (KB_CALIBRATED, read(Op::ReadCalibration, 0x1100, 4, Encoding::Float32(2))),
    (KB_CALIBRATED, write_floats(Op::WriteCalibration, 0x1100, 2)),
    (DISSOLVED_OXYGEN, write_floats(Op::WriteCapCoefficients, 0x1300, 8)),
    (PH, write_floats(Op::WritePhCalibration, 0x1100, 6)),
    (PH, write_floats(Op::PhCalibrationPoint, 0x2300, 1)),
    (PH, read(Op::PhCalibrationStatus, 0x0E00, 1, Encoding::StatusMask)),
    (BRUSHED, trigger(Op::ActivateBrush, 0x2F00)),
    (BRUSHED, read(Op::ReadBrushInterval, 0x3200, 1, Encoding::Minutes)),
    (BRUSHED, write_single(Op::WriteBrushInterval, 0x3200, Encoding::Minutes)),
];

/// Looks up the entry of `operation` for `model`.
///
/// Fails with [`Error::Unsupported`] if the model does not define the operation.
pub fn resolve(model: SensorModel, operation: RegisterOperation) -> Result<&'static RegisterEntry> {
    REGISTER_MAP
        .iter()
        .find(|(models, entry)| entry.operation == operation && models.contains(&model))
        .map(|(_, entry)| entry)
        .ok_or(Error::Unsupported { model, operation })
}

/// Returns whether `model` defines `operation`.
pub fn supports(model: SensorModel, operation: RegisterOperation) -> bool {
    resolve(model, operation).is_ok()
}

/// All operations `model` defines, in declaration order.
pub fn operations(model: SensorModel) -> impl Iterator<Item = RegisterOperation> {
    RegisterOperation::ALL
        .into_iter()
        .filter(move |operation| supports(model, *operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn no_model_has_two_rows_for_one_operation() {
        for model in SensorModel::ALL {
            for operation in RegisterOperation::ALL {
                let rows = REGISTER_MAP
                    .iter()
                    .filter(|(models, entry)| {
                        entry.operation == operation && models.contains(&model)
                    })
                    .count();
                assert!(rows <= 1, "{model} has {rows} rows for {operation}");
            }
        }
    }

    #[test]
    fn register_count_matches_encoding() {
        for (_, entry) in REGISTER_MAP {
            let expected = match entry.encoding {
                Encoding::Ascii => entry.count,
                Encoding::Version => 2,
                Encoding::SlaveId | Encoding::StatusMask | Encoding::Minutes => 1,
                Encoding::Float32(n) => n * 2,
                Encoding::Measurement(Layout::TemperatureValueError) => 5,
                Encoding::Measurement(_) => 4,
                Encoding::None => 0,
            };
            assert_eq!(entry.count, expected, "{entry:?}");
            assert_eq!(entry.access == Access::Trigger, entry.count == 0);
        }
    }

    #[test]
    fn unknown_model_is_identity_only() {
        let supported: Vec<_> = operations(SensorModel::Unknown).collect();
        assert_eq!(
            supported,
            vec![
                RegisterOperation::SerialNumber,
                RegisterOperation::Version,
                RegisterOperation::ReadSlaveId,
                RegisterOperation::WriteSlaveId,
            ]
        );
        assert_matches!(
            resolve(SensorModel::Unknown, RegisterOperation::PrimaryValues),
            Err(Error::Unsupported {
                model: SensorModel::Unknown,
                operation: RegisterOperation::PrimaryValues
            })
        );
    }

    #[test]
    fn family_specific_operations() {
        assert!(supports(SensorModel::Y532, RegisterOperation::Potential));
        assert!(!supports(SensorModel::Y511, RegisterOperation::Potential));

        assert!(supports(SensorModel::Y511, RegisterOperation::ActivateBrush));
        assert!(!supports(SensorModel::Y510, RegisterOperation::ActivateBrush));

        assert!(supports(SensorModel::Y504, RegisterOperation::WriteCapCoefficients));
        assert!(!supports(SensorModel::Y532, RegisterOperation::WriteCapCoefficients));

        assert!(!supports(SensorModel::Y532, RegisterOperation::WriteCalibration));
        assert!(supports(SensorModel::Y532, RegisterOperation::WritePhCalibration));
    }

    #[test]
    fn per_model_addresses() {
        let start = |model| {
            resolve(model, RegisterOperation::StartMeasurement)
                .unwrap()
                .address
        };
        assert_eq!(start(SensorModel::Y532), 0x1C00);
        assert_eq!(start(SensorModel::Y511), 0x2500);

        let values = resolve(SensorModel::Y532, RegisterOperation::PrimaryValues).unwrap();
        assert_eq!(values.address, 0x2800);
        assert_eq!(values.encoding, Encoding::Measurement(Layout::ValueTemperature));
    }

    #[test]
    fn every_measuring_model_reads_values() {
        for model in SensorModel::ALL.into_iter().filter(|m| *m != SensorModel::Unknown) {
            for operation in [
                RegisterOperation::PrimaryValues,
                RegisterOperation::Temperature,
                RegisterOperation::StartMeasurement,
                RegisterOperation::StopMeasurement,
            ] {
                assert!(supports(model, operation), "{model} lacks {operation}");
            }
        }
    }
}
