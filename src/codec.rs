//! Conversion between raw holding registers and typed values.
//!
//! Floats are IEEE-754 single precision spread over two registers. The four payload
//! bytes are the float's little-endian byte representation, in wire order. Every
//! float field, read or written, uses this order.
use crate::{
    error::{Mismatch, ValidationError},
    registry::Layout,
};
use std::{fmt, time::Duration};

/// Number of registers one float occupies.
pub const FLOAT_REGISTERS: usize = 2;

fn expect_count(words: &[u16], expected: usize) -> Result<(), Mismatch> {
    if words.len() == expected {
        Ok(())
    } else {
        Err(Mismatch::RegisterCount {
            expected: expected as u16,
            actual: words.len(),
        })
    }
}

pub fn decode_f32(words: [u16; 2]) -> f32 {
    let [b0, b1] = words[0].to_be_bytes();
    let [b2, b3] = words[1].to_be_bytes();
    f32::from_le_bytes([b0, b1, b2, b3])
}

pub fn encode_f32(value: f32) -> [u16; 2] {
    let [b0, b1, b2, b3] = value.to_le_bytes();
    [u16::from_be_bytes([b0, b1]), u16::from_be_bytes([b2, b3])]
}

/// Decodes exactly `count` consecutive floats.
pub fn decode_floats(words: &[u16], count: usize) -> Result<Vec<f32>, Mismatch> {
    expect_count(words, count * FLOAT_REGISTERS)?;
    Ok(words
        .chunks_exact(FLOAT_REGISTERS)
        .map(|pair| decode_f32([pair[0], pair[1]]))
        .collect())
}

/// Encodes floats for a multiple register write. Rejects NaN and infinities.
pub fn encode_floats(values: &[f32]) -> Result<Vec<u16>, ValidationError> {
    let mut words = Vec::with_capacity(values.len() * FLOAT_REGISTERS);
    for value in values {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite(*value));
        }
        words.extend_from_slice(&encode_f32(*value));
    }
    Ok(words)
}

/// Decodes a fixed-point word: integer part in the high byte, hundredths in the low byte.
///
/// A low byte of 100 or more is not a hundredths value and is rejected.
pub fn decode_fixed_point(word: u16) -> Result<f32, Mismatch> {
    let [integer, hundredths] = word.to_be_bytes();
    if hundredths >= 100 {
        return Err(Mismatch::Malformed(format!(
            "fixed-point word {word:#06X} has {hundredths} hundredths"
        )));
    }
    Ok(integer as f32 + hundredths as f32 / 100.0)
}

pub const FIXED_POINT_MIN: f32 = 0.0;
pub const FIXED_POINT_MAX: f32 = 255.99;
pub fn encode_fixed_point(value: f32) -> Result<u16, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite(value));
    }
    if !(FIXED_POINT_MIN..=FIXED_POINT_MAX).contains(&value) {
        return Err(ValidationError::FixedPointOutOfRange(value));
    }
    let scaled = (value * 100.0).round() as u32;
    let integer = (scaled / 100) as u8;
    let hundredths = (scaled % 100) as u8;
    Ok(u16::from_be_bytes([integer, hundredths]))
}

/// Decodes ASCII text packed two characters per register, high byte first. The text
/// ends at the first NUL; trailing blanks are dropped.
pub fn decode_ascii(words: &[u16]) -> String {
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
    let text = bytes.split(|b| *b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(text).trim_end().to_string()
}

/// Values read from the primary measurement block.
///
/// The unit of `value` depends on the model, see [`crate::model::SensorModel::unit`].
/// Temperatures are in degrees Celsius. A field the model does not report is `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    pub value: f32,
    pub temperature: Option<f32>,
    pub error_code: Option<u8>,
}

impl Measurement {
    /// Decodes a primary value block laid out as `layout`.
    pub fn decode(layout: Layout, words: &[u16]) -> Result<Self, Mismatch> {
        match layout {
            Layout::TemperatureValueError => {
                expect_count(words, 5)?;
                let floats = decode_floats(&words[..4], 2)?;
                Ok(Self {
                    temperature: Some(floats[0]),
                    value: floats[1],
                    error_code: Some((words[4] >> 8) as u8),
                })
            }
            Layout::TemperatureValue => {
                let floats = decode_floats(words, 2)?;
                Ok(Self {
                    temperature: Some(floats[0]),
                    value: floats[1],
                    error_code: None,
                })
            }
            Layout::ValueTemperature => {
                let floats = decode_floats(words, 2)?;
                Ok(Self {
                    value: floats[0],
                    temperature: Some(floats[1]),
                    error_code: None,
                })
            }
        }
    }

    /// Number of fields the sensor reported.
    pub fn fields_present(&self) -> usize {
        1 + self.temperature.is_some() as usize + self.error_code.is_some() as usize
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        if let Some(temperature) = self.temperature {
            write!(f, ", {temperature} °C")?;
        }
        if let Some(error_code) = self.error_code {
            write!(f, ", error code {error_code:#04x}")?;
        }
        Ok(())
    }
}

/// Hardware and software revision, as `major.minor` numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    pub hardware: f32,
    pub software: f32,
}

impl Version {
    pub fn decode_from_holding_registers(words: &[u16]) -> Result<Self, Mismatch> {
        expect_count(words, 2)?;
        Ok(Self {
            hardware: decode_fixed_point(words[0])?,
            software: decode_fixed_point(words[1])?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hardware {:.2}, software {:.2}",
            self.hardware, self.software
        )
    }
}

/// The linear calibration `value = K * raw + B` of all sensors except pH.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calibration {
    pub k: f32,
    pub b: f32,
}

impl Calibration {
    pub fn decode_from_holding_registers(words: &[u16]) -> Result<Self, Mismatch> {
        let floats = decode_floats(words, 2)?;
        Ok(Self {
            k: floats[0],
            b: floats[1],
        })
    }

    pub fn encode_for_write_registers(&self) -> Result<Vec<u16>, ValidationError> {
        encode_floats(&[self.k, self.b])
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K={}, B={}", self.k, self.b)
    }
}

/// Number of cap coefficients of a dissolved oxygen sensor.
pub const CAP_COEFFICIENTS: usize = 8;
/// Number of pH calibration coefficients.
pub const PH_COEFFICIENTS: usize = 6;
/// Factory pH calibration K1 to K6.
pub const PH_FACTORY_COEFFICIENTS: [f32; PH_COEFFICIENTS] = [6.86, -6.72, 0.04, 6.86, -6.56, -1.04];

/// Checks the coefficient count and encodes the coefficients.
pub fn encode_coefficients(values: &[f32], expected: usize) -> Result<Vec<u16>, ValidationError> {
    if values.len() != expected {
        return Err(ValidationError::CoefficientCount {
            expected,
            actual: values.len(),
        });
    }
    encode_floats(values)
}

/// The pH calibration status bitmask.
///
/// Several flags can be set at once, so the raw mask is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationStatus(u8);

impl CalibrationStatus {
    pub const SUCCESS: u8 = 0x01;
    pub const NON_MATCHING_STANDARDS: u8 = 0x02;
    pub const TOO_FEW_POINTS: u8 = 0x04;
    pub const COEFFICIENTS_OUT_OF_RANGE: u8 = 0x08;
    const FAULTS: u8 =
        Self::NON_MATCHING_STANDARDS | Self::TOO_FEW_POINTS | Self::COEFFICIENTS_OUT_OF_RANGE;

    pub fn decode_from_holding_registers(words: &[u16]) -> Result<Self, Mismatch> {
        expect_count(words, 1)?;
        Ok(Self((words[0] & 0x00FF) as u8))
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    pub fn success(&self) -> bool {
        self.0 & Self::SUCCESS != 0
    }

    pub fn non_matching_standards(&self) -> bool {
        self.0 & Self::NON_MATCHING_STANDARDS != 0
    }

    pub fn too_few_points(&self) -> bool {
        self.0 & Self::TOO_FEW_POINTS != 0
    }

    pub fn coefficients_out_of_range(&self) -> bool {
        self.0 & Self::COEFFICIENTS_OUT_OF_RANGE != 0
    }

    /// Success reported and no fault flag set.
    pub fn accepted(&self) -> bool {
        self.success() && self.0 & Self::FAULTS == 0
    }
}

impl From<u8> for CalibrationStatus {
    fn from(mask: u8) -> Self {
        Self(mask)
    }
}

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.success(), "success"),
            (self.non_matching_standards(), "non-matching standards"),
            (self.too_few_points(), "fewer than 3 points"),
            (self.coefficients_out_of_range(), "coefficients out of range"),
        ];
        let names: Vec<_> = flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "{:#04x} (no flags)", self.0)
        } else {
            write!(f, "{:#04x} ({})", self.0, names.join(", "))
        }
    }
}

/// How often the cleaning brush runs while the sensor is powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub struct BrushInterval(u16);

impl BrushInterval {
    pub const MIN_MINUTES: u32 = 1;
    pub const MAX_MINUTES: u32 = u16::MAX as u32;

    pub fn decode_from_holding_registers(words: &[u16]) -> Result<Self, Mismatch> {
        expect_count(words, 1)?;
        Ok(Self(words[0]))
    }

    pub fn encode_for_write_register(&self) -> u16 {
        self.0
    }

    pub fn as_minutes(&self) -> u16 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0 as u64 * 60)
    }
}

impl TryFrom<u32> for BrushInterval {
    type Error = ValidationError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        if (Self::MIN_MINUTES..=Self::MAX_MINUTES).contains(&minutes) {
            Ok(Self(minutes as u16))
        } else {
            Err(ValidationError::BrushIntervalOutOfRange(minutes))
        }
    }
}

impl From<BrushInterval> for u32 {
    fn from(interval: BrushInterval) -> u32 {
        interval.0 as u32
    }
}

impl TryFrom<Duration> for BrushInterval {
    type Error = ValidationError;

    fn try_from(interval: Duration) -> Result<Self, Self::Error> {
        let minutes = interval.as_secs() / 60;
        Self::try_from(u32::try_from(minutes).unwrap_or(u32::MAX))
    }
}

impl fmt::Display for BrushInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn float_byte_order() {
        // 1.0 is 0x3F800000, little-endian bytes 00 00 80 3F.
        assert_eq!(encode_f32(1.0), [0x0000, 0x803F]);
        assert_eq!(decode_f32([0x0000, 0x803F]), 1.0);
        // 25.5 is 0x41CC0000.
        assert_eq!(decode_f32([0x0000, 0xCC41]), 25.5);
    }

    #[test]
    fn float_round_trip_is_bit_exact() {
        for value in [
            0.0f32,
            -0.0,
            1.0,
            -6.72,
            9.18,
            f32::MIN_POSITIVE,
            f32::MAX,
            f32::MIN,
            1.0e-40,
        ] {
            assert_eq!(decode_f32(encode_f32(value)).to_bits(), value.to_bits());
        }
        assert!(decode_f32(encode_f32(f32::NAN)).is_nan());
    }

    #[test]
    fn encode_floats_rejects_non_finite() {
        assert_matches!(
            encode_floats(&[1.0, f32::NAN]),
            Err(ValidationError::NotFinite(..))
        );
        assert_matches!(
            encode_floats(&[f32::INFINITY]),
            Err(ValidationError::NotFinite(..))
        );
        assert_eq!(encode_floats(&[1.0, 2.0]).unwrap().len(), 4);
    }

    #[test]
    fn decode_floats_checks_count() {
        let words = encode_floats(&[4.0, 7.0]).unwrap();
        assert_eq!(decode_floats(&words, 2), Ok(vec![4.0, 7.0]));
        assert_eq!(
            decode_floats(&words[..3], 2),
            Err(Mismatch::RegisterCount {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn fixed_point() {
        assert!((decode_fixed_point(0x0107).unwrap() - 1.07).abs() < 1e-6);
        assert_eq!(encode_fixed_point(1.07), Ok(0x0107));
        assert_eq!(encode_fixed_point(0.0), Ok(0x0000));
        assert_eq!(encode_fixed_point(255.99), Ok(0xFF63));
        assert_matches!(
            encode_fixed_point(256.0),
            Err(ValidationError::FixedPointOutOfRange(..))
        );
        assert_matches!(
            encode_fixed_point(-0.5),
            Err(ValidationError::FixedPointOutOfRange(..))
        );
        assert_matches!(
            encode_fixed_point(f32::NAN),
            Err(ValidationError::NotFinite(..))
        );

        for word in [0x0000u16, 0x0100, 0x0163, 0x0A32, 0xFF00] {
            let value = decode_fixed_point(word).unwrap();
            let back = encode_fixed_point(value).unwrap();
            assert_eq!(back, word, "{value}");
        }
        for value in [0.0f32, 1.1, 1.07, 2.5, 17.93] {
            let back = decode_fixed_point(encode_fixed_point(value).unwrap()).unwrap();
            assert!((back - value).abs() <= 0.01, "{value} -> {back}");
        }
    }

    #[test]
    fn fixed_point_rejects_hundredths_overflow() {
        assert_matches!(decode_fixed_point(0x0164), Err(Mismatch::Malformed(..)));
        assert_matches!(decode_fixed_point(0x01FF), Err(Mismatch::Malformed(..)));
        assert_matches!(
            Version::decode_from_holding_registers(&[0x0107, 0x0264]),
            Err(Mismatch::Malformed(..))
        );
        assert!(Version::decode_from_holding_registers(&[0x0107, 0x0263]).is_ok());
    }

    #[test]
    fn ascii() {
        // "SN0123" followed by NUL padding
        let words = [0x534E, 0x3031, 0x3233, 0x0000, 0x0000, 0x0000, 0x0000];
        assert_eq!(decode_ascii(&words), "SN0123");
        let words = [0x4142, 0x2020];
        assert_eq!(decode_ascii(&words), "AB");
        assert_eq!(decode_ascii(&[]), "");
    }

    #[test]
    fn measurement_layouts() {
        let mut words = encode_floats(&[21.5, 3.25]).unwrap();
        assert_eq!(
            Measurement::decode(Layout::TemperatureValue, &words),
            Ok(Measurement {
                value: 3.25,
                temperature: Some(21.5),
                error_code: None
            })
        );
        assert_eq!(
            Measurement::decode(Layout::ValueTemperature, &words),
            Ok(Measurement {
                value: 21.5,
                temperature: Some(3.25),
                error_code: None
            })
        );

        words.push(0x0200);
        let measurement = Measurement::decode(Layout::TemperatureValueError, &words).unwrap();
        assert_eq!(measurement.error_code, Some(0x02));
        assert_eq!(measurement.fields_present(), 3);
    }

    #[test]
    fn measurement_wrong_count_yields_no_value() {
        let words = encode_floats(&[21.5, 3.25]).unwrap();
        assert_eq!(
            Measurement::decode(Layout::TemperatureValueError, &words),
            Err(Mismatch::RegisterCount {
                expected: 5,
                actual: 4
            })
        );
        assert_matches!(
            Measurement::decode(Layout::ValueTemperature, &words[..2]),
            Err(Mismatch::RegisterCount { .. })
        );
    }

    #[test]
    fn version() {
        let version = Version::decode_from_holding_registers(&[0x0100, 0x0107]).unwrap();
        assert_eq!(version.hardware, 1.0);
        assert!((version.software - 1.07).abs() < 1e-6);
        assert_eq!(version.to_string(), "hardware 1.00, software 1.07");
    }

    #[test]
    fn coefficient_count() {
        assert_eq!(
            encode_coefficients(&[1.0; 7], CAP_COEFFICIENTS),
            Err(ValidationError::CoefficientCount {
                expected: 8,
                actual: 7
            })
        );
        assert_eq!(
            encode_coefficients(&PH_FACTORY_COEFFICIENTS, PH_COEFFICIENTS)
                .unwrap()
                .len(),
            12
        );
    }

    #[test]
    fn calibration_status_flags() {
        for mask in 0u8..16 {
            let status = CalibrationStatus::from(mask);
            assert_eq!(status.raw(), mask);
            assert_eq!(status.success(), mask & 0x01 != 0);
            assert_eq!(status.non_matching_standards(), mask & 0x02 != 0);
            assert_eq!(status.too_few_points(), mask & 0x04 != 0);
            assert_eq!(status.coefficients_out_of_range(), mask & 0x08 != 0);
            assert_eq!(status.accepted(), mask == 0x01);
        }

        let status = CalibrationStatus::from(0x05);
        assert!(status.success() && status.too_few_points());
        assert!(!status.non_matching_standards() && !status.coefficients_out_of_range());
        assert_eq!(
            status.to_string(),
            "0x05 (success, fewer than 3 points)"
        );
    }

    #[test]
    fn calibration_status_uses_low_byte() {
        let status = CalibrationStatus::decode_from_holding_registers(&[0xAB01]).unwrap();
        assert_eq!(status.raw(), 0x01);
    }

    #[test]
    fn brush_interval() {
        assert_matches!(
            BrushInterval::try_from(0u32),
            Err(ValidationError::BrushIntervalOutOfRange(0))
        );
        assert_matches!(
            BrushInterval::try_from(65_536u32),
            Err(ValidationError::BrushIntervalOutOfRange(..))
        );
        let interval = BrushInterval::try_from(Duration::from_secs(3600)).unwrap();
        assert_eq!(interval.as_minutes(), 60);
        assert_eq!(interval.encode_for_write_register(), 60);
        assert_eq!(
            BrushInterval::decode_from_holding_registers(&[60]),
            Ok(interval)
        );
        assert_eq!(interval.as_duration(), Duration::from_secs(3600));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn brush_interval_deserialization_checks_range() {
        use serde::{de::value, Deserialize};
        let parse = |minutes: u32| {
            BrushInterval::deserialize(value::U32Deserializer::<value::Error>::new(minutes))
        };
        assert_eq!(parse(60).unwrap().as_minutes(), 60);
        assert!(parse(0).is_err());
        assert!(parse(65_536).is_err());
        assert_eq!(u32::from(parse(1).unwrap()), 1);
    }
}
