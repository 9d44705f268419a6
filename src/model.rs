//! Supported sensor families and their descriptive metadata.
use std::fmt;

/// The Yosemitech sensor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorModel {
    /// Online optical dissolved oxygen sensor.
    Y502,
    /// Online optical dissolved oxygen sensor.
    Y504,
    /// Optical turbidity sensor.
    Y510,
    /// Auto cleaning optical turbidity sensor.
    Y511,
    /// Blue green algae sensor with wiper.
    Y513,
    /// Chlorophyll sensor with wiper.
    Y514,
    /// Oil in water sensor.
    Y516,
    /// 4-electrode conductivity sensor.
    Y520,
    /// pH sensor.
    Y532,
    /// ORP sensor.
    Y533,
    /// UV254 sensor.
    Y550,
    /// Model not known. Only identity operations (serial number, version, slave ID)
    /// are available.
    Unknown,
}

impl SensorModel {
    pub const ALL: [SensorModel; 12] = [
        SensorModel::Y502,
        SensorModel::Y504,
        SensorModel::Y510,
        SensorModel::Y511,
        SensorModel::Y513,
        SensorModel::Y514,
        SensorModel::Y516,
        SensorModel::Y520,
        SensorModel::Y532,
        SensorModel::Y533,
        SensorModel::Y550,
        SensorModel::Unknown,
    ];

    fn info(&self) -> &'static ModelInfo {
        // MODEL_INFO is ordered like the enum.
        &MODEL_INFO[*self as usize]
    }

    /// Human readable model name. Not reported by the sensor.
    pub fn name(&self) -> &'static str {
        self.info().name
    }

    /// Name of the measured parameter. Not reported by the sensor.
    pub fn parameter(&self) -> &'static str {
        self.info().parameter
    }

    /// Unit of the measured parameter. Not reported by the sensor.
    pub fn unit(&self) -> &'static str {
        self.info().unit
    }
}

impl fmt::Display for SensorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::str::FromStr for SensorModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|model| model.to_string().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("Unknown sensor model '{s}'"))
    }
}

struct ModelInfo {
    name: &'static str,
    parameter: &'static str,
    unit: &'static str,
}

const fn info(name: &'static str, parameter: &'static str, unit: &'static str) -> ModelInfo {
    ModelInfo {
        name,
        parameter,
        unit,
    }
}

static MODEL_INFO: [ModelInfo; 12] = [
    info("Y502 Optical Dissolved Oxygen", "Dissolved Oxygen", "mg/L"),
    info("Y504 Optical Dissolved Oxygen", "Dissolved Oxygen", "mg/L"),
    info("Y510 Optical Turbidity", "Turbidity", "NTU"),
    info("Y511 Auto Cleaning Optical Turbidity", "Turbidity", "NTU"),
    info("Y513 Blue Green Algae", "Blue Green Algae", "µg/L"),
    info("Y514 Chlorophyll", "Chlorophyll", "µg/L"),
    info("Y516 Oil in Water", "Oil in Water", "ppb"),
    info("Y520 4-Electrode Conductivity", "Conductivity", "µS/cm"),
    info("Y532 pH", "pH", "pH"),
    info("Y533 ORP", "Oxidation Reduction Potential", "mV"),
    info("Y550 UV254", "Chemical Oxygen Demand", "mg/L"),
    info("Unknown", "Unknown", "Unknown"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_lines_up_with_enum() {
        for model in SensorModel::ALL {
            assert!(model.name().starts_with(&model.to_string()));
        }
        assert_eq!(SensorModel::Y511.parameter(), "Turbidity");
        assert_eq!(SensorModel::Y511.unit(), "NTU");
        assert_eq!(SensorModel::Y532.unit(), "pH");
    }

    #[test]
    fn parse_model() {
        assert_eq!("y532".parse::<SensorModel>(), Ok(SensorModel::Y532));
        assert_eq!("Unknown".parse::<SensorModel>(), Ok(SensorModel::Unknown));
        assert!("Y999".parse::<SensorModel>().is_err());
    }
}
