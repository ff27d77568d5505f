//! Rider and bike configuration.
//!
//! The power model needs a fully populated configuration before any tick is
//! processed: a missing mass, Crr or CdA is a fatal precondition, not a
//! recoverable default. Wheel circumference, air density and default cadence
//! carry documented fallbacks.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fallback wheel circumference in meters (700x25c tire).
pub const DEFAULT_WHEEL_CIRCUMFERENCE_M: f64 = 2.105;

/// Standard air density at sea level and 15 °C, kg/m³.
pub const DEFAULT_AIR_DENSITY_KGM3: f64 = 1.225;

/// Assumed cadence when no cadence source is available, RPM.
pub const DEFAULT_CADENCE_RPM: u16 = 80;

/// Riding position presets for the drag coefficient-area product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CdaPreset {
    /// Riding on the hoods
    Hoods,
    /// Riding in the drops
    Drops,
    /// Out-of-saddle climbing
    OutOfSaddle,
}

impl CdaPreset {
    /// CdA value for this position, m².
    pub fn cda_m2(&self) -> f64 {
        match self {
            CdaPreset::Hoods => 0.320,
            CdaPreset::Drops => 0.290,
            CdaPreset::OutOfSaddle => 0.380,
        }
    }
}

impl std::fmt::Display for CdaPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CdaPreset::Hoods => write!(f, "Hoods"),
            CdaPreset::Drops => write!(f, "Drops"),
            CdaPreset::OutOfSaddle => write!(f, "Out of saddle"),
        }
    }
}

/// Raw configuration file contents, before validation.
///
/// `cda` and `cda_preset` are alternatives; a numeric `cda` wins when both
/// are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiderConfigFile {
    /// Combined rider + bike + kit mass in kilograms
    pub system_mass_kg: Option<f64>,
    /// Wheel circumference in millimeters
    pub wheel_circumference_mm: Option<f64>,
    /// Coefficient of rolling resistance
    pub crr: Option<f64>,
    /// Drag coefficient-area product in m²
    pub cda: Option<f64>,
    /// Named CdA preset, used when no numeric `cda` is given
    pub cda_preset: Option<CdaPreset>,
    /// Air density in kg/m³
    pub air_density_kgm3: Option<f64>,
    /// Cadence assumed when no sensor is connected, RPM
    pub default_cadence_rpm: Option<u16>,
}

/// Validated rider configuration, immutable during a ride.
#[derive(Debug, Clone, PartialEq)]
pub struct RiderConfig {
    /// Combined rider + bike + kit mass in kilograms
    pub system_mass_kg: f64,
    /// Wheel circumference in meters
    pub wheel_circumference_m: f64,
    /// Coefficient of rolling resistance
    pub crr: f64,
    /// Drag coefficient-area product in m²
    pub cda_m2: f64,
    /// Air density in kg/m³
    pub air_density_kgm3: f64,
    /// Cadence assumed when no sensor is connected, RPM
    pub default_cadence_rpm: u16,
}

impl RiderConfig {
    /// Validate raw file contents into a usable configuration.
    pub fn from_file_config(file: RiderConfigFile) -> Result<Self, ConfigError> {
        let system_mass_kg = file
            .system_mass_kg
            .ok_or(ConfigError::MissingField("system_mass_kg"))?;
        if !system_mass_kg.is_finite() || system_mass_kg <= 0.0 {
            return Err(ConfigError::InvalidValue("system_mass_kg"));
        }

        let crr = file.crr.ok_or(ConfigError::MissingField("crr"))?;
        if !crr.is_finite() || crr < 0.0 {
            return Err(ConfigError::InvalidValue("crr"));
        }

        let cda_m2 = match (file.cda, file.cda_preset) {
            (Some(cda), _) => cda,
            (None, Some(preset)) => preset.cda_m2(),
            (None, None) => return Err(ConfigError::MissingField("cda")),
        };
        if !cda_m2.is_finite() || cda_m2 <= 0.0 {
            return Err(ConfigError::InvalidValue("cda"));
        }

        let wheel_circumference_m = match file.wheel_circumference_mm {
            Some(mm) if mm.is_finite() && mm > 0.0 => mm / 1000.0,
            Some(_) => return Err(ConfigError::InvalidValue("wheel_circumference_mm")),
            None => {
                tracing::warn!(
                    "Wheel circumference not configured, using default {} m",
                    DEFAULT_WHEEL_CIRCUMFERENCE_M
                );
                DEFAULT_WHEEL_CIRCUMFERENCE_M
            }
        };

        let air_density_kgm3 = match file.air_density_kgm3 {
            Some(rho) if rho.is_finite() && rho > 0.0 => rho,
            Some(_) => return Err(ConfigError::InvalidValue("air_density_kgm3")),
            None => DEFAULT_AIR_DENSITY_KGM3,
        };

        let default_cadence_rpm = file.default_cadence_rpm.unwrap_or(DEFAULT_CADENCE_RPM);

        Ok(Self {
            system_mass_kg,
            wheel_circumference_m,
            crr,
            cda_m2,
            air_density_kgm3,
            default_cadence_rpm,
        })
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let file: RiderConfigFile =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Self::from_file_config(file)
    }
}

/// Get the application configuration directory.
pub fn get_config_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "veloride", "VeloRide")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("rider.toml")
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for setting: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_file() -> RiderConfigFile {
        RiderConfigFile {
            system_mass_kg: Some(75.0),
            wheel_circumference_mm: Some(2105.0),
            crr: Some(0.005),
            cda: Some(0.320),
            cda_preset: None,
            air_density_kgm3: Some(1.225),
            default_cadence_rpm: Some(80),
        }
    }

    #[test]
    fn test_complete_config_validates() {
        let config = RiderConfig::from_file_config(complete_file()).unwrap();
        assert_eq!(config.system_mass_kg, 75.0);
        assert!((config.wheel_circumference_m - 2.105).abs() < 1e-9);
    }

    #[test]
    fn test_missing_mass_is_fatal() {
        let mut file = complete_file();
        file.system_mass_kg = None;
        assert!(matches!(
            RiderConfig::from_file_config(file),
            Err(ConfigError::MissingField("system_mass_kg"))
        ));
    }

    #[test]
    fn test_missing_cda_is_fatal() {
        let mut file = complete_file();
        file.cda = None;
        assert!(matches!(
            RiderConfig::from_file_config(file),
            Err(ConfigError::MissingField("cda"))
        ));
    }

    #[test]
    fn test_cda_preset_substitutes() {
        let mut file = complete_file();
        file.cda = None;
        file.cda_preset = Some(CdaPreset::Drops);
        let config = RiderConfig::from_file_config(file).unwrap();
        assert!((config.cda_m2 - 0.290).abs() < 1e-9);
    }

    #[test]
    fn test_wheel_circumference_fallback() {
        let mut file = complete_file();
        file.wheel_circumference_mm = None;
        let config = RiderConfig::from_file_config(file).unwrap();
        assert!((config.wheel_circumference_m - DEFAULT_WHEEL_CIRCUMFERENCE_M).abs() < 1e-9);
    }

    #[test]
    fn test_air_density_and_cadence_defaults() {
        let mut file = complete_file();
        file.air_density_kgm3 = None;
        file.default_cadence_rpm = None;
        let config = RiderConfig::from_file_config(file).unwrap();
        assert_eq!(config.air_density_kgm3, DEFAULT_AIR_DENSITY_KGM3);
        assert_eq!(config.default_cadence_rpm, DEFAULT_CADENCE_RPM);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rider.toml");
        std::fs::write(
            &path,
            "system_mass_kg = 82.5\ncrr = 0.004\ncda_preset = \"out_of_saddle\"\n",
        )
        .unwrap();

        let config = RiderConfig::load(&path).unwrap();
        assert_eq!(config.system_mass_kg, 82.5);
        assert!((config.cda_m2 - 0.380).abs() < 1e-9);
        assert_eq!(config.default_cadence_rpm, DEFAULT_CADENCE_RPM);
    }

    #[test]
    fn test_negative_crr_rejected() {
        let mut file = complete_file();
        file.crr = Some(-0.001);
        assert!(matches!(
            RiderConfig::from_file_config(file),
            Err(ConfigError::InvalidValue("crr"))
        ));
    }
}
