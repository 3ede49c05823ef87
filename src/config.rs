//! Run configuration: the config file capability and per-capture acquisition parameters

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const CITY_KEY: &str = "sensor_location_city";
pub const API_KEY_KEY: &str = "OWM_API_KEY";
pub const DELAY_KEY: &str = "acquisition_delay";
/// Optional override of the weather endpoint template.
pub const ENDPOINT_KEY: &str = "weather_endpoint";

/// Source of configuration values.
///
/// Implementations must not cache: every read reflects the backing document
/// at the time of the call.
pub trait ConfigProvider: Send + Sync {
    /// Load the whole configuration document.
    fn document(&self) -> Result<Value>;

    fn read(&self, key: &str) -> Result<Value> {
        value_key(&self.document()?, key).cloned()
    }

    fn read_string(&self, key: &str) -> Result<String> {
        string_key(&self.document()?, key)
    }

    fn read_u64(&self, key: &str) -> Result<u64> {
        u64_key(&self.document()?, key)
    }

    /// Like [`read_string`](Self::read_string) but a missing key is `None`.
    fn read_optional_string(&self, key: &str) -> Result<Option<String>> {
        optional_string_key(&self.document()?, key)
    }
}

/// Look up `key` in an already loaded document.
pub fn value_key<'a>(document: &'a Value, key: &str) -> Result<&'a Value> {
    document
        .get(key)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

pub fn string_key(document: &Value, key: &str) -> Result<String> {
    match value_key(document, key)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: "string",
        }),
    }
}

pub fn u64_key(document: &Value, key: &str) -> Result<u64> {
    value_key(document, key)?
        .as_u64()
        .ok_or_else(|| ConfigError::WrongType {
            key: key.to_string(),
            expected: "non-negative integer",
        })
}

pub fn optional_string_key(document: &Value, key: &str) -> Result<Option<String>> {
    match string_key(document, key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::MissingKey(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// JSON config file, re-read from disk on every access.
#[derive(Debug, Clone)]
pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for JsonFileConfig {
    fn document(&self) -> Result<Value> {
        let raw = std::fs::read(&self.path).map_err(|source| ConfigError::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Malformed {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-memory configuration document.
#[derive(Debug, Clone)]
pub struct StaticConfig(pub Value);

impl ConfigProvider for StaticConfig {
    fn document(&self) -> Result<Value> {
        Ok(self.0.clone())
    }
}

/// White balance mode handed to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBalance {
    Off,
    #[default]
    Auto,
    Sunlight,
    Cloudy,
    Shade,
    Tungsten,
    Fluorescent,
    Incandescent,
    Flash,
    Horizon,
}

impl WhiteBalance {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhiteBalance::Off => "off",
            WhiteBalance::Auto => "auto",
            WhiteBalance::Sunlight => "sunlight",
            WhiteBalance::Cloudy => "cloudy",
            WhiteBalance::Shade => "shade",
            WhiteBalance::Tungsten => "tungsten",
            WhiteBalance::Fluorescent => "fluorescent",
            WhiteBalance::Incandescent => "incandescent",
            WhiteBalance::Flash => "flash",
            WhiteBalance::Horizon => "horizon",
        }
    }

    /// Name understood by `rpicam-still --awb`.
    pub fn still_arg(&self) -> &'static str {
        match self {
            WhiteBalance::Off => "custom",
            WhiteBalance::Sunlight => "daylight",
            WhiteBalance::Shade | WhiteBalance::Horizon => "cloudy",
            WhiteBalance::Fluorescent => "fluorescent",
            WhiteBalance::Incandescent | WhiteBalance::Tungsten => "incandescent",
            WhiteBalance::Cloudy => "cloudy",
            WhiteBalance::Auto | WhiteBalance::Flash => "auto",
        }
    }
}

/// Exposure program handed to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExposureMode {
    Off,
    #[default]
    Auto,
    Night,
    Sports,
    VeryLong,
}

impl ExposureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureMode::Off => "off",
            ExposureMode::Auto => "auto",
            ExposureMode::Night => "night",
            ExposureMode::Sports => "sports",
            ExposureMode::VeryLong => "verylong",
        }
    }

    /// Name understood by `rpicam-still --exposure`; `None` leaves it unset.
    pub fn still_arg(&self) -> Option<&'static str> {
        match self {
            ExposureMode::Off => None,
            ExposureMode::Auto => Some("normal"),
            ExposureMode::Sports => Some("sport"),
            ExposureMode::Night | ExposureMode::VeryLong => Some("long"),
        }
    }
}

/// Immutable parameters for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub resolution: (u32, u32),
    pub shutter_speed_ms: u32,
    pub iso: u32,
    pub awb_mode: WhiteBalance,
    pub exposure_mode: ExposureMode,
}

impl AcquisitionConfig {
    pub const RESOLUTION: (u32, u32) = (1920, 1080);

    pub fn new(shutter_speed_ms: u32, iso: u32) -> Self {
        Self {
            resolution: Self::RESOLUTION,
            shutter_speed_ms,
            iso,
            awb_mode: WhiteBalance::default(),
            exposure_mode: ExposureMode::default(),
        }
    }

    /// Same settings at a different exposure.
    pub fn with_exposure(&self, shutter_speed_ms: u32) -> Self {
        Self {
            shutter_speed_ms,
            ..self.clone()
        }
    }
}

/// Run the pipeline once, or sweep forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CaptureMode {
    Single,
    Continuous,
}

/// Ordered exposures applied once per scheduler cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureSweep {
    exposures: Vec<u32>,
}

impl ExposureSweep {
    /// Inclusive range `start..=end` in `step` increments.
    pub fn range(start: u32, end: u32, step: u32) -> Result<Self> {
        if step == 0 {
            return Err(ConfigError::InvalidSweep("step must be positive".to_string()));
        }
        if start > end {
            return Err(ConfigError::InvalidSweep(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self {
            exposures: (start..=end).step_by(step as usize).collect(),
        })
    }

    pub fn from_exposures(exposures: Vec<u32>) -> Result<Self> {
        if exposures.is_empty() {
            return Err(ConfigError::InvalidSweep("no exposures given".to_string()));
        }
        Ok(Self { exposures })
    }

    pub fn exposures(&self) -> &[u32] {
        &self.exposures
    }

    pub fn len(&self) -> usize {
        self.exposures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }
}

impl Default for ExposureSweep {
    fn default() -> Self {
        Self {
            exposures: (100..=2000).step_by(100).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_default_sweep_matches_100_to_2000() {
        let sweep = ExposureSweep::default();
        assert_eq!(sweep.len(), 20);
        assert_eq!(sweep.exposures()[0], 100);
        assert_eq!(sweep.exposures()[19], 2000);
        assert_eq!(ExposureSweep::range(100, 2000, 100).unwrap(), sweep);
    }

    #[test]
    fn test_invalid_sweeps_rejected() {
        assert!(ExposureSweep::range(100, 200, 0).is_err());
        assert!(ExposureSweep::range(300, 200, 100).is_err());
        assert!(ExposureSweep::from_exposures(vec![]).is_err());
    }

    #[test]
    fn test_file_config_is_reread_on_every_access() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sensor_location_city": "Berlin"}"#).unwrap();

        let config = JsonFileConfig::new(&path);
        assert_eq!(config.read_string(CITY_KEY).unwrap(), "Berlin");

        std::fs::write(&path, r#"{"sensor_location_city": "Hamburg"}"#).unwrap();
        assert_eq!(config.read_string(CITY_KEY).unwrap(), "Hamburg");
    }

    #[test]
    fn test_missing_and_mistyped_keys() {
        let config = StaticConfig(json!({"acquisition_delay": "soon"}));

        assert!(matches!(config.read(CITY_KEY), Err(ConfigError::MissingKey(_))));
        assert!(matches!(
            config.read_u64(DELAY_KEY),
            Err(ConfigError::WrongType { .. })
        ));
        assert_eq!(config.read_optional_string(ENDPOINT_KEY).unwrap(), None);
    }

    #[test]
    fn test_unreadable_and_malformed_files() {
        let dir = TempDir::new().unwrap();
        let missing = JsonFileConfig::new(dir.path().join("nope.json"));
        assert!(matches!(missing.document(), Err(ConfigError::Unreadable { .. })));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileConfig::new(&path).document(),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_with_exposure_keeps_other_settings() {
        let base = AcquisitionConfig {
            awb_mode: WhiteBalance::Cloudy,
            ..AcquisitionConfig::new(100, 400)
        };
        let next = base.with_exposure(700);
        assert_eq!(next.shutter_speed_ms, 700);
        assert_eq!(next.iso, 400);
        assert_eq!(next.awb_mode, WhiteBalance::Cloudy);
        assert_eq!(next.resolution, (1920, 1080));
    }
}
