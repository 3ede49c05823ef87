//! Per-capture record: naming, archive location and the metadata document

use crate::clock::{date_stamp, time_stamp, Clock};
use crate::config::AcquisitionConfig;
use crate::error::Result;
use crate::weather::WeatherReading;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

pub const IMAGE_PREFIX: &str = "image";
pub const METADATA_PREFIX: &str = "metadata";
pub const IMAGE_EXTENSION: &str = "jpg";
pub const METADATA_EXTENSION: &str = "json";

/// Metadata document persisted next to every image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub general: General,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageMetadata>,

    /// `None` until the weather stage ran, `Some(None)` when weather was
    /// unavailable (serialized as `null`).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub external_data: Option<Option<WeatherReading>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct General {
    pub dateacquired: String,
    pub timeacquired: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width_px: u32,
    pub height_px: u32,
    pub exposure_ms: u32,
    pub iso: u32,
    pub awb: String,
    pub image_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
}

fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// One capture in progress.
///
/// Built at the start of a pipeline run, enriched stage by stage and consumed
/// by [`CaptureRecord::write_metadata`].
#[derive(Debug)]
pub struct CaptureRecord {
    config: AcquisitionConfig,
    date: String,
    time: String,
    image_name: String,
    metadata_name: String,
    target_directory: PathBuf,
    metadata: CaptureMetadata,
}

impl CaptureRecord {
    /// Stamp a new record with the current date and time.
    ///
    /// The target directory is `<data_root>/<YYYYMMDD>`.
    pub fn new(config: AcquisitionConfig, clock: &dyn Clock, data_root: &Path) -> Self {
        let now = clock.now();
        let date = date_stamp(&now);
        let time = time_stamp(&now);

        let image_name = file_stem(IMAGE_PREFIX, &date, &time, &config);
        let metadata_name = file_stem(METADATA_PREFIX, &date, &time, &config);
        let target_directory = data_root.join(&date);

        let metadata = CaptureMetadata {
            general: General {
                dateacquired: date.clone(),
                timeacquired: time.clone(),
            },
            image: None,
            external_data: None,
        };

        Self {
            config,
            date,
            time,
            image_name,
            metadata_name,
            target_directory,
            metadata,
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn metadata_name(&self) -> &str {
        &self.metadata_name
    }

    pub fn target_directory(&self) -> &Path {
        &self.target_directory
    }

    pub fn image_path(&self) -> PathBuf {
        self.target_directory
            .join(format!("{}.{}", self.image_name, IMAGE_EXTENSION))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.target_directory
            .join(format!("{}.{}", self.metadata_name, METADATA_EXTENSION))
    }

    pub fn metadata(&self) -> &CaptureMetadata {
        &self.metadata
    }

    /// Create the target directory if needed. Returns whether it was created.
    pub async fn validate_target_directory(&self) -> std::io::Result<bool> {
        if tokio::fs::metadata(&self.target_directory)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&self.target_directory).await?;
        Ok(true)
    }

    /// Fill the `image` section from the acquisition settings.
    pub fn record_camera_data(&mut self) {
        let (width_px, height_px) = self.config.resolution;
        self.metadata.image = Some(ImageMetadata {
            width_px,
            height_px,
            exposure_ms: self.config.shutter_speed_ms,
            iso: self.config.iso,
            awb: self.config.awb_mode.as_str().to_string(),
            image_name: self.image_name.clone(),
            brightness: None,
        });
    }

    pub fn record_external_data(&mut self, reading: Option<WeatherReading>) {
        self.metadata.external_data = Some(reading);
    }

    pub fn record_brightness(&mut self, brightness: f64) {
        if self.metadata.image.is_none() {
            self.record_camera_data();
        }
        if let Some(image) = self.metadata.image.as_mut() {
            image.brightness = Some(brightness);
        }
    }

    /// Persist the metadata document; the record cannot change afterwards.
    pub async fn write_metadata(self) -> Result<ArchivedCapture> {
        let path = self.metadata_path();
        let document = serde_json::to_vec(&self.metadata)?;
        tokio::fs::write(&path, document).await?;

        Ok(ArchivedCapture {
            image_path: self.image_path(),
            metadata_path: path,
            metadata: self.metadata,
        })
    }
}

fn file_stem(kind: &str, date: &str, time: &str, config: &AcquisitionConfig) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        kind, date, time, config.shutter_speed_ms, config.iso
    )
}

/// A capture whose image and metadata are on disk.
#[derive(Debug, Clone)]
pub struct ArchivedCapture {
    image_path: PathBuf,
    metadata_path: PathBuf,
    metadata: CaptureMetadata,
}

impl ArchivedCapture {
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn metadata(&self) -> &CaptureMetadata {
        &self.metadata
    }

    pub fn brightness(&self) -> Option<f64> {
        self.metadata.image.as_ref().and_then(|i| i.brightness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn clock() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2023, 6, 21)
                .and_then(|d| d.and_hms_opt(13, 2, 45))
                .unwrap(),
        )
    }

    #[test]
    fn test_names_share_the_timestamp_stem() {
        let record = CaptureRecord::new(AcquisitionConfig::new(300, 200), &clock(), Path::new("data"));

        assert_eq!(record.image_name(), "image_20230621_130245_300_200");
        assert_eq!(record.metadata_name(), "metadata_20230621_130245_300_200");
        assert_eq!(record.target_directory(), Path::new("data/20230621"));
        assert_eq!(
            record.image_path(),
            Path::new("data/20230621/image_20230621_130245_300_200.jpg")
        );
        assert_eq!(
            record.image_name().trim_start_matches("image_"),
            record.metadata_name().trim_start_matches("metadata_")
        );
    }

    #[tokio::test]
    async fn test_validate_target_directory_is_idempotent() {
        let root = TempDir::new().unwrap();
        let record = CaptureRecord::new(AcquisitionConfig::new(100, 100), &clock(), root.path());

        assert!(record.validate_target_directory().await.unwrap());
        assert!(!record.validate_target_directory().await.unwrap());

        let dirs: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(dirs.len(), 1);
        assert!(root.path().join("20230621").is_dir());
    }

    #[tokio::test]
    async fn test_written_document_shape() {
        let root = TempDir::new().unwrap();
        let mut record = CaptureRecord::new(AcquisitionConfig::new(100, 400), &clock(), root.path());
        record.validate_target_directory().await.unwrap();
        record.record_camera_data();
        record.record_external_data(None);
        record.record_brightness(0.25);

        let archived = record.write_metadata().await.unwrap();
        let raw = std::fs::read_to_string(archived.metadata_path()).unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(doc["general"], json!({"dateacquired": "20230621", "timeacquired": "130245"}));
        assert_eq!(doc["image"]["width_px"], 1920);
        assert_eq!(doc["image"]["height_px"], 1080);
        assert_eq!(doc["image"]["exposure_ms"], 100);
        assert_eq!(doc["image"]["iso"], 400);
        assert_eq!(doc["image"]["awb"], "auto");
        assert_eq!(doc["image"]["image_name"], "image_20230621_130245_100_400");
        assert_eq!(doc["image"]["brightness"], 0.25);
        assert!(doc.get("external_data").unwrap().is_null());

        let parsed: CaptureMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.external_data, Some(None));
        assert_eq!(&parsed, archived.metadata());
    }

    #[test]
    fn test_unfetched_weather_is_omitted() {
        let record = CaptureRecord::new(AcquisitionConfig::new(100, 400), &clock(), Path::new("data"));
        let doc = serde_json::to_value(record.metadata()).unwrap();
        assert!(doc.get("external_data").is_none());
        assert!(doc.get("image").is_none());
    }
}
