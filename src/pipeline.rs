//! Acquisition pipeline: one capture from camera to archived metadata
//!
//! ## Stages
//!
//! 1. `validate_target_directory` - create `data/<date>/` if missing
//! 2. `take_image` - acquire the camera, capture, write the JPEG
//! 3. `get_external_weather_data` - enrich with the current weather
//! 4. `calculate_image_metrics` - re-read the image and score its brightness
//! 5. `write_metadata` - persist the metadata document
//!
//! Each stage is a precondition for the next and none is retried. A failure
//! stops the capture; the metadata file is only written by the last stage.

use crate::brightness::brightness_from_bytes;
use crate::camera::CameraHandle;
use crate::clock::Clock;
use crate::config::AcquisitionConfig;
use crate::error::{CaptureError, DecodeError, Result};
use crate::metrics::{Metrics, Timer};
use crate::record::{ArchivedCapture, CaptureRecord};
use crate::weather::WeatherSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const JPEG_MIME: &str = "image/jpeg";

pub struct AcquisitionPipeline {
    camera: Arc<CameraHandle>,
    weather: Arc<dyn WeatherSource>,
    clock: Arc<dyn Clock>,
    data_root: PathBuf,
    metrics: Arc<Metrics>,
}

impl AcquisitionPipeline {
    pub fn new(
        camera: Arc<CameraHandle>,
        weather: Arc<dyn WeatherSource>,
        clock: Arc<dyn Clock>,
        data_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            camera,
            weather,
            clock,
            data_root: data_root.into(),
            metrics: Metrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Run all five stages for one capture.
    pub async fn run_once(&self, config: &AcquisitionConfig) -> Result<ArchivedCapture> {
        let timer = Timer::new();
        let result = self.capture(config).await;
        self.metrics.record_capture(result.is_ok(), timer.elapsed_ms());
        result
    }

    async fn capture(&self, config: &AcquisitionConfig) -> Result<ArchivedCapture> {
        let mut record = CaptureRecord::new(config.clone(), self.clock.as_ref(), &self.data_root);

        self.validate_target_directory(&record).await?;
        self.take_image(&mut record).await?;
        self.get_external_weather_data(&mut record).await?;
        self.calculate_image_metrics(&mut record).await?;
        self.write_metadata(record).await
    }

    /// Make sure the record's target directory exists.
    pub async fn validate_target_directory(&self, record: &CaptureRecord) -> Result<()> {
        if record.validate_target_directory().await? {
            info!(
                "created target directory: {}",
                record.target_directory().display()
            );
        }
        Ok(())
    }

    /// Capture a frame and write it to the record's image path.
    ///
    /// The camera session ends before the file is written, so the device is
    /// released on every path out of this stage.
    pub async fn take_image(&self, record: &mut CaptureRecord) -> Result<()> {
        let frame = {
            let session = self.camera.session(record.config()).await?;
            session.capture().await?
        };

        match infer::get(&frame) {
            Some(kind) if kind.mime_type() == JPEG_MIME => {}
            Some(kind) => return Err(CaptureError::NotJpeg(kind.mime_type().to_string()).into()),
            None => return Err(CaptureError::NotJpeg("unknown".to_string()).into()),
        }

        let path = record.image_path();
        tokio::fs::write(&path, &frame)
            .await
            .map_err(CaptureError::Io)?;
        record.record_camera_data();

        info!(
            "captured image {} ({} ms, ISO {}, {} bytes)",
            record.image_name(),
            record.config().shutter_speed_ms,
            record.config().iso,
            frame.len()
        );
        Ok(())
    }

    /// Attach the current weather, or an explicit absence when the provider
    /// had no answer for us.
    pub async fn get_external_weather_data(&self, record: &mut CaptureRecord) -> Result<()> {
        let reading = self.weather.current().await?;
        if reading.is_none() {
            self.metrics.record_weather_absent();
        }
        record.record_external_data(reading);
        Ok(())
    }

    /// Score the brightness of the image as stored on disk.
    pub async fn calculate_image_metrics(&self, record: &mut CaptureRecord) -> Result<()> {
        let path = record.image_path();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| DecodeError::Io { path, source })?;

        let brightness = brightness_from_bytes(&bytes)?;
        debug!("brightness of {}: {:.4}", record.image_name(), brightness);

        record.record_brightness(brightness);
        Ok(())
    }

    /// Persist the metadata document, ending the capture.
    pub async fn write_metadata(&self, record: CaptureRecord) -> Result<ArchivedCapture> {
        let archived = record.write_metadata().await?;
        info!("wrote metadata {}", archived.metadata_path().display());
        Ok(archived)
    }
}
