//! pigeon_cam - exposure-sweep sky camera with weather-enriched metadata
//!
//! Captures images from a fixed camera across a sweep of exposures, attaches
//! the current weather and a brightness score to each capture and archives
//! image + metadata pairs under `data/<YYYYMMDD>/`.

pub mod brightness;
pub mod camera;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod scheduler;
pub mod validation;
pub mod weather;

pub use brightness::{brightness_from_bytes, brightness_from_path, estimate_brightness};
pub use camera::{CameraDevice, CameraHandle, CameraSession, StillCamera, SyntheticCamera};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    AcquisitionConfig, CaptureMode, ConfigProvider, ExposureMode, ExposureSweep, JsonFileConfig,
    StaticConfig, WhiteBalance,
};
pub use error::{AcquisitionError, CaptureError, ConfigError, DecodeError, Result, WeatherError};
pub use pipeline::AcquisitionPipeline;
pub use record::{ArchivedCapture, CaptureMetadata, CaptureRecord};
pub use scheduler::{FailurePolicy, StopReason, StopSignal, SweepScheduler, SweepSummary};
pub use weather::{WeatherClient, WeatherReading, WeatherSource};
