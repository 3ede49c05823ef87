use std::path::PathBuf;
use thiserror::Error;

/// Missing or unusable configuration. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing config key: {0}")]
    MissingKey(String),

    #[error("Config key {key} has the wrong type, expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("Invalid exposure sweep: {0}")]
    InvalidSweep(String),
}

/// Camera device failure. Aborts the current capture only.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera command not found: {0}")]
    CommandNotFound(String),

    #[error("Camera device failed: {0}")]
    Device(String),

    #[error("Camera did not deliver a frame within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Camera output is not a JPEG (detected {0})")]
    NotJpeg(String),

    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

/// Weather fetch failures that are *not* a plain non-200 answer.
///
/// A non-200 response is recovered inside the client and recorded as absent
/// weather; these variants always escape to the iteration.
#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Weather request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Weather response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Weather configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Image bytes the brightness estimator could not decode.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Everything that can end one capture.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Enrichment error: {0}")]
    Enrichment(#[from] WeatherError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
