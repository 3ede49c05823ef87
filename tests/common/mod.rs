//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use pigeon_cam::camera::CameraDevice;
use pigeon_cam::{
    AcquisitionConfig, AcquisitionPipeline, CameraHandle, CaptureError, FixedClock, StopSignal,
    SyntheticCamera, WeatherError, WeatherReading, WeatherSource,
};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const DATE: &str = "20240512";
pub const TIME: &str = "061530";

pub fn fixed_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 12)
        .and_then(|d| d.and_hms_opt(6, 15, 30))
        .unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(fixed_time()))
}

pub fn sample_reading() -> WeatherReading {
    WeatherReading::from_response(&json!({
        "weather": [{"main": "Clear"}],
        "main": {"temp": 18.2, "temp_min": 16.0, "temp_max": 20.5, "pressure": 1021, "humidity": 55},
        "wind": {"speed": 3.1, "deg": 90},
        "clouds": {"all": 0}
    }))
}

/// Small synthetic camera with no settle time.
pub fn synthetic_camera() -> Arc<CameraHandle> {
    Arc::new(CameraHandle::with_settle(
        Box::new(SyntheticCamera::new().with_frame_size(64, 36)),
        Duration::ZERO,
    ))
}

pub fn pipeline_with(
    camera: Arc<CameraHandle>,
    weather: Arc<dyn WeatherSource>,
    root: &Path,
) -> AcquisitionPipeline {
    AcquisitionPipeline::new(camera, weather, clock(), root)
}

/// Names of all files under `<root>/<DATE>`.
pub fn archived_files(root: &Path) -> Vec<String> {
    let dir = root.join(DATE);
    let mut names: Vec<String> = match std::fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// Weather source with a canned answer.
pub struct StaticWeather(pub Option<WeatherReading>);

#[async_trait]
impl WeatherSource for StaticWeather {
    async fn current(&self) -> Result<Option<WeatherReading>, WeatherError> {
        Ok(self.0.clone())
    }
}

/// Weather source whose response body never parses.
pub struct BrokenWeather;

#[async_trait]
impl WeatherSource for BrokenWeather {
    async fn current(&self) -> Result<Option<WeatherReading>, WeatherError> {
        let err = serde_json::from_str::<serde_json::Value>("{ truncated").unwrap_err();
        Err(WeatherError::Parse(err))
    }
}

/// Weather source that asks the scheduler to stop on its `nth` call.
pub struct StoppingWeather {
    pub stop: StopSignal,
    pub nth: usize,
    pub calls: AtomicUsize,
}

#[async_trait]
impl WeatherSource for StoppingWeather {
    async fn current(&self) -> Result<Option<WeatherReading>, WeatherError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.nth {
            self.stop.request();
        }
        Ok(Some(sample_reading()))
    }
}

/// Camera that fails for selected exposures and tracks whether it is open.
pub struct FlakyCamera {
    inner: SyntheticCamera,
    failing: HashSet<u32>,
    open: Arc<AtomicBool>,
}

impl FlakyCamera {
    pub fn new(failing: &[u32]) -> (Self, Arc<AtomicBool>) {
        let open = Arc::new(AtomicBool::new(false));
        let camera = Self {
            inner: SyntheticCamera::new().with_frame_size(32, 18),
            failing: failing.iter().copied().collect(),
            open: open.clone(),
        };
        (camera, open)
    }
}

#[async_trait]
impl CameraDevice for FlakyCamera {
    async fn open(&self, _settings: &AcquisitionConfig) -> Result<(), CaptureError> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::Device("already open".to_string()));
        }
        Ok(())
    }

    async fn capture(
        &self,
        settings: &AcquisitionConfig,
        settle: Duration,
    ) -> Result<Vec<u8>, CaptureError> {
        if self.failing.contains(&settings.shutter_speed_ms) {
            return Err(CaptureError::Device("sensor timeout".to_string()));
        }
        self.inner.capture(settings, settle).await
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Camera that hands back PNG bytes.
pub struct PngCamera;

#[async_trait]
impl CameraDevice for PngCamera {
    async fn open(&self, _settings: &AcquisitionConfig) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn capture(
        &self,
        _settings: &AcquisitionConfig,
        _settle: Duration,
    ) -> Result<Vec<u8>, CaptureError> {
        let img = image::GrayImage::from_pixel(4, 4, image::Luma([10]));
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        Ok(png.into_inner())
    }

    fn close(&self) {}

    fn name(&self) -> &str {
        "png"
    }
}

/// Minimal HTTP server answering every request with the same response.
///
/// Returns the endpoint URL and the request lines it received.
pub async fn serve_weather(status: u16, body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = vec![0u8; 8192];
            let mut read = 0;
            while read < buf.len() {
                let n = stream.read(&mut buf[read..]).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                read += n;
                if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }

            let request = String::from_utf8_lossy(&buf[..read]).to_string();
            let line = request.lines().next().unwrap_or_default().to_string();
            seen.lock().unwrap().push(line);

            let reason = if status == 200 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{}/data/2.5/weather", addr), requests)
}

/// An endpoint on which nothing is listening.
pub async fn refused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/data/2.5/weather", addr)
}

/// HTTP client that ignores proxy settings of the test environment.
pub fn direct_http() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
