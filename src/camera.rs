//! Camera device access
//!
//! The device is an exclusive resource: [`CameraHandle::session`] hands out at
//! most one [`CameraSession`] at a time and the session closes the device when
//! it is dropped, whether the capture succeeded or not.

use crate::config::AcquisitionConfig;
use crate::error::CaptureError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Default time the sensor gets to settle after configuration.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// A still camera driver.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Acquire and configure the device.
    async fn open(&self, settings: &AcquisitionConfig) -> Result<()>;

    /// Capture one encoded frame with the settings given to `open`, letting
    /// the sensor settle for `settle` after configuration first.
    async fn capture(&self, settings: &AcquisitionConfig, settle: Duration) -> Result<Vec<u8>>;

    /// Release the device. Must be safe to call after a failed capture.
    fn close(&self);

    fn name(&self) -> &str;
}

/// Owner of the camera device, serialising access to it.
pub struct CameraHandle {
    device: Box<dyn CameraDevice>,
    lock: Mutex<()>,
    settle: Duration,
}

impl CameraHandle {
    pub fn new(device: Box<dyn CameraDevice>) -> Self {
        Self::with_settle(device, DEFAULT_SETTLE)
    }

    pub fn with_settle(device: Box<dyn CameraDevice>, settle: Duration) -> Self {
        Self {
            device,
            lock: Mutex::new(()),
            settle,
        }
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Acquire the device for one capture.
    pub async fn session(&self, settings: &AcquisitionConfig) -> Result<CameraSession<'_>> {
        let guard = self.lock.lock().await;
        self.device.open(settings).await?;
        debug!("Camera {} opened", self.device.name());

        Ok(CameraSession {
            device: self.device.as_ref(),
            settings: settings.clone(),
            settle: self.settle,
            _guard: guard,
        })
    }
}

/// Exclusive use of the camera; the device is closed on drop.
pub struct CameraSession<'a> {
    device: &'a dyn CameraDevice,
    settings: AcquisitionConfig,
    settle: Duration,
    _guard: MutexGuard<'a, ()>,
}

impl CameraSession<'_> {
    /// Let the sensor settle, then grab a frame.
    pub async fn capture(&self) -> Result<Vec<u8>> {
        self.device.capture(&self.settings, self.settle).await
    }
}

impl Drop for CameraSession<'_> {
    fn drop(&mut self) {
        self.device.close();
        debug!("Camera {} released", self.device.name());
    }
}

/// Argument builder for the `rpicam-still` command line tool.
pub struct StillCommand {
    program: String,
    args: Vec<String>,
}

impl StillCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Apply acquisition settings; exposure is converted from ms to µs and
    /// ISO to analogue gain.
    pub fn settings(self, settings: &AcquisitionConfig) -> Self {
        let (width, height) = settings.resolution;
        let gain = settings.iso as f64 / 100.0;

        let mut cmd = self
            .args(&["--nopreview", "--encoding", "jpg"])
            .args(&["--width", &width.to_string(), "--height", &height.to_string()])
            .args(&["--shutter", &(settings.shutter_speed_ms as u64 * 1000).to_string()])
            .args(&["--gain", &gain.to_string()])
            .args(&["--awb", settings.awb_mode.still_arg()]);

        if let Some(mode) = settings.exposure_mode.still_arg() {
            cmd = cmd.args(&["--exposure", mode]);
        }
        cmd
    }

    /// Time the camera runs with the settings applied before the still is
    /// taken. rpicam-still treats `--timeout 0` as "run forever", so the
    /// shortest settle is 1 ms.
    pub fn settle(self, settle: Duration) -> Self {
        let ms = settle.as_millis().max(1);
        self.args(&["--timeout", &ms.to_string()])
    }

    pub fn as_args(&self) -> &[String] {
        &self.args
    }

    /// Run the command, writing the frame to stdout, and return the bytes.
    pub async fn execute(self, timeout: Duration) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(["--output", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| CaptureError::Timeout(timeout))?
            .map_err(|e| CaptureError::Device(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Device(stderr.trim().to_string()));
        }

        Ok(output.stdout)
    }
}

/// Raspberry Pi camera driven through `rpicam-still`.
pub struct StillCamera {
    program: String,
    timeout: Duration,
}

impl StillCamera {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for StillCamera {
    fn default() -> Self {
        Self::new("rpicam-still")
    }
}

#[async_trait]
impl CameraDevice for StillCamera {
    /// Check that the tool runs and can see a camera.
    async fn open(&self, _settings: &AcquisitionConfig) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("--list-cameras")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|_| CaptureError::CommandNotFound(self.program.clone()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Device(format!(
                "{} --list-cameras failed ({}): {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        if listing.contains("No cameras available") {
            return Err(CaptureError::Device("no cameras available".to_string()));
        }
        Ok(())
    }

    async fn capture(&self, settings: &AcquisitionConfig, settle: Duration) -> Result<Vec<u8>> {
        StillCommand::new(&self.program)
            .settings(settings)
            .settle(settle)
            .execute(self.timeout + settle)
            .await
    }

    fn close(&self) {}

    fn name(&self) -> &str {
        &self.program
    }
}

/// Camera that renders a uniform grey JPEG whose level follows the exposure.
///
/// Used for dry runs without hardware.
pub struct SyntheticCamera {
    full_scale_ms: u32,
    frame_size: Option<(u32, u32)>,
    open: AtomicBool,
    captures: AtomicU64,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            full_scale_ms: 2000,
            frame_size: None,
            open: AtomicBool::new(false),
            captures: AtomicU64::new(0),
        }
    }

    /// Render frames at this size instead of the configured resolution.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    /// Exposure at which frames saturate to white.
    pub fn with_full_scale(mut self, full_scale_ms: u32) -> Self {
        self.full_scale_ms = full_scale_ms.max(1);
        self
    }

    /// Grey level rendered for an exposure.
    pub fn level_for(&self, exposure_ms: u32) -> u8 {
        let level = exposure_ms as u64 * 255 / self.full_scale_ms as u64;
        level.min(255) as u8
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn capture_count(&self) -> u64 {
        self.captures.load(Ordering::Relaxed)
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDevice for SyntheticCamera {
    async fn open(&self, _settings: &AcquisitionConfig) -> Result<()> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::Device("synthetic camera already open".to_string()));
        }
        Ok(())
    }

    async fn capture(&self, settings: &AcquisitionConfig, settle: Duration) -> Result<Vec<u8>> {
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let (width, height) = self.frame_size.unwrap_or(settings.resolution);
        let level = self.level_for(settings.shutter_speed_ms);
        let frame = GrayImage::from_pixel(width, height, Luma([level]));

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 95)
            .encode_image(&frame)
            .map_err(|e| CaptureError::Device(format!("JPEG encode failed: {}", e)))?;

        self.captures.fetch_add(1, Ordering::Relaxed);
        Ok(jpeg)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
