//! Sweep scheduler: drives the pipeline across exposures, once or forever
//!
//! Cancellation is cooperative. A [`StopSignal`] is only checked between
//! captures and during the inter-sweep delay, so a capture in flight always
//! runs to completion.

use crate::config::{AcquisitionConfig, CaptureMode, ExposureSweep};
use crate::error::Result;
use crate::pipeline::AcquisitionPipeline;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// What to do when one capture of a continuous sweep fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the whole run on the first failed capture.
    #[default]
    FailFast,
    /// Log the failure and move on to the next exposure.
    SkipExposure,
}

#[derive(Default)]
struct StopInner {
    requested: AtomicBool,
    notify: Notify,
}

/// Operator request to stop between captures.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolves once a stop has been requested.
    pub async fn requested(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Request a stop when the process receives Ctrl-C.
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, stopping after the current capture");
                    signal.request();
                }
                Err(e) => warn!("could not listen for Ctrl-C: {}", e),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Single capture done, or the configured number of sweeps ran.
    Completed,
    /// The operator asked to stop.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub reason: StopReason,
    pub captures_archived: u64,
    pub captures_failed: u64,
    pub sweeps_completed: u64,
}

impl SweepSummary {
    fn new() -> Self {
        Self {
            reason: StopReason::Completed,
            captures_archived: 0,
            captures_failed: 0,
            sweeps_completed: 0,
        }
    }
}

pub struct SweepScheduler {
    pipeline: AcquisitionPipeline,
    base: AcquisitionConfig,
    sweep: ExposureSweep,
    delay: Duration,
    policy: FailurePolicy,
    max_sweeps: Option<u64>,
    stop: StopSignal,
}

impl SweepScheduler {
    /// `base` carries the ISO and camera modes for every capture and the
    /// exposure used in single mode.
    pub fn new(
        pipeline: AcquisitionPipeline,
        base: AcquisitionConfig,
        sweep: ExposureSweep,
        delay: Duration,
    ) -> Self {
        Self {
            pipeline,
            base,
            sweep,
            delay,
            policy: FailurePolicy::default(),
            max_sweeps: None,
            stop: StopSignal::new(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop continuous mode after this many full sweeps.
    pub fn with_max_sweeps(mut self, max_sweeps: u64) -> Self {
        self.max_sweeps = Some(max_sweeps);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn pipeline(&self) -> &AcquisitionPipeline {
        &self.pipeline
    }

    pub async fn run(&self, mode: CaptureMode) -> Result<SweepSummary> {
        let result = match mode {
            CaptureMode::Single => self.run_single().await,
            CaptureMode::Continuous => self.run_continuous().await,
        };

        let snapshot = self.pipeline.metrics().snapshot();
        info!(
            "captures: {} archived, {} failed, {} without weather, avg {} ms",
            snapshot.captures_archived,
            snapshot.captures_failed,
            snapshot.weather_absent,
            snapshot.avg_latency_ms
        );
        result
    }

    async fn run_single(&self) -> Result<SweepSummary> {
        let mut summary = SweepSummary::new();
        self.pipeline.run_once(&self.base).await?;
        summary.captures_archived = 1;
        Ok(summary)
    }

    async fn run_continuous(&self) -> Result<SweepSummary> {
        let mut summary = SweepSummary::new();
        info!(
            "starting continuous capture: {} exposures per sweep, ISO {}, {:?} between sweeps",
            self.sweep.len(),
            self.base.iso,
            self.delay
        );

        loop {
            for &exposure in self.sweep.exposures() {
                if self.stop.is_requested() {
                    info!("Manual break by user");
                    summary.reason = StopReason::Interrupted;
                    return Ok(summary);
                }

                let config = self.base.with_exposure(exposure);
                match self.pipeline.run_once(&config).await {
                    Ok(_) => summary.captures_archived += 1,
                    Err(e) => match self.policy {
                        FailurePolicy::FailFast => {
                            error!("{} went wrong ... stopping!", e);
                            return Err(e);
                        }
                        FailurePolicy::SkipExposure => {
                            warn!("capture at {} ms failed, skipping: {}", exposure, e);
                            summary.captures_failed += 1;
                        }
                    },
                }
            }

            summary.sweeps_completed += 1;
            if self
                .max_sweeps
                .is_some_and(|max| summary.sweeps_completed >= max)
            {
                info!("finished {} sweeps", summary.sweeps_completed);
                return Ok(summary);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = self.stop.requested() => {
                    info!("Manual break by user");
                    summary.reason = StopReason::Interrupted;
                    return Ok(summary);
                }
            }
        }
    }
}
