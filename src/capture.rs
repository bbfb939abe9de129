//! The capture loop run by the receive worker.
//!
//! One iteration polls the receive instance, dispatches on the kind of frame
//! that came back, and lets the frame guard fall out of scope so the frame is
//! handed back to the transport. Video frames with pixels are shown on a
//! surface that is created on the first such frame and reused afterwards.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use log::{debug, error, info, trace, warn};

use crate::{
    surface::{Presented, Surface, SurfaceFactory},
    transport::{
        Bandwidth, Capture, ColorFormat, ConnectionDescription, Receive, Source, VideoPayload,
        DEFAULT_RECEIVER_NAME,
    },
    Error, Result,
};

/// Poll timeout used when none is configured.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Receiver and polling settings for a session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Upper bound on one poll, and so on how long a stop request can take.
    pub timeout: Duration,
    pub color_format: ColorFormat,
    pub bandwidth: Bandwidth,
    pub allow_video_fields: bool,
    pub receiver_name: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            color_format: ColorFormat::BgrxBgra,
            bandwidth: Bandwidth::Highest,
            allow_video_fields: false,
            receiver_name: DEFAULT_RECEIVER_NAME.to_string(),
        }
    }
}

impl CaptureConfig {
    /// The connection description for `source` under these settings.
    pub fn description(&self, source: Source) -> ConnectionDescription {
        ConnectionDescription::builder(source)
            .color(self.color_format)
            .bandwidth(self.bandwidth)
            .allow_video_fields(self.allow_video_fields)
            .receiver_name(self.receiver_name.clone())
            .build()
    }

    /// Rejects settings the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "capture timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Counters collected by one run of the capture loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub polls: u64,
    pub empty: u64,
    pub status_changes: u64,
    pub video: u64,
    /// Video frames that arrived without a payload.
    pub skipped_video: u64,
    pub presented: u64,
    pub audio: u64,
    pub metadata: u64,
    pub errors: u64,
}

/// Why the capture loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The exit flag was raised.
    Requested,
    /// The surface reported its window was closed.
    SurfaceClosed,
}

/// Polls `receiver` until `exit` is raised or the surface is closed.
///
/// Errors from a single capture or present are counted and the loop keeps
/// going. A failed capture is followed by a pause of `timeout`, since a lost
/// connection makes the transport fail immediately instead of waiting. Only the
/// first failure of a run of them is logged as a warning. A stop request is
/// noticed within one `timeout`.
pub fn run_capture_loop<R, F>(
    receiver: &R,
    exit: &AtomicBool,
    timeout: Duration,
    factory: &F,
) -> (LoopExit, CaptureStats)
where
    R: Receive,
    F: SurfaceFactory,
{
    let mut surface: Option<F::Surface> = None;
    let mut stats = CaptureStats::default();
    let mut surface_failures = 0u32;
    let mut capture_failures = 0u64;

    debug!("Capture loop started (timeout {:?})", timeout);

    while !exit.load(Ordering::Acquire) {
        stats.polls += 1;

        let captured = match receiver.capture(timeout) {
            Ok(captured) => captured,
            Err(e) => {
                stats.errors += 1;
                capture_failures += 1;
                if capture_failures == 1 {
                    warn!("Capture failed: {}", e);
                } else {
                    debug!("Capture failed ({} in a row): {}", capture_failures, e);
                }
                thread::sleep(timeout);
                continue;
            }
        };

        if capture_failures > 0 {
            info!("Capture recovered after {} failed polls", capture_failures);
            capture_failures = 0;
        }

        trace!("Poll returned {}", captured.kind());
        match captured {
            Capture::None => stats.empty += 1,
            Capture::StatusChange => {
                stats.status_changes += 1;
                debug!("Receiver status changed");
            }
            Capture::Video(frame) => {
                stats.video += 1;
                match show(&frame, &mut surface, factory, &mut surface_failures) {
                    Ok(Some(Presented::Shown)) => stats.presented += 1,
                    Ok(Some(Presented::Closed)) => {
                        info!("Window closed, stopping capture");
                        return (LoopExit::SurfaceClosed, finish(stats));
                    }
                    Ok(None) => stats.skipped_video += 1,
                    Err(e) => {
                        stats.errors += 1;
                        warn!("Failed to render video frame: {}", e);
                    }
                }
            }
            Capture::Audio(_frame) => stats.audio += 1,
            Capture::Metadata(_frame) => stats.metadata += 1,
        }
    }

    (LoopExit::Requested, finish(stats))
}

fn show<V, F>(
    frame: &V,
    surface: &mut Option<F::Surface>,
    factory: &F,
    failures: &mut u32,
) -> Result<Option<Presented>>
where
    V: VideoPayload,
    F: SurfaceFactory,
{
    let Some(view) = frame.frame_view()? else {
        return Ok(None);
    };

    if surface.is_none() {
        match factory.create() {
            Ok(created) => {
                info!("Render surface created for {}x{} video", view.width, view.height);
                *surface = Some(created);
            }
            Err(e) => {
                *failures += 1;
                if *failures == 1 {
                    error!("Failed to create render surface: {}", e);
                }
                return Err(e);
            }
        }
    }

    match surface.as_mut() {
        Some(surface) => surface.present(&view).map(Some),
        None => Ok(None),
    }
}

fn finish(stats: CaptureStats) -> CaptureStats {
    info!(
        "Capture loop finished: {} polls, {} video ({} shown, {} empty), {} audio, {} metadata, {} errors",
        stats.polls,
        stats.video,
        stats.presented,
        stats.skipped_video,
        stats.audio,
        stats.metadata,
        stats.errors
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_requests_bgra_highest_without_fields() {
        let config = CaptureConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(1000));

        let desc = config.description(Source::new("MACHINE (Out)"));
        assert_eq!(desc.color_format, ColorFormat::BgrxBgra);
        assert_eq!(desc.bandwidth, Bandwidth::Highest);
        assert!(!desc.allow_video_fields);
        assert_eq!(desc.receiver_name, "Channel 1");
    }

    #[test]
    fn description_carries_custom_settings() {
        let config = CaptureConfig {
            bandwidth: Bandwidth::Lowest,
            receiver_name: "Monitor".into(),
            ..CaptureConfig::default()
        };
        let desc = config.description(Source::new("X"));
        assert_eq!(desc.bandwidth, Bandwidth::Lowest);
        assert_eq!(desc.receiver_name, "Monitor");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = CaptureConfig {
            timeout: Duration::ZERO,
            ..CaptureConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfiguration(_))));
        assert!(CaptureConfig::default().validate().is_ok());
    }
}
