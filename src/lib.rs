//! A minimal NDI® viewer: find a source, receive it, show its video in a window.
//!
//! The crate is split along two seams. [`transport`] describes what the viewer
//! needs from a network video transport (create a receive instance, poll it
//! for frames that release themselves on drop); [`surface`] describes what it
//! needs from a renderer (show a BGRA frame). On top of those sit:
//!
//! - [`discovery`]: picks the first source the discovery set reports, once.
//! - [`session`]: owns at most one connection and the worker thread that
//!   polls it, with an ordered stop-join-destroy teardown.
//! - [`capture`]: the worker's poll and dispatch loop.
//!
//! The `sdk` feature provides the NDI implementation of the transport
//! ([`NdiTransport`], [`Finder`], [`NDI`]); the `window` feature provides a
//! `winit`/`pixels` window surface that stretches frames on the GPU. The
//! binary needs both (`viewer`).
//!
//! ```ignore
//! use ndi_viewer::{CaptureConfig, NdiTransport, Session, Source, SurfaceOptions, WindowSurfaceFactory, NDI};
//!
//! let ndi = NDI::new()?;
//! let mut session = Session::new(
//!     NdiTransport::new(&ndi)?,
//!     WindowSurfaceFactory::new(SurfaceOptions::default()),
//!     CaptureConfig::default(),
//! );
//! session.connect(Source::new("STUDIO (Program)"))?;
//! // ...
//! session.disconnect();
//! ```

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

mod error;

pub mod capture;
pub mod config;
pub mod discovery;
pub mod session;
pub mod surface;
pub mod transport;

#[cfg(feature = "sdk")]
mod ndi_lib;
#[cfg(feature = "sdk")]
pub mod finder;
#[cfg(feature = "sdk")]
pub mod receiver;
#[cfg(feature = "sdk")]
pub mod runtime;

#[cfg(feature = "window")]
mod stretch;
#[cfg(feature = "window")]
pub mod window;

pub use {
    capture::{run_capture_loop, CaptureConfig, CaptureStats, LoopExit, DEFAULT_CAPTURE_TIMEOUT},
    config::LaunchOptions,
    discovery::{watch, DiscoveryListener, SourceSet},
    error::*,
    session::Session,
    surface::{copy_packed, packed_len, Presented, Surface, SurfaceFactory, SurfaceOptions},
    transport::{
        Bandwidth, Capture, ColorFormat, ConnectionDescription, ConnectionDescriptionBuilder,
        FrameView, Receive, Source, Transport, VideoPayload,
    },
};

#[cfg(feature = "sdk")]
pub use {
    finder::{Finder, FinderOptions, FinderOptionsBuilder},
    receiver::{NdiReceiver, NdiTransport, RecvGuard},
    runtime::NDI,
};

#[cfg(feature = "window")]
pub use window::{WindowSurface, WindowSurfaceFactory};

/// Alias for Result with our Error type
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

/// Converts a timeout to the millisecond count the SDK takes, saturating.
#[cfg(feature = "sdk")]
pub(crate) fn timeout_ms(timeout: std::time::Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}
