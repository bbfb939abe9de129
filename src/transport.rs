//! The transport seam: sources, connection descriptions and frame capture.
//!
//! Everything above this module (session, capture loop, discovery) only talks
//! to the [`Transport`] and [`Receive`] traits. The NDI SDK implementation
//! lives in [`crate::ndi`]; tests drive the same code with in-memory doubles.

use std::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

use crate::{Error, Result};

/// Receiver label used when none is configured.
pub const DEFAULT_RECEIVER_NAME: &str = "Channel 1";

/// A discoverable network video endpoint, identified by its name.
///
/// NDI names usually look like `MACHINE (Source Name)`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    /// The NDI source name.
    pub name: String,
}

impl Source {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Pixel layout the transport should deliver video in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    /// BGRX for opaque frames, BGRA when the source carries alpha.
    #[default]
    BgrxBgra,
    UyvyBgra,
    RgbxRgba,
    UyvyRgba,
    Fastest,
    Best,
}

/// Bandwidth tier requested from the source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    MetadataOnly,
    AudioOnly,
    Lowest,
    #[default]
    Highest,
}

/// Everything the transport needs to create a receive instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescription {
    pub source: Source,
    pub color_format: ColorFormat,
    pub bandwidth: Bandwidth,
    /// When false, interlaced sources are delivered as whole frames.
    pub allow_video_fields: bool,
    /// Human readable label other NDI tools show for this receiver.
    pub receiver_name: String,
}

impl ConnectionDescription {
    pub fn builder(source: Source) -> ConnectionDescriptionBuilder {
        ConnectionDescriptionBuilder::new(source)
    }
}

/// Builder for [`ConnectionDescription`].
///
/// Defaults: BGRX/BGRA color, highest bandwidth, no video fields and the
/// receiver label [`DEFAULT_RECEIVER_NAME`].
#[derive(Debug, Clone)]
pub struct ConnectionDescriptionBuilder {
    source: Source,
    color_format: Option<ColorFormat>,
    bandwidth: Option<Bandwidth>,
    allow_video_fields: Option<bool>,
    receiver_name: Option<String>,
}

impl ConnectionDescriptionBuilder {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            color_format: None,
            bandwidth: None,
            allow_video_fields: None,
            receiver_name: None,
        }
    }

    #[must_use]
    pub fn color(mut self, fmt: ColorFormat) -> Self {
        self.color_format = Some(fmt);
        self
    }

    #[must_use]
    pub fn bandwidth(mut self, bw: Bandwidth) -> Self {
        self.bandwidth = Some(bw);
        self
    }

    #[must_use]
    pub fn allow_video_fields(mut self, allow: bool) -> Self {
        self.allow_video_fields = Some(allow);
        self
    }

    #[must_use]
    pub fn receiver_name<S: Into<String>>(mut self, name: S) -> Self {
        self.receiver_name = Some(name.into());
        self
    }

    pub fn build(self) -> ConnectionDescription {
        ConnectionDescription {
            source: self.source,
            color_format: self.color_format.unwrap_or_default(),
            bandwidth: self.bandwidth.unwrap_or_default(),
            allow_video_fields: self.allow_video_fields.unwrap_or(false),
            receiver_name: self
                .receiver_name
                .unwrap_or_else(|| DEFAULT_RECEIVER_NAME.to_string()),
        }
    }
}

/// Outcome of a single poll of a receive instance.
///
/// The frame payloads are guards: dropping one hands the frame back to the
/// transport, so every delivered frame is released exactly once no matter
/// which arm handles it.
#[derive(Debug)]
pub enum Capture<V, A, M> {
    /// Nothing arrived before the timeout.
    None,
    /// Connection metadata changed (tally, format renegotiation, ...).
    StatusChange,
    Video(V),
    Audio(A),
    Metadata(M),
}

impl<V, A, M> Capture<V, A, M> {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Capture::None => "none",
            Capture::StatusChange => "status_change",
            Capture::Video(_) => "video",
            Capture::Audio(_) => "audio",
            Capture::Metadata(_) => "metadata",
        }
    }
}

/// Borrowed view of a packed 32-bit video frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub width: usize,
    pub height: usize,
    /// Bytes between the start of two consecutive rows.
    pub line_stride: usize,
    pub data: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Bytes per pixel of the packed formats the viewer requests.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Checks that `data` covers `height` rows of `line_stride` bytes.
    pub fn new(width: usize, height: usize, line_stride: usize, data: &'a [u8]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "empty frame dimensions {}x{}",
                width, height
            )));
        }
        let row_bytes = width * Self::BYTES_PER_PIXEL;
        if line_stride < row_bytes {
            return Err(Error::InvalidFrame(format!(
                "line stride {} is shorter than a {}-pixel row",
                line_stride, width
            )));
        }
        let needed = line_stride * (height - 1) + row_bytes;
        if data.len() < needed {
            return Err(Error::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} with stride {} needs {}",
                data.len(),
                width,
                height,
                line_stride,
                needed
            )));
        }
        Ok(Self {
            width,
            height,
            line_stride,
            data,
        })
    }

    /// Pixels of row `y`, without the stride padding.
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.line_stride;
        &self.data[start..start + self.width * Self::BYTES_PER_PIXEL]
    }
}

/// Access to the pixels of a captured video frame.
pub trait VideoPayload {
    /// Returns `Ok(None)` when the frame arrived without a payload pointer.
    fn frame_view(&self) -> Result<Option<FrameView<'_>>>;
}

/// A live receive instance. Dropping it destroys the instance.
pub trait Receive: Send + 'static {
    type Video<'rx>: VideoPayload
    where
        Self: 'rx;
    type Audio<'rx>
    where
        Self: 'rx;
    type Metadata<'rx>
    where
        Self: 'rx;

    /// Blocks for up to `timeout` waiting for the next frame of any type.
    #[allow(clippy::type_complexity)]
    fn capture(
        &self,
        timeout: Duration,
    ) -> Result<Capture<Self::Video<'_>, Self::Audio<'_>, Self::Metadata<'_>>>;
}

/// Creates receive instances.
pub trait Transport {
    type Receiver: Receive;

    /// Creates a receive instance connected to `description.source`.
    ///
    /// Returns [`Error::ConnectFailed`] when the transport hands back no instance.
    fn connect(&self, description: &ConnectionDescription) -> Result<Self::Receiver>;
}
