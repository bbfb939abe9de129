//! NDI implementation of the transport seam.
//!
//! [`NdiTransport`] creates receive instances with `NDIlib_recv_create_v3`.
//! [`NdiReceiver::capture`] polls all three frame kinds at once and wraps the
//! one that was filled in a [`RecvGuard`], which calls the matching
//! `NDIlib_recv_free_*` when dropped.

use std::{ffi::CString, marker::PhantomData, slice, time::Duration};

use log::debug;
use num_enum::TryFromPrimitive;

use crate::{
    ndi_lib::*,
    timeout_ms,
    transport::{
        Bandwidth, Capture, ColorFormat, ConnectionDescription, FrameView, Receive, Transport,
        VideoPayload,
    },
    Error, Result, NDI,
};

impl From<ColorFormat> for NDIlib_recv_color_format_e {
    fn from(format: ColorFormat) -> Self {
        match format {
            ColorFormat::BgrxBgra => NDIlib_recv_color_format_e_NDIlib_recv_color_format_BGRX_BGRA,
            ColorFormat::UyvyBgra => NDIlib_recv_color_format_e_NDIlib_recv_color_format_UYVY_BGRA,
            ColorFormat::RgbxRgba => NDIlib_recv_color_format_e_NDIlib_recv_color_format_RGBX_RGBA,
            ColorFormat::UyvyRgba => NDIlib_recv_color_format_e_NDIlib_recv_color_format_UYVY_RGBA,
            ColorFormat::Fastest => NDIlib_recv_color_format_e_NDIlib_recv_color_format_fastest,
            ColorFormat::Best => NDIlib_recv_color_format_e_NDIlib_recv_color_format_best,
        }
    }
}

impl From<Bandwidth> for NDIlib_recv_bandwidth_e {
    fn from(bandwidth: Bandwidth) -> Self {
        match bandwidth {
            Bandwidth::MetadataOnly => NDIlib_recv_bandwidth_e_NDIlib_recv_bandwidth_metadata_only,
            Bandwidth::AudioOnly => NDIlib_recv_bandwidth_e_NDIlib_recv_bandwidth_audio_only,
            Bandwidth::Lowest => NDIlib_recv_bandwidth_e_NDIlib_recv_bandwidth_lowest,
            Bandwidth::Highest => NDIlib_recv_bandwidth_e_NDIlib_recv_bandwidth_highest,
        }
    }
}

/// Frame type codes returned by `NDIlib_recv_capture_v3`.
#[derive(Debug, TryFromPrimitive, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum FrameKind {
    None = NDIlib_frame_type_e_NDIlib_frame_type_none as _,
    Video = NDIlib_frame_type_e_NDIlib_frame_type_video as _,
    Audio = NDIlib_frame_type_e_NDIlib_frame_type_audio as _,
    Metadata = NDIlib_frame_type_e_NDIlib_frame_type_metadata as _,
    Error = NDIlib_frame_type_e_NDIlib_frame_type_error as _,
    StatusChange = NDIlib_frame_type_e_NDIlib_frame_type_status_change as _,
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::VideoKind {}
    impl Sealed for super::AudioKind {}
    impl Sealed for super::MetadataKind {}
}

/// Frame-kind specific release behaviour for [`RecvGuard`].
pub trait CaptureKind: sealed::Sealed {
    /// The FFI frame descriptor filled in by `NDIlib_recv_capture_v3`.
    type RawFrame: Default;

    /// # Safety
    ///
    /// `instance` must be the live receiver that filled in `frame`, and `frame`
    /// must not have been freed already.
    unsafe fn free_frame(instance: NDIlib_recv_instance_t, frame: &Self::RawFrame);
}

pub struct VideoKind;

impl CaptureKind for VideoKind {
    type RawFrame = NDIlib_video_frame_v2_t;

    unsafe fn free_frame(instance: NDIlib_recv_instance_t, frame: &Self::RawFrame) {
        NDIlib_recv_free_video_v2(instance, frame);
    }
}

pub struct AudioKind;

impl CaptureKind for AudioKind {
    type RawFrame = NDIlib_audio_frame_v3_t;

    unsafe fn free_frame(instance: NDIlib_recv_instance_t, frame: &Self::RawFrame) {
        NDIlib_recv_free_audio_v3(instance, frame);
    }
}

pub struct MetadataKind;

impl CaptureKind for MetadataKind {
    type RawFrame = NDIlib_metadata_frame_t;

    unsafe fn free_frame(instance: NDIlib_recv_instance_t, frame: &Self::RawFrame) {
        NDIlib_recv_free_metadata(instance, frame);
    }
}

/// A captured frame, released back to the SDK exactly once when dropped.
///
/// The `'rx` lifetime borrows the [`NdiReceiver`] that produced the frame, so
/// the receiver cannot be destroyed while one of its frames is alive.
pub struct RecvGuard<'rx, K: CaptureKind> {
    instance: NDIlib_recv_instance_t,
    frame: K::RawFrame,
    _owner: PhantomData<&'rx NdiReceiver>,
}

impl<'rx, K: CaptureKind> RecvGuard<'rx, K> {
    /// # Safety
    ///
    /// `frame` must have been filled in by a capture on `instance` that
    /// reported the frame type matching `K`.
    unsafe fn new(instance: NDIlib_recv_instance_t, frame: K::RawFrame) -> Self {
        Self {
            instance,
            frame,
            _owner: PhantomData,
        }
    }
}

impl<K: CaptureKind> Drop for RecvGuard<'_, K> {
    fn drop(&mut self) {
        // SAFETY: upheld by the constructor contract.
        unsafe { K::free_frame(self.instance, &self.frame) };
    }
}

impl VideoPayload for RecvGuard<'_, VideoKind> {
    fn frame_view(&self) -> Result<Option<FrameView<'_>>> {
        video_view(&self.frame)
    }
}

fn video_view(frame: &NDIlib_video_frame_v2_t) -> Result<Option<FrameView<'_>>> {
    if frame.p_data.is_null() {
        return Ok(None);
    }

    match frame.FourCC {
        NDIlib_FourCC_video_type_e_NDIlib_FourCC_video_type_BGRA
        | NDIlib_FourCC_video_type_e_NDIlib_FourCC_video_type_BGRX
        | NDIlib_FourCC_video_type_e_NDIlib_FourCC_video_type_RGBA
        | NDIlib_FourCC_video_type_e_NDIlib_FourCC_video_type_RGBX => {}
        other => {
            return Err(Error::InvalidFrame(format!(
                "Unsupported pixel format FourCC: 0x{:08X}",
                other
            )))
        }
    }

    // SAFETY: packed formats always carry a line stride in the union.
    let stride = unsafe { frame.__bindgen_anon_1.line_stride_in_bytes };
    if frame.xres <= 0 || frame.yres <= 0 || stride <= 0 {
        return Err(Error::InvalidFrame(format!(
            "{}x{} frame with line stride {}",
            frame.xres, frame.yres, stride
        )));
    }

    let (width, height, stride) = (frame.xres as usize, frame.yres as usize, stride as usize);
    // SAFETY: the SDK hands out `yres` rows of `line_stride_in_bytes` bytes.
    let data = unsafe { slice::from_raw_parts(frame.p_data, stride * height) };
    FrameView::new(width, height, stride, data).map(Some)
}

/// Creates NDI receive instances.
pub struct NdiTransport {
    ndi: NDI,
}

impl NdiTransport {
    pub fn new(ndi: &NDI) -> Result<Self> {
        Ok(Self {
            ndi: ndi.try_clone()?,
        })
    }
}

impl Transport for NdiTransport {
    type Receiver = NdiReceiver;

    fn connect(&self, description: &ConnectionDescription) -> Result<NdiReceiver> {
        let runtime = self.ndi.try_clone()?;

        // Both strings only need to outlive the create call; they are dropped
        // on every path out of this function.
        let source_name = CString::new(description.source.name.as_str())?;
        let receiver_name = CString::new(description.receiver_name.as_str())?;

        let create = NDIlib_recv_create_v3_t {
            source_to_connect_to: NDIlib_source_t {
                p_ndi_name: source_name.as_ptr(),
                ..Default::default()
            },
            color_format: description.color_format.into(),
            bandwidth: description.bandwidth.into(),
            allow_video_fields: description.allow_video_fields,
            p_ndi_recv_name: receiver_name.as_ptr(),
        };

        let instance = unsafe { NDIlib_recv_create_v3(&create) };
        if instance.is_null() {
            return Err(Error::ConnectFailed {
                name: description.source.name.clone(),
            });
        }

        debug!(
            "Created receive instance '{}' for '{}'",
            description.receiver_name, description.source.name
        );
        Ok(NdiReceiver {
            instance,
            _runtime: runtime,
        })
    }
}

/// A live NDI receive instance; destroyed on drop.
pub struct NdiReceiver {
    instance: NDIlib_recv_instance_t,
    _runtime: NDI,
}

impl Receive for NdiReceiver {
    type Video<'rx> = RecvGuard<'rx, VideoKind> where Self: 'rx;
    type Audio<'rx> = RecvGuard<'rx, AudioKind> where Self: 'rx;
    type Metadata<'rx> = RecvGuard<'rx, MetadataKind> where Self: 'rx;

    fn capture(
        &self,
        timeout: Duration,
    ) -> Result<Capture<Self::Video<'_>, Self::Audio<'_>, Self::Metadata<'_>>> {
        let mut video = NDIlib_video_frame_v2_t::default();
        let mut audio = NDIlib_audio_frame_v3_t::default();
        let mut metadata = NDIlib_metadata_frame_t::default();

        let frame_type = unsafe {
            NDIlib_recv_capture_v3(
                self.instance,
                &mut video,
                &mut audio,
                &mut metadata,
                timeout_ms(timeout),
            )
        };

        #[allow(clippy::unnecessary_cast)]
        let kind = FrameKind::try_from(frame_type as i32)
            .map_err(|_| Error::CaptureFailed(format!("Unknown frame type: {}", frame_type)))?;

        // SAFETY: each guard wraps the descriptor the SDK reported as filled.
        let captured = unsafe {
            match kind {
                FrameKind::None => Capture::None,
                FrameKind::StatusChange => Capture::StatusChange,
                FrameKind::Video => Capture::Video(RecvGuard::new(self.instance, video)),
                FrameKind::Audio => Capture::Audio(RecvGuard::new(self.instance, audio)),
                FrameKind::Metadata => Capture::Metadata(RecvGuard::new(self.instance, metadata)),
                FrameKind::Error => {
                    return Err(Error::CaptureFailed("Received an error frame".into()))
                }
            }
        };
        Ok(captured)
    }
}

impl Drop for NdiReceiver {
    fn drop(&mut self) {
        unsafe { NDIlib_recv_destroy(self.instance) };
        debug!("Receive instance destroyed");
    }
}

/// # Safety
///
/// The SDK allows a receive instance to be used from any thread; the struct
/// only holds the opaque pointer and a runtime reference.
unsafe impl Send for NdiReceiver {}

/// # Safety
///
/// `NDIlib_recv_capture_v3` and the free functions are internally synchronized.
unsafe impl Sync for NdiReceiver {}
