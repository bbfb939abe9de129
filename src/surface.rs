//! The render seam: something that can show a BGRA frame.

use crate::{transport::FrameView, Result};

/// Title used for the viewer window when none is given.
pub const DEFAULT_TITLE: &str = "NDI Viewer";

/// How the render surface should be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOptions {
    /// Borderless and maximized instead of a decorated window.
    pub fullscreen: bool,
    pub title: String,
    /// Present rows bottom-up.
    pub flip_vertical: bool,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            fullscreen: false,
            title: DEFAULT_TITLE.to_string(),
            flip_vertical: false,
        }
    }
}

/// Result of presenting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Shown,
    /// The user closed the window; nothing further will be shown.
    Closed,
}

/// A drawing surface frames are stretched onto.
pub trait Surface {
    fn present(&mut self, frame: &FrameView<'_>) -> Result<Presented>;
}

/// Builds the surface lazily on the capture thread, on the first frame that
/// has pixels to show.
pub trait SurfaceFactory: Send + Sync + 'static {
    type Surface: Surface;

    fn create(&self) -> Result<Self::Surface>;
}

/// Copies a frame into a tightly packed `width * height * 4` byte buffer,
/// dropping the stride padding. Rows are copied bottom-up when
/// `flip_vertical` is set.
///
/// Scaling to the window is left to the surface, so `dst` always has the
/// frame's own dimensions.
pub fn copy_packed(frame: &FrameView<'_>, dst: &mut [u8], flip_vertical: bool) {
    let row_bytes = frame.width * FrameView::BYTES_PER_PIXEL;
    debug_assert_eq!(dst.len(), row_bytes * frame.height);

    for (y, dst_row) in dst.chunks_exact_mut(row_bytes).take(frame.height).enumerate() {
        let src_y = if flip_vertical { frame.height - 1 - y } else { y };
        dst_row.copy_from_slice(frame.row(src_y));
    }
}

/// Buffer size in bytes [`copy_packed`] needs for `frame`.
pub fn packed_len(frame: &FrameView<'_>) -> usize {
    frame.width * frame.height * FrameView::BYTES_PER_PIXEL
}
