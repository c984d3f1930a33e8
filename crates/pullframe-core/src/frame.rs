// crates/pullframe-core/src/frame.rs
//
// A decoded frame as it flows decoder -> filterer -> sink -> client.
// Owns its pixel data (or an opaque hardware surface handle); freed on
// drop. Every message dequeued into a position that isn't forwarded
// further gets released this way — Rust's ownership does this for us as
// long as nobody leaks a clone of the payload elsewhere.

/// Planar pixel data, or an opaque handle into a hardware surface pool
/// (e.g. a VideoToolbox `CVPixelBuffer`). The pipeline never dereferences
/// the handle itself — only the backend that produced it knows how.
#[derive(Debug)]
pub enum FramePayload {
    Planar {
        /// One `Vec<u8>` per plane.
        planes: Vec<Vec<u8>>,
        /// Stride (bytes per row) per plane.
        linesizes: Vec<usize>,
    },
    HardwareSurface {
        handle: u64,
        /// Called on drop to release the backend-side reference, wired to
        /// the `BufferCounter` for backends that need in-flight bounds.
        release: Option<Box<dyn FnOnce(u64) + Send>>,
    },
}

impl Drop for FramePayload {
    fn drop(&mut self) {
        if let FramePayload::HardwareSurface { handle, release } = self {
            if let Some(f) = release.take() {
                f(*handle);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Video: packed/planar pixel samples, see `PixelFormat`.
    Video,
    /// Audio: planar float, `AUDIO_NBCHANNELS` (2) channels.
    AudioPlanarF32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba,
    Bgra,
    Yuv420p,
    Nv12,
}

#[derive(Debug)]
pub struct DecodedFrame {
    /// Presentation timestamp, signed, microsecond time base.
    pub pts: i64,
    pub width: u32,
    pub height: u32,
    pub sample_format: SampleFormat,
    pub pixel_format: PixelFormat,
    pub payload: FramePayload,
}

impl DecodedFrame {
    pub fn with_rewritten_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }
}
