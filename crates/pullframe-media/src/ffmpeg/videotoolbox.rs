// crates/pullframe-media/src/ffmpeg/videotoolbox.rs
//
// VideoToolbox-backed decode path, macOS only. Grounded on decoder_vt.c /
// hwaccel_vt.c: VTDecompressionSession delivers frames asynchronously and
// out of presentation order, so decoded frames pass through a small
// reorder buffer before being handed to the pipeline, and a BufferCounter
// bounds how many surfaces the session may have in flight at once (the
// original caps this at 3 — a VT session with more outstanding buffers
// than its internal pool starts stalling anyway).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::context::Context as CodecContext;
use ffmpeg::codec::packet::Packet as AvPacket;
use ffmpeg::decoder::video::Video as VideoDecoder;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;

use pullframe_core::buffer_counter::BufferCounter;
use pullframe_core::options::SoftwarePixelFormat;
use pullframe_core::ports::DecoderBackend;
use pullframe_core::{DecodedFrame, FramePayload, MediaError, Packet, PixelFormat, SampleFormat};

/// Matches MIN_BUF's effective bound in bufcount.c for a hardware session
/// with no separately advertised pool size.
const MAX_IN_FLIGHT: u32 = 3;

struct ReorderEntry(i64, DecodedFrame);

impl PartialEq for ReorderEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for ReorderEntry {}
impl PartialOrd for ReorderEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ReorderEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

pub struct VideoToolboxDecoder {
    decoder: VideoDecoder,
    scaler: Option<SwsContext>,
    out_pixel: Pixel,
    pixel_format: PixelFormat,
    tb_num: i32,
    tb_den: i32,
    in_flight: Arc<BufferCounter>,
    reorder: BinaryHeap<Reverse<ReorderEntry>>,
}

impl VideoToolboxDecoder {
    /// Opens the decoder with a VideoToolbox hw_device_ctx attached. If
    /// `av_hwdevice_ctx_create` fails (no hardware session available, or
    /// the codec lacks a VT hwaccel), returns `DecoderNotFound` so the
    /// caller can fall back to `SoftwareDecoder` — the only fallback
    /// level this pipeline supports, mirroring `decoding_init`.
    pub fn open(
        params: ffmpeg::codec::parameters::Parameters,
        time_base: (i32, i32),
        sw_pix_fmt: SoftwarePixelFormat,
    ) -> Result<Self, MediaError> {
        let ctx =
            CodecContext::from_parameters(params).map_err(|_| MediaError::DecoderNotFound)?;
        let mut decoder = ctx.decoder().video().map_err(|_| MediaError::DecoderNotFound)?;

        unsafe {
            let mut hw_device_ctx: *mut ffmpeg::ffi::AVBufferRef = std::ptr::null_mut();
            let ret = ffmpeg::ffi::av_hwdevice_ctx_create(
                &mut hw_device_ctx,
                ffmpeg::ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
                std::ptr::null(),
                std::ptr::null_mut(),
                0,
            );
            if ret < 0 || hw_device_ctx.is_null() {
                return Err(MediaError::DecoderNotFound);
            }
            let raw = decoder.as_mut_ptr();
            (*raw).hw_device_ctx = ffmpeg::ffi::av_buffer_ref(hw_device_ctx);
            ffmpeg::ffi::av_buffer_unref(&mut hw_device_ctx);
        }

        let out_pixel = match sw_pix_fmt {
            SoftwarePixelFormat::Bgra => Pixel::BGRA,
            SoftwarePixelFormat::Rgba => Pixel::RGBA,
            SoftwarePixelFormat::Yuv420p => Pixel::YUV420P,
        };
        let pixel_format = match sw_pix_fmt {
            SoftwarePixelFormat::Bgra => PixelFormat::Bgra,
            SoftwarePixelFormat::Rgba => PixelFormat::Rgba,
            SoftwarePixelFormat::Yuv420p => PixelFormat::Yuv420p,
        };

        Ok(VideoToolboxDecoder {
            decoder,
            scaler: None,
            out_pixel,
            pixel_format,
            tb_num: time_base.0,
            tb_den: time_base.1,
            in_flight: BufferCounter::new(MAX_IN_FLIGHT),
            reorder: BinaryHeap::new(),
        })
    }

    fn rescale_to_us(&self, pts: i64) -> i64 {
        pts * 1_000_000 * self.tb_num as i64 / self.tb_den.max(1) as i64
    }

    fn us_to_stream_ts(&self, us: i64) -> i64 {
        us * self.tb_den as i64 / (1_000_000 * self.tb_num.max(1) as i64)
    }

    /// Hardware frames come back in an opaque VT pixel format; transfer
    /// to system memory before anything downstream can touch the bytes.
    fn transfer_and_scale(&mut self, hw_frame: &VideoFrame) -> Result<DecodedFrame, MediaError> {
        let mut sw_frame = VideoFrame::empty();
        unsafe {
            let ret = ffmpeg::ffi::av_hwframe_transfer_data(
                sw_frame.as_mut_ptr(),
                hw_frame.as_ptr(),
                0,
            );
            if ret < 0 {
                return Err(MediaError::Generic);
            }
        }

        if self.scaler.is_none() {
            let s = SwsContext::get(
                sw_frame.format(),
                sw_frame.width(),
                sw_frame.height(),
                self.out_pixel,
                sw_frame.width(),
                sw_frame.height(),
                Flags::BILINEAR,
            )
            .map_err(|_| MediaError::Generic)?;
            self.scaler = Some(s);
        }
        let scaler = self.scaler.as_mut().unwrap();
        let mut scaled = VideoFrame::empty();
        scaler.run(&sw_frame, &mut scaled).map_err(|_| MediaError::Generic)?;

        let nplanes = scaled.planes();
        let mut planes = Vec::with_capacity(nplanes);
        let mut linesizes = Vec::with_capacity(nplanes);
        for i in 0..nplanes {
            let stride = scaled.stride(i);
            let data = scaled.data(i);
            let plane_height = if i == 0 { scaled.height() } else { scaled.height().div_ceil(2) };
            let row_bytes = stride.min(data.len());
            planes.push(
                (0..plane_height as usize)
                    .flat_map(|row| &data[row * stride..row * stride + row_bytes])
                    .copied()
                    .collect::<Vec<u8>>(),
            );
            linesizes.push(stride);
        }

        let pts = hw_frame.pts().unwrap_or(0);
        Ok(DecodedFrame {
            pts: self.rescale_to_us(pts),
            width: scaled.width(),
            height: scaled.height(),
            sample_format: SampleFormat::Video,
            pixel_format: self.pixel_format,
            payload: FramePayload::Planar { planes, linesizes },
        })
    }
}

impl DecoderBackend for VideoToolboxDecoder {
    fn send_packet(&mut self, pkt: &Packet) -> Result<(), MediaError> {
        self.in_flight.acquire();
        let mut avpkt = AvPacket::copy(&pkt.data);
        let ts = self.us_to_stream_ts(pkt.pts);
        avpkt.set_pts(Some(ts));
        avpkt.set_dts(Some(ts));
        let result = self
            .decoder
            .send_packet(&avpkt)
            .map_err(|_| MediaError::InvalidData);
        if result.is_err() {
            self.in_flight.release();
        }
        result
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedFrame>, MediaError> {
        let mut hw_frame = VideoFrame::empty();
        if self.decoder.receive_frame(&mut hw_frame).is_ok() {
            let decoded = self.transfer_and_scale(&hw_frame);
            self.in_flight.release();
            let decoded = decoded?;
            self.reorder.push(Reverse(ReorderEntry(decoded.pts, decoded)));
        }

        // Only release a frame once the reorder buffer is deep enough
        // that a still-later out-of-order arrival can't land before it.
        if self.reorder.len() > MAX_IN_FLIGHT as usize {
            let Reverse(ReorderEntry(_, frame)) = self.reorder.pop().unwrap();
            return Ok(Some(frame));
        }
        Ok(None)
    }

    fn send_eof(&mut self) -> Result<(), MediaError> {
        let _ = self.decoder.send_eof();
        Ok(())
    }

    fn drain_reordered(&mut self) -> Option<DecodedFrame> {
        self.drain_reorder()
    }

    fn flush(&mut self) {
        self.decoder.flush();
        self.reorder.clear();
    }

    fn name(&self) -> &str {
        "videotoolbox"
    }
}

impl VideoToolboxDecoder {
    /// Pop whatever's left in the reorder buffer, oldest pts first. Call
    /// at EOS, once no more packets will arrive to push the window
    /// forward — otherwise the last few frames would sit buffered
    /// forever waiting for arrivals that are never coming.
    pub fn drain_reorder(&mut self) -> Option<DecodedFrame> {
        self.reorder.pop().map(|Reverse(ReorderEntry(_, frame))| frame)
    }
}
