// crates/pullframe-media/src/ffmpeg/software_decoder.rs
//
// Plain avcodec decode through ffmpeg-the-third, scaled to the pipeline's
// configured pixel format. This is the fallback backend on every platform
// and the only backend outside macOS.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::context::Context as CodecContext;
use ffmpeg::codec::packet::Packet as AvPacket;
use ffmpeg::decoder::video::Video as VideoDecoder;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;

use pullframe_core::options::SoftwarePixelFormat;
use pullframe_core::ports::DecoderBackend;
use pullframe_core::{DecodedFrame, FramePayload, MediaError, Packet, PixelFormat, SampleFormat};

fn to_ffmpeg_pixel(fmt: SoftwarePixelFormat) -> Pixel {
    match fmt {
        SoftwarePixelFormat::Bgra => Pixel::BGRA,
        SoftwarePixelFormat::Rgba => Pixel::RGBA,
        SoftwarePixelFormat::Yuv420p => Pixel::YUV420P,
    }
}

fn to_pixel_format(fmt: SoftwarePixelFormat) -> PixelFormat {
    match fmt {
        SoftwarePixelFormat::Bgra => PixelFormat::Bgra,
        SoftwarePixelFormat::Rgba => PixelFormat::Rgba,
        SoftwarePixelFormat::Yuv420p => PixelFormat::Yuv420p,
    }
}

pub struct SoftwareDecoder {
    decoder: VideoDecoder,
    scaler: Option<SwsContext>,
    out_pixel: Pixel,
    pixel_format: PixelFormat,
    tb_num: i32,
    tb_den: i32,
}

impl SoftwareDecoder {
    pub fn open(
        params: ffmpeg::codec::parameters::Parameters,
        time_base: (i32, i32),
        sw_pix_fmt: SoftwarePixelFormat,
    ) -> Result<Self, MediaError> {
        let ctx =
            CodecContext::from_parameters(params).map_err(|_| MediaError::DecoderNotFound)?;
        let decoder = ctx.decoder().video().map_err(|_| MediaError::DecoderNotFound)?;
        Ok(SoftwareDecoder {
            decoder,
            scaler: None,
            out_pixel: to_ffmpeg_pixel(sw_pix_fmt),
            pixel_format: to_pixel_format(sw_pix_fmt),
            tb_num: time_base.0,
            tb_den: time_base.1,
        })
    }

    fn rescale_to_us(&self, pts: i64) -> i64 {
        pts * 1_000_000 * self.tb_num as i64 / self.tb_den.max(1) as i64
    }

    fn us_to_stream_ts(&self, us: i64) -> i64 {
        us * self.tb_den as i64 / (1_000_000 * self.tb_num.max(1) as i64)
    }

    fn ensure_scaler(&mut self) -> Result<(), MediaError> {
        if self.scaler.is_some() {
            return Ok(());
        }
        let s = SwsContext::get(
            self.decoder.format(),
            self.decoder.width(),
            self.decoder.height(),
            self.out_pixel,
            self.decoder.width(),
            self.decoder.height(),
            Flags::BILINEAR,
        )
        .map_err(|_| MediaError::Generic)?;
        self.scaler = Some(s);
        Ok(())
    }

    fn to_decoded_frame(&mut self, raw: &VideoFrame) -> Result<DecodedFrame, MediaError> {
        self.ensure_scaler()?;
        let scaler = self.scaler.as_mut().unwrap();
        let mut scaled = VideoFrame::empty();
        scaler.run(raw, &mut scaled).map_err(|_| MediaError::Generic)?;

        let nplanes = scaled.planes();
        let mut planes = Vec::with_capacity(nplanes);
        let mut linesizes = Vec::with_capacity(nplanes);
        for i in 0..nplanes {
            let stride = scaled.stride(i);
            let data = scaled.data(i);
            let plane_height = if i == 0 { scaled.height() } else { scaled.height().div_ceil(2) };
            let row_bytes = stride.min(data.len());
            let packed: Vec<u8> = (0..plane_height as usize)
                .flat_map(|row| &data[row * stride..row * stride + row_bytes])
                .copied()
                .collect();
            planes.push(packed);
            linesizes.push(stride);
        }

        let pts = raw.pts().unwrap_or(0);
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

impl DecoderBackend for SoftwareDecoder {
    fn send_packet(&mut self, pkt: &Packet) -> Result<(), MediaError> {
        let mut avpkt = AvPacket::copy(&pkt.data);
        let ts = self.us_to_stream_ts(pkt.pts);
        avpkt.set_pts(Some(ts));
        avpkt.set_dts(Some(ts));
        self.decoder
            .send_packet(&avpkt)
            .map_err(|_| MediaError::InvalidData)
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedFrame>, MediaError> {
        let mut raw = VideoFrame::empty();
        match self.decoder.receive_frame(&mut raw) {
            Ok(()) => self.to_decoded_frame(&raw).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn send_eof(&mut self) -> Result<(), MediaError> {
        let _ = self.decoder.send_eof();
        Ok(())
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn name(&self) -> &str {
        "software"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_mapping_round_trips() {
        assert_eq!(to_pixel_format(SoftwarePixelFormat::Bgra), PixelFormat::Bgra);
        assert_eq!(to_pixel_format(SoftwarePixelFormat::Rgba), PixelFormat::Rgba);
        assert_eq!(
            to_pixel_format(SoftwarePixelFormat::Yuv420p),
            PixelFormat::Yuv420p
        );
    }
}
