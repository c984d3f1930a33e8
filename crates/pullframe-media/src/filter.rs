// crates/pullframe-media/src/filter.rs
//
// Filter-graph backend: buffer source -> optional user filters -> an
// auto-inserted scale clamped to max_pixels -> format sink, or (in
// audio-texture mode) a from-scratch synthesis of a scrolling waveform +
// spectrum image from raw PCM, grounded on mod_filtering.c's
// audio_frame_to_sound_texture. Both implement FilterBackend.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::filter;
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video as VideoFrame;

use pullframe_core::ports::FilterBackend;
use pullframe_core::{DecodedFrame, FramePayload, MediaError, PixelFormat, SampleFormat};

const AUDIO_NBITS: usize = 10;
pub(crate) const AUDIO_NBSAMPLES: usize = 1 << AUDIO_NBITS;
pub(crate) const AUDIO_NBCHANNELS: usize = 2;

fn pixel_format_id(fmt: PixelFormat) -> Pixel {
    match fmt {
        PixelFormat::Bgra => Pixel::BGRA,
        PixelFormat::Rgba => Pixel::RGBA,
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Nv12 => Pixel::NV12,
    }
}

/// Plain video filter graph: scale-to-fit + optional user filter chain +
/// autorotate. Frames that don't need any of this still pass through —
/// the graph is a no-op `format` filter in that case.
pub struct VideoFilter {
    graph: filter::Graph,
}

impl VideoFilter {
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        time_base: (i32, i32),
        max_pixels: Option<u32>,
        user_filters: Option<&str>,
        autorotate_degrees: i32,
    ) -> Result<Self, MediaError> {
        let pix = pixel_format_id(pixel_format);
        let mut graph = filter::Graph::new();

        let args = format!(
            "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect=1/1",
            width,
            height,
            pix as i32,
            time_base.0,
            time_base.1
        );
        graph
            .add(&filter::find("buffer").ok_or(MediaError::NotSupported)?, "in", &args)
            .map_err(|_| MediaError::Generic)?;
        graph
            .add(&filter::find("buffersink").ok_or(MediaError::NotSupported)?, "out", "")
            .map_err(|_| MediaError::Generic)?;

        let mut stages = Vec::new();
        if let Some(rotate) = autorotate_filter_string(autorotate_degrees) {
            stages.push(rotate);
        }
        if let Some(uf) = user_filters {
            stages.push(uf.to_string());
        }
        if let Some(max_px) = max_pixels {
            stages.push(format!(
                "scale=w='min(iw,sqrt({max_px}*iw/ih))':h='min(ih,sqrt({max_px}*ih/iw))'"
            ));
        }
        stages.push(format!("format=pix_fmts={}", pix as i32));
        let spec = stages.join(",");

        graph
            .output("in", 0)
            .and_then(|o| o.input("out", 0))
            .and_then(|o| o.parse(&spec))
            .map_err(|_| MediaError::Generic)?;
        graph.validate().map_err(|_| MediaError::Generic)?;

        Ok(VideoFilter { graph })
    }

    fn to_av_frame(frame: &DecodedFrame) -> VideoFrame {
        let mut avf = VideoFrame::new(pixel_format_id(frame.pixel_format), frame.width, frame.height);
        if let FramePayload::Planar { planes, linesizes } = &frame.payload {
            for (i, plane) in planes.iter().enumerate() {
                let stride = avf.stride(i);
                let dst = avf.data_mut(i);
                let row_bytes = linesizes.get(i).copied().unwrap_or(stride).min(stride);
                let rows = plane.len() / row_bytes.max(1);
                for row in 0..rows {
                    let src = &plane[row * row_bytes..row * row_bytes + row_bytes];
                    dst[row * stride..row * stride + row_bytes].copy_from_slice(src);
                }
            }
        }
        avf.set_pts(Some(frame.pts));
        avf
    }

    fn from_av_frame(avf: &VideoFrame, pixel_format: PixelFormat) -> DecodedFrame {
        let nplanes = avf.planes();
        let mut planes = Vec::with_capacity(nplanes);
        let mut linesizes = Vec::with_capacity(nplanes);
        for i in 0..nplanes {
            let stride = avf.stride(i);
            let data = avf.data(i);
            let plane_height = if i == 0 { avf.height() } else { avf.height().div_ceil(2) };
            let row_bytes = stride.min(data.len());
            planes.push(
                (0..plane_height as usize)
                    .flat_map(|row| &data[row * stride..row * stride + row_bytes])
                    .copied()
                    .collect::<Vec<u8>>(),
            );
            linesizes.push(stride);
        }
        DecodedFrame {
            pts: avf.pts().unwrap_or(0),
            width: avf.width(),
            height: avf.height(),
            sample_format: SampleFormat::Video,
            pixel_format,
            payload: FramePayload::Planar { planes, linesizes },
        }
    }
}

impl FilterBackend for VideoFilter {
    fn filter_frame(&mut self, frame: DecodedFrame) -> Result<Vec<DecodedFrame>, MediaError> {
        let pixel_format = frame.pixel_format;
        let avf = Self::to_av_frame(&frame);
        self.graph
            .get("in")
            .ok_or(MediaError::Generic)?
            .source()
            .add(&avf)
            .map_err(|_| MediaError::Generic)?;

        let mut out = Vec::new();
        let mut sink = self.graph.get("out").ok_or(MediaError::Generic)?;
        let mut filtered = VideoFrame::empty();
        while sink.sink().frame(&mut filtered).is_ok() {
            out.push(Self::from_av_frame(&filtered, pixel_format));
            filtered = VideoFrame::empty();
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<DecodedFrame>, MediaError> {
        Ok(Vec::new())
    }
}

/// transpose=clock for +90, vflip,hflip for 180, transpose=cclock for
/// -90/270 — matches sxplayer.c's autorotate filter construction.
fn autorotate_filter_string(degrees: i32) -> Option<String> {
    match ((degrees % 360) + 360) % 360 {
        90 => Some("transpose=clock".to_string()),
        180 => Some("vflip,hflip".to_string()),
        270 => Some("transpose=cclock".to_string()),
        _ => None,
    }
}

/// Synthesizes a two-row-per-channel texture (wave above, FFT spectrum
/// below) from raw PCM, one video frame per incoming audio frame. Ported
/// from audio_frame_to_sound_texture: samples are windowed with a Hann
/// function before the real FFT, and magnitude is scaled by
/// `1/sqrt(AUDIO_NBSAMPLES/2 + 1)` to keep the output roughly in [0, 1].
pub struct AudioTextureFilter {
    window_lut: Vec<f32>,
    fft: std::sync::Arc<dyn rustfft::Fft<f32>>,
}

impl AudioTextureFilter {
    pub fn new() -> Self {
        let window_lut = (0..AUDIO_NBSAMPLES)
            .map(|i| {
                let x = i as f32 / (AUDIO_NBSAMPLES - 1) as f32;
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
            })
            .collect();
        let mut planner = rustfft::FftPlanner::new();
        let fft = planner.plan_fft_forward(AUDIO_NBSAMPLES);
        AudioTextureFilter { window_lut, fft }
    }

    /// `channels[c]` holds `AUDIO_NBSAMPLES` samples in [-1, 1] for
    /// channel `c`. Produces, per channel: one row of [0,1] wave samples
    /// (half the input width, matching the original's `nb_samples / 2`
    /// window), one row of FFT magnitudes, and `AUDIO_NBITS - 1` further
    /// rows each built by averaging neighbouring pairs of the row above
    /// (zero-padded on the right to keep every row the same width for
    /// storage). Stacked wave[0..NBCHANNELS], spectrum[0..NBCHANNELS],
    /// bands[0..NBCHANNELS][0..AUDIO_NBITS-1].
    pub fn synthesize(&self, channels: &[Vec<f32>; AUDIO_NBCHANNELS], pts: i64) -> DecodedFrame {
        let width = AUDIO_NBSAMPLES / 2;
        let height = AUDIO_NBCHANNELS * (2 + (AUDIO_NBITS - 1));
        let scale = 1.0 / ((AUDIO_NBSAMPLES / 2 + 1) as f32).sqrt();

        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(height);

        for ch in 0..AUDIO_NBCHANNELS {
            let samples = &channels[ch];
            let mut wave = vec![0f32; width];
            for i in 0..width {
                let s = samples.get(width / 2 + i).copied().unwrap_or(0.0);
                wave[i] = (s + 1.0) / 2.0;
            }
            rows.push(wave);
        }

        let mut spectra: Vec<Vec<f32>> = Vec::with_capacity(AUDIO_NBCHANNELS);
        for ch in 0..AUDIO_NBCHANNELS {
            let samples = &channels[ch];
            let mut buf: Vec<rustfft::num_complex::Complex32> = (0..AUDIO_NBSAMPLES)
                .map(|i| {
                    let s = samples.get(i).copied().unwrap_or(0.0);
                    rustfft::num_complex::Complex32::new(s * self.window_lut[i], 0.0)
                })
                .collect();
            self.fft.process(&mut buf);

            let mut spectrum = vec![0f32; width];
            for i in 1..width.saturating_sub(1) {
                spectrum[i] = (buf[i].re * buf[i].re + buf[i].im * buf[i].im).sqrt() * scale;
            }
            spectra.push(spectrum);
        }
        for spectrum in &spectra {
            rows.push(spectrum.clone());
        }
        for spectrum in &spectra {
            let mut prev = spectrum.clone();
            for _ in 0..AUDIO_NBITS - 1 {
                let half_len = prev.len() / 2;
                let mut band = vec![0f32; width];
                for i in 0..half_len {
                    band[i] = (prev[2 * i] + prev[2 * i + 1]) / 2.0;
                }
                rows.push(band.clone());
                prev = band.into_iter().take(half_len.max(1)).collect();
            }
        }

        let mut plane = Vec::with_capacity(width * height * 4);
        for row in &rows {
            for &v in row {
                let byte = (v.clamp(0.0, 1.0) * 255.0) as u8;
                plane.extend_from_slice(&[byte, byte, byte, 255]);
            }
        }

        DecodedFrame {
            pts,
            width: width as u32,
            height: height as u32,
            sample_format: SampleFormat::Video,
            pixel_format: PixelFormat::Rgba,
            payload: FramePayload::Planar {
                planes: vec![plane],
                linesizes: vec![width * 4],
            },
        }
    }
}

impl Default for AudioTextureFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBackend for AudioTextureFilter {
    fn filter_frame(&mut self, frame: DecodedFrame) -> Result<Vec<DecodedFrame>, MediaError> {
        if frame.sample_format != SampleFormat::AudioPlanarF32 {
            return Ok(vec![]);
        }
        let FramePayload::Planar { planes, .. } = &frame.payload else {
            return Ok(vec![]);
        };
        let mut channels: [Vec<f32>; AUDIO_NBCHANNELS] = [Vec::new(), Vec::new()];
        for (ch, plane) in planes.iter().enumerate().take(AUDIO_NBCHANNELS) {
            channels[ch] = plane
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
        }
        Ok(vec![self.synthesize(&channels, frame.pts)])
    }

    fn flush(&mut self) -> Result<Vec<DecodedFrame>, MediaError> {
        Ok(Vec::new())
    }
}

/// Used for `avselect = Audio` without `audio_texture`: the decoder already
/// emits fixed-size planar f32 chunks the sink can consume as-is, so the
/// filterer stage is a no-op pass-through rather than a real graph.
pub struct PassthroughFilter;

impl FilterBackend for PassthroughFilter {
    fn filter_frame(&mut self, frame: DecodedFrame) -> Result<Vec<DecodedFrame>, MediaError> {
        Ok(vec![frame])
    }

    fn flush(&mut self) -> Result<Vec<DecodedFrame>, MediaError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autorotate_maps_known_angles() {
        assert_eq!(autorotate_filter_string(90), Some("transpose=clock".to_string()));
        assert_eq!(autorotate_filter_string(-90), Some("transpose=cclock".to_string()));
        assert_eq!(autorotate_filter_string(180), Some("vflip,hflip".to_string()));
        assert_eq!(autorotate_filter_string(0), None);
    }

    #[test]
    fn audio_texture_synthesize_produces_expected_shape() {
        let filt = AudioTextureFilter::new();
        let channels: [Vec<f32>; AUDIO_NBCHANNELS] = [
            vec![0.0; AUDIO_NBSAMPLES],
            vec![0.0; AUDIO_NBSAMPLES],
        ];
        let frame = filt.synthesize(&channels, 12345);
        assert_eq!(frame.width, (AUDIO_NBSAMPLES / 2) as u32);
        assert_eq!(frame.height, (AUDIO_NBCHANNELS * (2 + (AUDIO_NBITS - 1))) as u32);
        assert_eq!(frame.pts, 12345);
    }

    #[test]
    fn audio_texture_filter_backend_round_trips_planar_f32_frame() {
        let mut filt = AudioTextureFilter::new();
        let plane: Vec<u8> = (0..AUDIO_NBSAMPLES)
            .flat_map(|_| 0f32.to_le_bytes())
            .collect();
        let frame = DecodedFrame {
            pts: 7_000,
            width: AUDIO_NBSAMPLES as u32,
            height: AUDIO_NBCHANNELS as u32,
            sample_format: SampleFormat::AudioPlanarF32,
            pixel_format: PixelFormat::Rgba,
            payload: FramePayload::Planar {
                planes: vec![plane.clone(), plane],
                linesizes: vec![AUDIO_NBSAMPLES * 4; AUDIO_NBCHANNELS],
            },
        };
        let out = filt.filter_frame(frame).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pts, 7_000);
        assert_eq!(out[0].width, (AUDIO_NBSAMPLES / 2) as u32);
    }

    #[test]
    fn passthrough_filter_forwards_frame_unchanged() {
        let mut filt = PassthroughFilter;
        let frame = DecodedFrame {
            pts: 1,
            width: 4,
            height: 4,
            sample_format: SampleFormat::Video,
            pixel_format: PixelFormat::Rgba,
            payload: FramePayload::Planar { planes: vec![], linesizes: vec![] },
        };
        let out = filt.filter_frame(frame).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pts, 1);
    }
}
