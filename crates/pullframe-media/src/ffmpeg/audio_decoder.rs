// crates/pullframe-media/src/ffmpeg/audio_decoder.rs
//
// Software audio decode, resampled to stereo planar f32 and rechunked to
// fixed AUDIO_NBSAMPLES-sample frames so the filterer's audio-texture stage
// always sees a full window. Resampler is built lazily on the first frame,
// once the real input format is known.

use std::collections::VecDeque;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::context::Context as CodecContext;
use ffmpeg::codec::packet::Packet as AvPacket;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::format::Sample;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::frame::audio::Audio as AudioFrame;

use pullframe_core::ports::DecoderBackend;
use pullframe_core::{DecodedFrame, FramePayload, MediaError, Packet, PixelFormat, SampleFormat};

use crate::filter::{AUDIO_NBCHANNELS, AUDIO_NBSAMPLES};

const SAMPLE_RATE: u32 = 44_100;

pub struct AudioDecoder {
    decoder: ffmpeg::decoder::audio::Audio,
    resampler: Option<resampling::Context>,
    tb_num: i32,
    tb_den: i32,
    acc: [Vec<f32>; AUDIO_NBCHANNELS],
    acc_pts_us: Option<i64>,
    ready: VecDeque<DecodedFrame>,
}

impl AudioDecoder {
    pub fn open(
        params: ffmpeg::codec::parameters::Parameters,
        time_base: (i32, i32),
    ) -> Result<Self, MediaError> {
        let ctx =
            CodecContext::from_parameters(params).map_err(|_| MediaError::DecoderNotFound)?;
        let decoder = ctx.decoder().audio().map_err(|_| MediaError::DecoderNotFound)?;
        Ok(AudioDecoder {
            decoder,
            resampler: None,
            tb_num: time_base.0,
            tb_den: time_base.1,
            acc: [Vec::new(), Vec::new()],
            acc_pts_us: None,
            ready: VecDeque::new(),
        })
    }

    fn rescale_to_us(&self, pts: i64) -> i64 {
        pts * 1_000_000 * self.tb_num as i64 / self.tb_den.max(1) as i64
    }

    fn us_to_stream_ts(&self, us: i64) -> i64 {
        us * self.tb_den as i64 / (1_000_000 * self.tb_num.max(1) as i64)
    }

    fn target_format() -> Sample {
        Sample::F32(SampleType::Planar)
    }

    fn push_raw(&mut self, raw: &AudioFrame) -> Result<(), MediaError> {
        let target_fmt = Self::target_format();
        let needs_resample =
            raw.format() != target_fmt || raw.rate() != SAMPLE_RATE || raw.ch_layout().channels() != 2;

        let pts_us = raw.pts().map(|p| self.rescale_to_us(p)).unwrap_or(0);

        let resampled;
        let frame = if needs_resample {
            let rs = self.resampler.get_or_insert_with(|| {
                let src_layout = if raw.ch_layout().channels() >= 2 {
                    raw.ch_layout()
                } else {
                    ChannelLayout::MONO
                };
                resampling::Context::get2(
                    raw.format(),
                    src_layout,
                    raw.rate(),
                    target_fmt,
                    ChannelLayout::STEREO,
                    SAMPLE_RATE,
                )
                .expect("create audio resampler")
            });
            let mut out = AudioFrame::empty();
            rs.run(raw, &mut out).map_err(|_| MediaError::Generic)?;
            resampled = out;
            &resampled
        } else {
            raw
        };

        if frame.samples() == 0 {
            return Ok(());
        }

        if self.acc[0].is_empty() {
            self.acc_pts_us = Some(pts_us);
        }
        for ch in 0..AUDIO_NBCHANNELS {
            let data = frame.data(ch);
            let want_bytes = frame.samples() * std::mem::size_of::<f32>();
            let samples = data[..want_bytes.min(data.len())]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            self.acc[ch].extend(samples);
        }

        while self.acc[0].len() >= AUDIO_NBSAMPLES {
            let pts = self.acc_pts_us.unwrap_or(0);
            let mut planes = Vec::with_capacity(AUDIO_NBCHANNELS);
            for ch in 0..AUDIO_NBCHANNELS {
                let chunk: Vec<f32> = self.acc[ch].drain(0..AUDIO_NBSAMPLES).collect();
                let bytes: Vec<u8> = chunk.iter().flat_map(|s| s.to_le_bytes()).collect();
                planes.push(bytes);
            }
            self.ready.push_back(DecodedFrame {
                pts,
                width: AUDIO_NBSAMPLES as u32,
                height: AUDIO_NBCHANNELS as u32,
                sample_format: SampleFormat::AudioPlanarF32,
                pixel_format: PixelFormat::Rgba,
                payload: FramePayload::Planar {
                    planes,
                    linesizes: vec![AUDIO_NBSAMPLES * 4; AUDIO_NBCHANNELS],
                },
            });
            self.acc_pts_us =
                Some(pts + (AUDIO_NBSAMPLES as i64 * 1_000_000) / SAMPLE_RATE as i64);
        }

        Ok(())
    }
}

impl DecoderBackend for AudioDecoder {
    fn send_packet(&mut self, pkt: &Packet) -> Result<(), MediaError> {
        let mut avpkt = AvPacket::copy(&pkt.data);
        let ts = self.us_to_stream_ts(pkt.pts);
        avpkt.set_pts(Some(ts));
        avpkt.set_dts(Some(ts));
        self.decoder
            .send_packet(&avpkt)
            .map_err(|_| MediaError::InvalidData)?;

        let mut raw = AudioFrame::empty();
        while self.decoder.receive_frame(&mut raw).is_ok() {
            self.push_raw(&raw)?;
            raw = AudioFrame::empty();
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedFrame>, MediaError> {
        Ok(self.ready.pop_front())
    }

    fn send_eof(&mut self) -> Result<(), MediaError> {
        let _ = self.decoder.send_eof();
        let mut raw = AudioFrame::empty();
        while self.decoder.receive_frame(&mut raw).is_ok() {
            self.push_raw(&raw)?;
            raw = AudioFrame::empty();
        }
        Ok(())
    }

    fn flush(&mut self) {
        self.decoder.flush();
        self.acc = [Vec::new(), Vec::new()];
        self.acc_pts_us = None;
        self.ready.clear();
    }

    fn name(&self) -> &str {
        "software:audio"
    }
}
