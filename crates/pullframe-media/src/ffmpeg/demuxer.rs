// crates/pullframe-media/src/ffmpeg/demuxer.rs
//
// Opens a container with ffmpeg-the-third, keeps the stream matching
// PipelineOptions::avselect, and exposes it through DemuxerBackend.
// Packets on any other stream are silently dropped — the original skips
// them at read time rather than disabling them at the demuxer level, and
// we do the same to avoid fighting ffmpeg-the-third's discard API.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::context::Input;
use ffmpeg::format::input;
use ffmpeg::media::Type as MediaType;

use pullframe_core::options::MediaSelect;
use pullframe_core::ports::DemuxerBackend;
use pullframe_core::{MediaError, MediaInfo, Packet};

pub struct FfmpegDemuxer {
    #[allow(dead_code)]
    path: PathBuf,
    ictx: Input,
    stream_index: usize,
    tb_num: i32,
    tb_den: i32,
    use_pkt_duration: bool,
    last_pts_us: Option<i64>,
}

impl FfmpegDemuxer {
    pub fn open(
        path: &Path,
        avselect: MediaSelect,
        stream_idx: Option<usize>,
        use_pkt_duration: bool,
    ) -> Result<Self, MediaError> {
        let ictx = input(path).map_err(|_| MediaError::Internal("failed to open input"))?;
        let media_type = match avselect {
            MediaSelect::Video => MediaType::Video,
            MediaSelect::Audio => MediaType::Audio,
        };
        let (stream_index, tb_num, tb_den) = {
            let stream = match stream_idx {
                Some(idx) => ictx.stream(idx).ok_or(MediaError::DecoderNotFound)?,
                None => ictx
                    .streams()
                    .best(media_type)
                    .ok_or(MediaError::DecoderNotFound)?,
            };
            let tb = stream.time_base();
            (stream.index(), tb.numerator(), tb.denominator())
        };
        Ok(FfmpegDemuxer {
            path: path.to_path_buf(),
            ictx,
            stream_index,
            tb_num,
            tb_den,
            use_pkt_duration,
            last_pts_us: None,
        })
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn codec_parameters(&self) -> ffmpeg::codec::parameters::Parameters {
        self.ictx.stream(self.stream_index).unwrap().parameters()
    }

    pub fn time_base(&self) -> (i32, i32) {
        (self.tb_num, self.tb_den)
    }

    /// Reads the `rotate` stream metadata tag (degrees, normalized into
    /// (-180, 180]); 0 if absent or unparsable. Doesn't chase the
    /// AV_PKT_DATA_DISPLAYMATRIX side-data fallback sxpi_demuxing_probe_rotation
    /// also checks — that needs unsafe access to raw side-data buffers we
    /// don't otherwise touch.
    pub fn probe_rotation(&self) -> f64 {
        let stream = match self.ictx.stream(self.stream_index) {
            Some(s) => s,
            None => return 0.0,
        };
        let theta: f64 = stream
            .metadata()
            .get("rotate")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);
        normalize_rotation_degrees(theta)
    }

    fn rescale_to_us(&self, pts: i64) -> i64 {
        pts * 1_000_000 * self.tb_num as i64 / self.tb_den.max(1) as i64
    }

    fn us_to_stream_ts(&self, us: i64) -> i64 {
        us * self.tb_den as i64 / (1_000_000 * self.tb_num.max(1) as i64)
    }

    /// Container name contains "image2" or ends in a pipe demuxer name —
    /// the marker for a single-frame source with no real duration.
    fn detect_is_image(&self) -> bool {
        let name = self.ictx.format().name();
        name.contains("image2") || name.contains("_pipe")
    }
}

/// Normalizes an arbitrary rotation angle into `(-180, 180]`, matching
/// sxpi_demuxing_probe_rotation's `theta -= 360*floor(theta/360 + 0.9/360)`.
fn normalize_rotation_degrees(theta: f64) -> f64 {
    theta - 360.0 * ((theta / 360.0 + 0.9 / 360.0).floor())
}

impl DemuxerBackend for FfmpegDemuxer {
    fn probe_info(&mut self) -> Result<MediaInfo, MediaError> {
        let is_image = self.detect_is_image();

        let mut duration_us = self.ictx.duration();
        if duration_us <= 0 {
            let stream = self.ictx.stream(self.stream_index).unwrap();
            let tb = stream.time_base();
            let d = stream.duration();
            duration_us = if d > 0 {
                d * 1_000_000 * tb.numerator() as i64 / tb.denominator().max(1) as i64
            } else {
                0
            };
        }

        let (width, height) = unsafe {
            let stream = self.ictx.stream(self.stream_index).unwrap();
            let p = stream.parameters().as_ptr();
            ((*p).width.max(0) as u32, (*p).height.max(0) as u32)
        };

        Ok(MediaInfo {
            width,
            height,
            duration_us,
            is_image,
            timebase: (self.tb_num, self.tb_den),
        })
    }

    fn seek(&mut self, ts: i64) -> Result<(), MediaError> {
        let target = self.us_to_stream_ts(ts);
        self.ictx
            .seek(target, ..=target)
            .map_err(|_| MediaError::Generic)?;
        self.last_pts_us = None;
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Packet, MediaError> {
        loop {
            match self.ictx.packets().next() {
                Some((stream, pkt)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    let duration_us = self.rescale_to_us(pkt.duration().max(0));
                    let pts_us = match pkt.pts().or_else(|| pkt.dts()) {
                        Some(pts) => self.rescale_to_us(pts),
                        None if self.use_pkt_duration => {
                            self.last_pts_us.unwrap_or(0) + duration_us
                        }
                        None => 0,
                    };
                    self.last_pts_us = Some(pts_us);
                    let data = pkt.data().map(|d| d.to_vec()).unwrap_or_default();
                    return Ok(Packet {
                        data,
                        pts: pts_us,
                        duration: duration_us,
                        is_key: pkt.is_key(),
                        stream_index: self.stream_index,
                    });
                }
                None => return Err(MediaError::Eos),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rotation_passes_small_angles_through() {
        assert_eq!(normalize_rotation_degrees(0.0), 0.0);
        assert_eq!(normalize_rotation_degrees(90.0), 90.0);
        assert_eq!(normalize_rotation_degrees(-90.0), -90.0);
    }

    #[test]
    fn normalize_rotation_wraps_full_turns_into_range() {
        assert_eq!(normalize_rotation_degrees(360.0), 0.0);
        assert_eq!(normalize_rotation_degrees(270.0), -90.0);
        assert_eq!(normalize_rotation_degrees(-270.0), 90.0);
        assert_eq!(normalize_rotation_degrees(720.0 + 45.0), 45.0);
    }
}
