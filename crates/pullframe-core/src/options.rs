// crates/pullframe-core/src/options.rs
//
// Pipeline configuration, field-for-field against the sxplayer_options
// AVOption table: same names where they translate cleanly, same
// defaults. avselect picks which stream type the demuxer keeps;
// everything else tunes queue depth, seek-vs-catch-up behaviour, and
// platform decode path selection.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSelect {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftwarePixelFormat {
    Bgra,
    Rgba,
    Yuv420p,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub avselect: MediaSelect,
    /// Explicit stream index to demux; `None` picks the best stream of
    /// `avselect`'s media type, same as leaving sxplayer's stream_idx at
    /// its -1 default.
    pub stream_idx: Option<usize>,
    /// Microseconds to skip at the start of the stream.
    pub skip_us: i64,
    /// Microseconds of media to expose past `skip_us`; negative means
    /// unknown/unbounded (probed lazily from the container).
    pub trim_duration_us: i64,
    /// Past this forward/backward jump, `get_frame` issues a real seek
    /// instead of sequentially decoding through the gap.
    pub dist_time_seek_trigger_us: i64,
    pub max_nb_packets: usize,
    pub max_nb_frames: usize,
    /// Sink queue depth, separate from `max_nb_frames` (the frames queue
    /// between decoder and filterer) since the two stages can drain at
    /// different rates.
    pub max_nb_sink: usize,
    pub sw_pix_fmt: SoftwarePixelFormat,
    pub autorotate: bool,
    pub auto_hwaccel: bool,
    /// Build an audio-texture frame stream instead of decoding frames
    /// as-is; see the filterer's sound-texture mode.
    pub audio_texture: bool,
    /// Export motion vectors alongside decoded frames. Not implemented
    /// end to end (no motion-vector data in `DecodedFrame` yet); kept as
    /// a real option because it still has to participate in
    /// `effective_auto_hwaccel`'s gating.
    pub export_mvs: bool,
    /// Drop every Nth non-key packet before it reaches the decoder, 0
    /// disables the skip. Used for preview-quality scrubbing.
    pub pkt_skip_mod: u32,
    /// Stack size for the demuxer/decoder/filterer worker threads. `None`
    /// uses the platform default.
    pub thread_stack_size: Option<usize>,
    /// When a packet carries no real pts, estimate one from its duration
    /// instead of falling back to 0.
    pub use_pkt_duration: bool,
    /// Upper bound on decoded pixel count passed to the auto-inserted
    /// scale filter; `None` leaves frames at their native size.
    pub max_pixels: Option<u32>,
    pub user_filters: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            avselect: MediaSelect::Video,
            stream_idx: None,
            skip_us: 0,
            trim_duration_us: -1,
            dist_time_seek_trigger_us: 1_500_000,
            max_nb_packets: 5,
            max_nb_frames: 3,
            max_nb_sink: 3,
            sw_pix_fmt: SoftwarePixelFormat::Bgra,
            autorotate: false,
            auto_hwaccel: true,
            audio_texture: false,
            export_mvs: false,
            pkt_skip_mod: 0,
            thread_stack_size: None,
            use_pkt_duration: false,
            max_pixels: None,
            user_filters: None,
        }
    }
}

/// A typed value for `PipelineOptions::set_option`. Rust has no dynamic
/// `AVOption`-style accessor, so this stands in for a single stringly-keyed
/// setter while keeping each field's type checked.
#[derive(Debug, Clone)]
pub enum OptionValue {
    Int(i64),
    UInt(u32),
    OptUInt(Option<u32>),
    OptUSize(Option<usize>),
    Bool(bool),
    PixFmt(SoftwarePixelFormat),
    Select(MediaSelect),
    Filters(Option<String>),
}

impl PipelineOptions {
    /// auto_hwaccel is incompatible with user filters, autorotate, and
    /// motion-vector export — all three need the frame to pass through a
    /// software filter graph (or, for export_mvs, direct access to the
    /// decoder's side data), and the hardware backend can't feed one
    /// directly.
    pub fn effective_auto_hwaccel(&self) -> bool {
        self.auto_hwaccel
            && self.user_filters.is_none()
            && !self.autorotate
            && !self.export_mvs
    }

    /// Single stringly-keyed entry point, one arm per field. Returns
    /// `false` if `key` is unknown or `value` is the wrong variant for it.
    pub fn set_option(&mut self, key: &str, value: OptionValue) -> bool {
        match (key, value) {
            ("avselect", OptionValue::Select(v)) => self.avselect = v,
            ("stream_idx", OptionValue::OptUSize(v)) => self.stream_idx = v,
            ("skip_us", OptionValue::Int(v)) => self.skip_us = v,
            ("trim_duration_us", OptionValue::Int(v)) => self.trim_duration_us = v,
            ("dist_time_seek_trigger_us", OptionValue::Int(v)) => {
                self.dist_time_seek_trigger_us = v
            }
            ("max_nb_packets", OptionValue::UInt(v)) => self.max_nb_packets = v as usize,
            ("max_nb_frames", OptionValue::UInt(v)) => self.max_nb_frames = v as usize,
            ("max_nb_sink", OptionValue::UInt(v)) => self.max_nb_sink = v as usize,
            ("sw_pix_fmt", OptionValue::PixFmt(v)) => self.sw_pix_fmt = v,
            ("autorotate", OptionValue::Bool(v)) => self.autorotate = v,
            ("auto_hwaccel", OptionValue::Bool(v)) => self.auto_hwaccel = v,
            ("audio_texture", OptionValue::Bool(v)) => self.audio_texture = v,
            ("export_mvs", OptionValue::Bool(v)) => self.export_mvs = v,
            ("pkt_skip_mod", OptionValue::UInt(v)) => self.pkt_skip_mod = v,
            ("thread_stack_size", OptionValue::OptUSize(v)) => self.thread_stack_size = v,
            ("use_pkt_duration", OptionValue::Bool(v)) => self.use_pkt_duration = v,
            ("max_pixels", OptionValue::OptUInt(v)) => self.max_pixels = v,
            ("user_filters", OptionValue::Filters(v)) => self.user_filters = v,
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_known_values() {
        let o = PipelineOptions::default();
        assert_eq!(o.avselect, MediaSelect::Video);
        assert_eq!(o.skip_us, 0);
        assert_eq!(o.trim_duration_us, -1);
        assert_eq!(o.dist_time_seek_trigger_us, 1_500_000);
        assert_eq!(o.max_nb_packets, 5);
        assert_eq!(o.max_nb_frames, 3);
        assert_eq!(o.max_nb_sink, 3);
        assert_eq!(o.sw_pix_fmt, SoftwarePixelFormat::Bgra);
        assert!(!o.autorotate);
        assert!(o.auto_hwaccel);
        assert_eq!(o.stream_idx, None);
        assert!(!o.export_mvs);
        assert_eq!(o.thread_stack_size, None);
        assert!(!o.use_pkt_duration);
        assert_eq!(o.max_pixels, None);
    }

    #[test]
    fn set_option_matches_field_and_variant() {
        let mut o = PipelineOptions::default();
        assert!(o.set_option("skip_us", OptionValue::Int(5_000_000)));
        assert_eq!(o.skip_us, 5_000_000);
        assert!(!o.set_option("skip_us", OptionValue::Bool(true)));
        assert!(!o.set_option("does_not_exist", OptionValue::Int(1)));

        assert!(o.set_option("max_pixels", OptionValue::OptUInt(Some(1920 * 1080))));
        assert_eq!(o.max_pixels, Some(1920 * 1080));
        assert!(o.set_option("stream_idx", OptionValue::OptUSize(Some(2))));
        assert_eq!(o.stream_idx, Some(2));
    }

    #[test]
    fn hwaccel_disabled_by_incompatible_features() {
        let mut o = PipelineOptions::default();
        assert!(o.effective_auto_hwaccel());
        o.autorotate = true;
        assert!(!o.effective_auto_hwaccel());

        let mut o = PipelineOptions::default();
        o.user_filters = Some("hflip".to_string());
        assert!(!o.effective_auto_hwaccel());

        let mut o = PipelineOptions::default();
        o.export_mvs = true;
        assert!(!o.effective_auto_hwaccel());

        // audio_texture alone no longer disables hwaccel — it isn't one
        // of the three conditions sxplayer.c gates on.
        let mut o = PipelineOptions::default();
        o.audio_texture = true;
        assert!(o.effective_auto_hwaccel());
    }
}
