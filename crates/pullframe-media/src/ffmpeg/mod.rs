// crates/pullframe-media/src/ffmpeg/mod.rs
//
// Concrete ffmpeg-the-third backends implementing the pullframe-core port
// traits. Nothing outside this module (and pipeline/) touches
// ffmpeg-the-third directly.

pub mod audio_decoder;
pub mod demuxer;
pub mod software_decoder;

#[cfg(target_os = "macos")]
pub mod videotoolbox;

pub use audio_decoder::AudioDecoder;
pub use demuxer::FfmpegDemuxer;
pub use software_decoder::SoftwareDecoder;

#[cfg(target_os = "macos")]
pub use videotoolbox::VideoToolboxDecoder;
