// crates/pullframe-core/src/ports.rs
//
// Trait seams each pipeline stage's backend must implement. pullframe-core
// never depends on ffmpeg-the-third directly — these traits are the only
// contract between the policy code here and the concrete decode/demux/
// filter implementations in pullframe-media, mirroring decoding_init's
// backend-selection-with-fallback shape without hardcoding any backend.

use crate::error::MediaError;
use crate::frame::DecodedFrame;
use crate::info::MediaInfo;
use crate::packet::Packet;

pub trait DemuxerBackend: Send {
    fn probe_info(&mut self) -> Result<MediaInfo, MediaError>;
    /// Seek the underlying container to `ts` (global microsecond time
    /// base), landing on or before `ts`.
    fn seek(&mut self, ts: i64) -> Result<(), MediaError>;
    /// Pull the next packet of the selected stream, or `Err(Eos)` once
    /// the container is exhausted.
    fn read_packet(&mut self) -> Result<Packet, MediaError>;
}

pub trait DecoderBackend: Send {
    /// Feed one packet; zero or more frames may become available via
    /// `receive_frame` afterwards (B-frame reordering).
    fn send_packet(&mut self, pkt: &Packet) -> Result<(), MediaError>;
    fn receive_frame(&mut self) -> Result<Option<DecodedFrame>, MediaError>;
    /// Signal end of stream so any frames held back for B-frame
    /// reordering surface through `receive_frame`.
    fn send_eof(&mut self) -> Result<(), MediaError> {
        Ok(())
    }
    /// Called repeatedly after `send_eof` once `receive_frame` itself
    /// stops yielding anything, to release frames a backend is still
    /// holding purely for out-of-order reordering (not decode pipelining).
    /// Default: nothing further to give up.
    fn drain_reordered(&mut self) -> Option<DecodedFrame> {
        None
    }
    /// Flush buffered frames on seek/EOF without tearing down the
    /// decoder instance.
    fn flush(&mut self);
    /// A one-line identifier for logs ("videotoolbox", "software:h264").
    fn name(&self) -> &str;
}

pub trait FilterBackend: Send {
    fn filter_frame(&mut self, frame: DecodedFrame) -> Result<Vec<DecodedFrame>, MediaError>;
    fn flush(&mut self) -> Result<Vec<DecodedFrame>, MediaError>;
}
