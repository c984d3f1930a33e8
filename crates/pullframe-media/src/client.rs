// crates/pullframe-media/src/client.rs
//
// Top-level entry point: owns a running control worker and wraps it in
// the policy layer from pullframe-core, so a caller only ever deals with
// "open a path, ask for a frame at time t". Ported from the public
// sxplayer_create / sxplayer_get_frame / sxplayer_get_duration /
// sxplayer_free surface.

use std::path::Path;

use pullframe_core::facade::ClientFacade;
use pullframe_core::log::LogCallback;
use pullframe_core::{DecodedFrame, MediaInfo, PipelineOptions};

use crate::pipeline::control::{ControlHandle, ControlWorker};

pub struct MediaProvider {
    facade: ClientFacade<ControlHandle>,
    handle: ControlHandle,
}

impl MediaProvider {
    pub fn open(path: &Path, options: PipelineOptions) -> Self {
        Self::open_with_log(path, options, None)
    }

    pub fn open_with_log(
        path: &Path,
        options: PipelineOptions,
        log_sink: Option<LogCallback>,
    ) -> Self {
        let skip_us = options.skip_us;
        let trim_duration_us = options.trim_duration_us;
        let dist_time_seek_trigger_us = options.dist_time_seek_trigger_us;

        let (handle, _join) = ControlWorker::spawn_with_log(path.to_path_buf(), options, log_sink);
        let facade = ClientFacade::new(
            handle.clone(),
            skip_us,
            trim_duration_us,
            dist_time_seek_trigger_us,
        );
        MediaProvider { facade, handle }
    }

    /// `t` is microseconds since the caller's own clock start. Negative
    /// prefetches without blocking for a frame.
    pub fn get_frame(&mut self, t: i64) -> Option<DecodedFrame> {
        self.facade.get_frame(t)
    }

    pub fn get_next_frame(&mut self) -> Option<DecodedFrame> {
        self.facade.get_next_frame()
    }

    pub fn info(&self) -> Option<MediaInfo> {
        self.handle.info()
    }
}

impl Drop for MediaProvider {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_a_missing_file_yields_no_info_and_no_frame() {
        let mut provider = MediaProvider::open(
            Path::new("/nonexistent/path/does-not-exist.mp4"),
            PipelineOptions::default(),
        );
        assert!(provider.info().is_none());
        assert!(provider.get_frame(0).is_none());
    }
}
