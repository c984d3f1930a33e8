// crates/pullframe-media/src/pipeline/control.rs
//
// The control worker: owns module lifecycle (alloc-once, start, stop)
// and serializes every START/STOP/SEEK/INFO/SYNC request against the
// pipeline so the client never has to reason about thread startup order.
// Ported from async.c's control_thread and its op_start / op_seek /
// op_stop / op_info / kill_join_reset_workers.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use pullframe_core::log::{LogCallback, LogLevel};
use pullframe_core::options::MediaSelect;
use pullframe_core::ports::{DecoderBackend, DemuxerBackend, FilterBackend};
use pullframe_core::queue::BoundedQueue;
use pullframe_core::{plog, MediaError, MediaInfo, Message, PipelineOptions, Tag};

use crate::ffmpeg::{AudioDecoder, FfmpegDemuxer, SoftwareDecoder};
use crate::filter::{AudioTextureFilter, PassthroughFilter, VideoFilter};
use crate::pipeline::filterer_worker::FilterFactory;

#[cfg(target_os = "macos")]
use crate::ffmpeg::VideoToolboxDecoder;

const QUEUE_SLACK: usize = 2;

struct Queues {
    src: Arc<BoundedQueue<Message>>,
    pkt: Arc<BoundedQueue<Message>>,
    frames: Arc<BoundedQueue<Message>>,
    sink: Arc<BoundedQueue<Message>>,
    ctl_in: Arc<BoundedQueue<Message>>,
    ctl_out: Arc<BoundedQueue<Message>>,
}

struct Threads {
    demuxer: Option<JoinHandle<()>>,
    decoder: Option<JoinHandle<()>>,
    filterer: Option<JoinHandle<()>>,
}

/// Runs entirely on the control thread; never touched from the client
/// thread directly.
pub struct ControlWorker {
    path: PathBuf,
    options: PipelineOptions,
    queues: Queues,
    threads: Threads,
    playing: bool,
    modules_initialized: bool,
    request_seek: Option<i64>,
    media_info: Option<MediaInfo>,
    demuxer_backend: Option<FfmpegDemuxer>,
    decoder_backend: Option<Box<dyn DecoderBackend>>,
    filter_factory: Option<FilterFactory>,
    log_sink: Option<LogCallback>,
}

/// Cheap, cloneable client-side reference into the running control
/// worker's queues. Implements `pullframe_core::facade::PipelineHandle`.
#[derive(Clone)]
pub struct ControlHandle {
    ctl_in: Arc<BoundedQueue<Message>>,
    ctl_out: Arc<BoundedQueue<Message>>,
    sink: Arc<BoundedQueue<Message>>,
}

impl ControlWorker {
    pub fn spawn(path: PathBuf, options: PipelineOptions) -> (ControlHandle, JoinHandle<()>) {
        Self::spawn_with_log(path, options, None)
    }

    pub fn spawn_with_log(
        path: PathBuf,
        options: PipelineOptions,
        log_sink: Option<LogCallback>,
    ) -> (ControlHandle, JoinHandle<()>) {
        let depth_pkt = options.max_nb_packets + QUEUE_SLACK;
        let depth_frames = options.max_nb_frames + QUEUE_SLACK;
        let depth_sink = options.max_nb_sink + QUEUE_SLACK;

        let queues = Queues {
            src: Arc::new(BoundedQueue::new(4)),
            pkt: Arc::new(BoundedQueue::new(depth_pkt)),
            frames: Arc::new(BoundedQueue::new(depth_frames)),
            sink: Arc::new(BoundedQueue::new(depth_sink)),
            ctl_in: Arc::new(BoundedQueue::new(4)),
            ctl_out: Arc::new(BoundedQueue::new(4)),
        };

        let handle = ControlHandle {
            ctl_in: Arc::clone(&queues.ctl_in),
            ctl_out: Arc::clone(&queues.ctl_out),
            sink: Arc::clone(&queues.sink),
        };

        let mut worker = ControlWorker {
            path,
            options,
            queues,
            threads: Threads {
                demuxer: None,
                decoder: None,
                filterer: None,
            },
            playing: false,
            modules_initialized: false,
            request_seek: None,
            media_info: None,
            demuxer_backend: None,
            decoder_backend: None,
            filter_factory: None,
            log_sink,
        };

        let join = std::thread::spawn(move || worker.run());
        (handle, join)
    }

    fn run(&mut self) {
        loop {
            let msg = match self.queues.ctl_in.recv() {
                Ok(m) => m,
                Err(_) => break,
            };
            match msg {
                Message::Seek(ts) => self.op_seek(ts),
                Message::Start => {
                    if !self.playing {
                        self.op_start();
                    }
                }
                Message::Stop => {
                    if self.playing {
                        self.op_stop();
                    }
                }
                Message::Info => {
                    self.op_info();
                    if self.queues.ctl_out.send(Message::Info(self.media_info)).is_err() {
                        break;
                    }
                }
                Message::Sync => {
                    if self.queues.ctl_out.send(Message::Sync).is_err() {
                        break;
                    }
                }
                Message::Frame(_) | Message::Packet(_) => {}
            }
        }
        self.op_stop();
        self.queues.ctl_in.set_err(MediaError::Exit);
        self.queues.ctl_out.set_err(MediaError::Exit);
    }

    fn init_modules_once(&mut self) -> Result<(), MediaError> {
        if self.modules_initialized {
            return Ok(());
        }

        let mut demuxer = FfmpegDemuxer::open(
            &self.path,
            self.options.avselect,
            self.options.stream_idx,
            self.options.use_pkt_duration,
        )
        .map_err(|e| {
            plog!(
                self.log_sink.as_ref(),
                LogLevel::Error,
                "failed to open {}: {e}",
                self.path.display()
            );
            e
        })?;
        let info = demuxer.probe_info()?;
        self.media_info = Some(info);

        let params = demuxer.codec_parameters();
        let time_base = demuxer.time_base();

        let (decoder, filter_factory): (Box<dyn DecoderBackend>, FilterFactory) =
            match self.options.avselect {
                MediaSelect::Video => {
                    let want_hw = self.options.effective_auto_hwaccel();
                    let decoder =
                        open_decoder(params, time_base, self.options.sw_pix_fmt, want_hw)?;

                    let autorotate_degrees = if self.options.autorotate {
                        demuxer.probe_rotation().round() as i32
                    } else {
                        0
                    };
                    let max_pixels = self.options.max_pixels;
                    let user_filters = self.options.user_filters.clone();

                    let factory: FilterFactory = Box::new(move |frame| {
                        let filter = VideoFilter::new(
                            frame.width,
                            frame.height,
                            frame.pixel_format,
                            time_base,
                            max_pixels,
                            user_filters.as_deref(),
                            autorotate_degrees,
                        )?;
                        Ok(Box::new(filter))
                    });
                    (decoder, factory)
                }
                MediaSelect::Audio => {
                    let decoder: Box<dyn DecoderBackend> =
                        Box::new(AudioDecoder::open(params, time_base)?);
                    let audio_texture = self.options.audio_texture;
                    let factory: FilterFactory = Box::new(move |_frame| {
                        let filter: Box<dyn FilterBackend> = if audio_texture {
                            Box::new(AudioTextureFilter::new())
                        } else {
                            Box::new(PassthroughFilter)
                        };
                        Ok(filter)
                    });
                    (decoder, factory)
                }
            };
        plog!(
            self.log_sink.as_ref(),
            LogLevel::Info,
            "decoder backend: {}",
            decoder.name()
        );

        self.demuxer_backend = Some(demuxer);
        self.decoder_backend = Some(decoder);
        self.filter_factory = Some(filter_factory);
        self.modules_initialized = true;
        Ok(())
    }

    /// `None` means unbounded — mirrors mod_filtering.c's max_pts, which
    /// is only set once trim_duration is known to be finite.
    fn max_pts(&self) -> Option<i64> {
        if self.options.trim_duration_us < 0 {
            None
        } else {
            Some(self.options.skip_us + self.options.trim_duration_us)
        }
    }

    fn op_start(&mut self) {
        if self.init_modules_once().is_err() {
            return;
        }
        let wants_seek = self.request_seek.is_some() || self.options.skip_us != 0;
        let seek_to = self.request_seek.take().unwrap_or(self.options.skip_us);

        if wants_seek && self.queues.src.send(Message::Seek(seek_to)).is_err() {
            return;
        }

        let demuxer = self.demuxer_backend.take().unwrap();
        let decoder = self.decoder_backend.take().unwrap();
        let filter_factory = self.filter_factory.take().unwrap();
        let max_pts = self.max_pts();
        let pkt_skip_mod = self.options.pkt_skip_mod;
        let stack_size = self.options.thread_stack_size;

        let src = Arc::clone(&self.queues.src);
        let pkt = Arc::clone(&self.queues.pkt);
        self.threads.demuxer = Some(spawn_worker(stack_size, move || {
            crate::pipeline::demuxer_worker::run(Box::new(demuxer), pkt_skip_mod, src, pkt);
        }));

        let pkt = Arc::clone(&self.queues.pkt);
        let frames = Arc::clone(&self.queues.frames);
        self.threads.decoder = Some(spawn_worker(stack_size, move || {
            crate::pipeline::decoder_worker::run(decoder, pkt, frames);
        }));

        let frames = Arc::clone(&self.queues.frames);
        let sink = Arc::clone(&self.queues.sink);
        self.threads.filterer = Some(spawn_worker(stack_size, move || {
            crate::pipeline::filterer_worker::run(filter_factory, max_pts, frames, sink);
        }));

        self.playing = true;

        if !wants_seek {
            return;
        }

        // Block until the seek marker we injected has propagated all the
        // way through, so the caller never observes a frame decoded
        // before the requested start position.
        loop {
            match self.queues.sink.recv() {
                Ok(Message::Seek(_)) => break,
                Ok(_) => continue,
                Err(_) => {
                    self.kill_join_reset_workers();
                    self.modules_initialized = false;
                    self.op_start();
                    break;
                }
            }
        }
    }

    fn op_seek(&mut self, ts: i64) {
        if self.init_modules_once().is_err() {
            return;
        }
        match self.media_info {
            Some(info) if info.duration_us > 0 => {}
            _ => return,
        }

        self.request_seek = Some(ts);
        if !self.playing {
            return;
        }

        if self.queues.src.send(Message::Seek(ts)).is_err() {
            self.kill_join_reset_workers();
            self.modules_initialized = false;
            self.op_start();
            return;
        }

        loop {
            match self.queues.sink.recv() {
                Ok(Message::Seek(_)) => break,
                Ok(_) => continue,
                Err(_) => {
                    self.kill_join_reset_workers();
                    self.modules_initialized = false;
                    self.op_start();
                    break;
                }
            }
        }
    }

    fn op_stop(&mut self) {
        if !self.modules_initialized {
            return;
        }
        plog!(self.log_sink.as_ref(), LogLevel::Trace, "stopping pipeline");
        self.kill_join_reset_workers();
        self.demuxer_backend = None;
        self.decoder_backend = None;
        self.filter_factory = None;
        self.modules_initialized = false;
        self.playing = false;
        self.request_seek = None;
    }

    fn op_info(&mut self) {
        let _ = self.init_modules_once();
    }

    fn kill_join_reset_workers(&mut self) {
        self.queues.src.set_err(MediaError::Exit);
        self.queues.pkt.set_err(MediaError::Exit);
        self.queues.frames.set_err(MediaError::Exit);
        self.queues.sink.set_err(MediaError::Exit);
        self.queues.src.flush();
        self.queues.pkt.flush();
        self.queues.frames.flush();
        self.queues.sink.flush();

        if let Some(h) = self.threads.filterer.take() {
            let _ = h.join();
        }
        if let Some(h) = self.threads.decoder.take() {
            let _ = h.join();
        }
        if let Some(h) = self.threads.demuxer.take() {
            let _ = h.join();
        }

        self.queues.src.reset();
        self.queues.pkt.reset();
        self.queues.frames.reset();
        self.queues.sink.reset();
        self.playing = false;
    }
}

/// `std::thread::spawn` when no custom stack size was requested, a
/// `Builder` with it set otherwise.
fn spawn_worker<F>(stack_size: Option<usize>, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    match stack_size {
        Some(size) => std::thread::Builder::new()
            .stack_size(size)
            .spawn(f)
            .expect("spawn pipeline worker thread"),
        None => std::thread::spawn(f),
    }
}

fn open_decoder(
    params: ffmpeg_the_third::codec::parameters::Parameters,
    time_base: (i32, i32),
    sw_pix_fmt: pullframe_core::options::SoftwarePixelFormat,
    want_hw: bool,
) -> Result<Box<dyn DecoderBackend>, MediaError> {
    #[cfg(target_os = "macos")]
    if want_hw {
        match VideoToolboxDecoder::open(params.clone(), time_base, sw_pix_fmt) {
            Ok(d) => return Ok(Box::new(d)),
            Err(_) => {
                // Single fallback level: drop to software and keep going.
            }
        }
    }
    #[cfg(not(target_os = "macos"))]
    let _ = want_hw;

    let d = SoftwareDecoder::open(params, time_base, sw_pix_fmt)?;
    Ok(Box::new(d))
}

impl pullframe_core::facade::PipelineHandle for ControlHandle {
    fn start(&mut self) {
        let _ = self.ctl_in.send(Message::Start);
    }

    fn seek(&mut self, ts: i64) {
        let _ = self.ctl_in.send(Message::Seek(ts));
    }

    fn pop_frame(&mut self) -> Option<pullframe_core::DecodedFrame> {
        loop {
            match self.sink.recv() {
                Ok(Message::Frame(f)) => return Some(f),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl ControlHandle {
    pub fn stop(&mut self) {
        let _ = self.ctl_in.send(Message::Stop);
    }

    /// `send_wait_ctl` pattern: send a request, then drain ctl_out
    /// discarding anything not tagged the way we expect, until the
    /// matching reply arrives.
    fn send_wait_ctl(&self, request: Message, want: Tag) -> Option<Message> {
        self.ctl_in.send(request).ok()?;
        loop {
            match self.ctl_out.recv() {
                Ok(m) if m.tag() == want => return Some(m),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn info(&self) -> Option<MediaInfo> {
        match self.send_wait_ctl(Message::Info, Tag::Info)? {
            Message::Info(info) => info,
            _ => None,
        }
    }

    pub fn sync(&self) {
        let _ = self.send_wait_ctl(Message::Sync, Tag::Sync);
    }
}
