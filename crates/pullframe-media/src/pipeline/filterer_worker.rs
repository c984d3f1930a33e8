// crates/pullframe-media/src/pipeline/filterer_worker.rs
//
// Reads decoded frames, runs them through the filter backend, and
// forwards whatever comes out to sink_queue. A seek message flushes the
// outgoing queue (stale filtered frames from before the seek shouldn't
// surface) and tears down the filter so it gets rebuilt against whatever
// format the post-seek frames arrive in. Ported from sxpi_filtering_run.

use std::sync::Arc;

use pullframe_core::ports::FilterBackend;
use pullframe_core::queue::BoundedQueue;
use pullframe_core::{DecodedFrame, MediaError, Message, PixelFormat};

/// Builds the concrete filter backend from the first frame it will see —
/// lets video filtering pick up the real pixel format/dimensions instead
/// of a guess made at module-init time, and lets the worker rebuild it
/// from scratch whenever that format changes (e.g. a seek lands on a
/// differently-encoded segment of the same stream).
pub type FilterFactory =
    Box<dyn Fn(&DecodedFrame) -> Result<Box<dyn FilterBackend>, MediaError> + Send>;

pub fn run(
    make_filter: FilterFactory,
    max_pts: Option<i64>,
    frames_queue: Arc<BoundedQueue<Message>>,
    sink_queue: Arc<BoundedQueue<Message>>,
) {
    let mut filter: Option<Box<dyn FilterBackend>> = None;
    let mut last_pixel_format: Option<PixelFormat> = None;
    let mut trimmed = false;

    let final_err = 'outer: loop {
        let msg = match frames_queue.recv() {
            Ok(m) => m,
            Err(e) => break 'outer e,
        };

        match msg {
            Message::Seek(ts) => {
                filter = None;
                last_pixel_format = None;
                sink_queue.flush();
                if sink_queue.send(Message::Seek(ts)).is_err() {
                    break 'outer MediaError::Exit;
                }
            }
            Message::Frame(frame) => {
                if frame.pts < 0 {
                    continue;
                }
                if let Some(mp) = max_pts {
                    if frame.pts >= mp {
                        trimmed = true;
                        break 'outer MediaError::Exit;
                    }
                }

                if last_pixel_format != Some(frame.pixel_format) {
                    filter = match make_filter(&frame) {
                        Ok(f) => Some(f),
                        Err(_) => break 'outer MediaError::Exit,
                    };
                    last_pixel_format = Some(frame.pixel_format);
                }

                match filter.as_mut().unwrap().filter_frame(frame) {
                    Ok(out) => {
                        if forward_all(out, &sink_queue).is_err() {
                            break 'outer MediaError::Exit;
                        }
                    }
                    Err(_) => continue,
                }
            }
            _ => {}
        }
    };

    if !trimmed && final_err == MediaError::Eos {
        if let Some(f) = filter.as_mut() {
            if let Ok(out) = f.flush() {
                let _ = forward_all(out, &sink_queue);
            }
        }
    }

    // A trim stop isn't a real end of stream for the input side — the
    // demuxer/decoder still have more to give, we just chose to ignore
    // it — but the sink has seen everything it's going to see, so it
    // gets EOS while upstream gets EXIT.
    frames_queue.set_err_send(final_err);
    sink_queue.set_err_recv(if trimmed { MediaError::Eos } else { final_err });
}

fn forward_all(
    frames: Vec<pullframe_core::DecodedFrame>,
    sink_queue: &Arc<BoundedQueue<Message>>,
) -> Result<(), MediaError> {
    for frame in frames {
        sink_queue.send(Message::Frame(frame))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pullframe_core::frame::{FramePayload, SampleFormat};

    fn frame(pts: i64, pixel_format: PixelFormat) -> DecodedFrame {
        DecodedFrame {
            pts,
            width: 4,
            height: 4,
            sample_format: SampleFormat::Video,
            pixel_format,
            payload: FramePayload::Planar {
                planes: vec![],
                linesizes: vec![],
            },
        }
    }

    /// Passes every frame through unchanged; records how many times it was
    /// (re)built so tests can assert on rebuild-on-format-change behaviour.
    struct PassthroughFilter;

    impl FilterBackend for PassthroughFilter {
        fn filter_frame(&mut self, frame: DecodedFrame) -> Result<Vec<DecodedFrame>, MediaError> {
            Ok(vec![frame])
        }
        fn flush(&mut self) -> Result<Vec<DecodedFrame>, MediaError> {
            Ok(vec![])
        }
    }

    fn counting_factory(build_count: &'static AtomicUsize) -> FilterFactory {
        Box::new(move |_frame| {
            build_count.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(PassthroughFilter) as Box<dyn FilterBackend>)
        })
    }

    #[test]
    fn negative_pts_frames_are_dropped() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        let frames: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        let sink: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));

        frames.send(Message::Frame(frame(-1, PixelFormat::Rgba))).unwrap();
        frames.send(Message::Frame(frame(10, PixelFormat::Rgba))).unwrap();
        frames.set_err_send(MediaError::Eos);

        run(counting_factory(&BUILDS), None, frames, Arc::clone(&sink));

        assert_eq!(sink.recv().unwrap().as_frame().unwrap().pts, 10);
        assert_eq!(sink.recv().unwrap_err(), MediaError::Eos);
        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reaching_max_pts_splits_exit_upstream_from_eos_downstream() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        let frames: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        let sink: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));

        frames.send(Message::Frame(frame(0, PixelFormat::Rgba))).unwrap();
        frames.send(Message::Frame(frame(5_000_000, PixelFormat::Rgba))).unwrap();
        frames.set_err_send(MediaError::Eos);

        run(counting_factory(&BUILDS), Some(5_000_000), frames, Arc::clone(&sink));

        assert_eq!(sink.recv().unwrap().as_frame().unwrap().pts, 0);
        // The trimmed tail never reached flush, and the sink sees a clean
        // EOS even though upstream would have kept going (Exit).
        assert_eq!(sink.recv().unwrap_err(), MediaError::Eos);
    }

    #[test]
    fn filter_is_rebuilt_when_pixel_format_changes() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        let frames: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        let sink: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));

        frames.send(Message::Frame(frame(0, PixelFormat::Rgba))).unwrap();
        frames.send(Message::Frame(frame(1, PixelFormat::Rgba))).unwrap();
        frames.send(Message::Frame(frame(2, PixelFormat::Nv12))).unwrap();
        frames.set_err_send(MediaError::Eos);

        run(counting_factory(&BUILDS), None, frames, sink);

        assert_eq!(BUILDS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn seek_flushes_sink_and_forces_filter_rebuild() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        let frames: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        let sink: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));

        frames.send(Message::Frame(frame(0, PixelFormat::Rgba))).unwrap();
        frames.send(Message::Seek(0)).unwrap();
        frames.send(Message::Frame(frame(0, PixelFormat::Rgba))).unwrap();
        frames.set_err_send(MediaError::Eos);

        run(counting_factory(&BUILDS), None, frames, sink);

        assert_eq!(BUILDS.load(Ordering::SeqCst), 2);
    }
}
