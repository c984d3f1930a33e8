// crates/pullframe-media/src/pipeline/decoder_worker.rs
//
// Drains pkt_queue through the decoder backend into frames_queue.
// Ported from decoding_run / decoding_queue_frame: a SEEK message flushes
// the decoder and the downstream frames_queue, then arms a refinement
// window — frames decoded with a timestamp before the seek target are
// cached (only the most recent survives, replacing any earlier one);
// once a frame at or after the target appears, the cached frame (if any)
// is forwarded first, unmodified, then the current frame follows; if no
// frame was ever cached, the current frame's pts is snapped exactly to
// the seek target instead, so the client sees exactly the time it asked
// for on the first post-seek frame.

use std::sync::Arc;

use pullframe_core::ports::DecoderBackend;
use pullframe_core::queue::BoundedQueue;
use pullframe_core::{DecodedFrame, MediaError, Message};

pub fn run(
    mut decoder: Box<dyn DecoderBackend>,
    pkt_queue: Arc<BoundedQueue<Message>>,
    frames_queue: Arc<BoundedQueue<Message>>,
) {
    let mut seek_request: Option<i64> = None;
    let mut cached_frame: Option<DecodedFrame> = None;

    let final_err = loop {
        let msg = match pkt_queue.recv() {
            Ok(m) => m,
            Err(e) => break e,
        };

        match msg {
            Message::Seek(ts) => {
                decoder.flush();
                frames_queue.flush();
                seek_request = Some(ts);
                cached_frame = None;
                if frames_queue.send(Message::Seek(ts)).is_err() {
                    break MediaError::Exit;
                }
            }
            Message::Packet(pkt) => {
                if decoder.send_packet(&pkt).is_err() {
                    continue;
                }
                if let Err(e) =
                    drain_decoded(&mut *decoder, &mut seek_request, &mut cached_frame, &frames_queue)
                {
                    break e;
                }
            }
            _ => {}
        }
    };

    if final_err == MediaError::Eos {
        let _ = decoder.send_eof();
        let _ =
            drain_decoded(&mut *decoder, &mut seek_request, &mut cached_frame, &frames_queue);
        while let Some(frame) = decoder.drain_reordered() {
            if queue_frame(frame, &mut seek_request, &mut cached_frame, &frames_queue).is_err() {
                break;
            }
        }
    }
    decoder.flush();

    pkt_queue.set_err_send(final_err);
    frames_queue.set_err_recv(final_err);
}

fn drain_decoded(
    decoder: &mut dyn DecoderBackend,
    seek_request: &mut Option<i64>,
    cached_frame: &mut Option<DecodedFrame>,
    frames_queue: &Arc<BoundedQueue<Message>>,
) -> Result<(), MediaError> {
    loop {
        match decoder.receive_frame() {
            Ok(Some(frame)) => queue_frame(frame, seek_request, cached_frame, frames_queue)?,
            Ok(None) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

fn queue_frame(
    frame: DecodedFrame,
    seek_request: &mut Option<i64>,
    cached_frame: &mut Option<DecodedFrame>,
    frames_queue: &Arc<BoundedQueue<Message>>,
) -> Result<(), MediaError> {
    if let Some(sr) = *seek_request {
        if frame.pts < sr {
            *cached_frame = Some(frame);
            return Ok(());
        }
    }

    let mut frame = frame;
    if let Some(cached) = cached_frame.take() {
        frames_queue.send(Message::Frame(cached))?;
    } else if let Some(sr) = *seek_request {
        if sr > 0 && frame.pts > sr {
            frame = frame.with_rewritten_pts(sr);
        }
    }

    *seek_request = None;
    frames_queue.send(Message::Frame(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pullframe_core::frame::{FramePayload, PixelFormat, SampleFormat};

    fn frame(pts: i64) -> DecodedFrame {
        DecodedFrame {
            pts,
            width: 4,
            height: 4,
            sample_format: SampleFormat::Video,
            pixel_format: PixelFormat::Rgba,
            payload: FramePayload::Planar {
                planes: vec![],
                linesizes: vec![],
            },
        }
    }

    #[test]
    fn frames_before_seek_target_are_cached_not_forwarded() {
        let q: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        let mut seek_request = Some(1_000_000);
        let mut cached = None;
        queue_frame(frame(500_000), &mut seek_request, &mut cached, &q).unwrap();
        assert!(q.is_empty());
        assert_eq!(cached.as_ref().map(|f| f.pts), Some(500_000));
    }

    #[test]
    fn cached_frame_forwarded_unmodified_before_current() {
        let q: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        let mut seek_request = Some(1_000_000);
        let mut cached = Some(frame(900_000));
        queue_frame(frame(1_200_000), &mut seek_request, &mut cached, &q).unwrap();
        assert_eq!(q.recv().unwrap().as_frame().unwrap().pts, 900_000);
        assert_eq!(q.recv().unwrap().as_frame().unwrap().pts, 1_200_000);
        assert!(seek_request.is_none());
    }

    #[test]
    fn first_post_seek_frame_without_cache_snaps_to_target() {
        let q: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        let mut seek_request = Some(1_000_000);
        let mut cached = None;
        queue_frame(frame(1_200_000), &mut seek_request, &mut cached, &q).unwrap();
        assert_eq!(q.recv().unwrap().as_frame().unwrap().pts, 1_000_000);
        assert!(seek_request.is_none());
    }

    #[test]
    fn no_seek_in_progress_passes_frame_through_unchanged() {
        let q: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        let mut seek_request = None;
        let mut cached = None;
        queue_frame(frame(42), &mut seek_request, &mut cached, &q).unwrap();
        assert_eq!(q.recv().unwrap().as_frame().unwrap().pts, 42);
    }
}
