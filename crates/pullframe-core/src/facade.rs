// crates/pullframe-core/src/facade.rs
//
// The client-facing policy layer: turns "give me the frame for time t"
// queries into start/seek/pop commands against a running pipeline, and
// decides when a query can be answered from what's already buffered
// versus needs a real seek. Ported from sxplayer_get_frame / pop_frame /
// ret_frame: those three functions are the actual decision logic, one
// layer above the async control worker's start/seek/stop primitives.
//
// Generic over `PipelineHandle` so this policy can be unit-tested
// without ffmpeg or real threads.

use crate::frame::DecodedFrame;

pub trait PipelineHandle {
    fn start(&mut self);
    fn seek(&mut self, ts: i64);
    /// Blocks until a frame is available, or returns `None` once the
    /// pipeline has hit EOF and has nothing further to deliver.
    fn pop_frame(&mut self) -> Option<DecodedFrame>;
}

pub struct ClientFacade<P: PipelineHandle> {
    pipeline: P,
    skip_us: i64,
    /// Negative means unknown/unbounded.
    trim_duration_us: i64,
    dist_time_seek_trigger_us: i64,

    last_pushed_frame_ts: Option<i64>,
    first_ts: Option<i64>,
    cached_frame: Option<DecodedFrame>,
}

impl<P: PipelineHandle> ClientFacade<P> {
    pub fn new(
        pipeline: P,
        skip_us: i64,
        trim_duration_us: i64,
        dist_time_seek_trigger_us: i64,
    ) -> Self {
        ClientFacade {
            pipeline,
            skip_us,
            trim_duration_us,
            dist_time_seek_trigger_us,
            last_pushed_frame_ts: None,
            first_ts: None,
            cached_frame: None,
        }
    }

    fn get_media_time(&self, t: i64) -> i64 {
        if self.trim_duration_us < 0 {
            self.skip_us + t
        } else {
            self.skip_us + t.min(self.trim_duration_us)
        }
    }

    fn pop(&mut self) -> Option<DecodedFrame> {
        if let Some(f) = self.cached_frame.take() {
            return Some(f);
        }
        self.pipeline.pop_frame()
    }

    /// Drop the candidate if its pts is the one we already handed back
    /// last time (duplicate query at the same instant), else record it
    /// as the new high-water mark and return it.
    fn ret_frame(&mut self, frame: DecodedFrame) -> Option<DecodedFrame> {
        if self.last_pushed_frame_ts == Some(frame.pts) {
            return None;
        }
        self.last_pushed_frame_ts = Some(frame.pts);
        Some(frame)
    }

    /// `t` is microseconds since the client's own clock start, ignoring
    /// `skip_us`. A negative `t` means "prefetch": start the pipeline
    /// but don't wait for a frame.
    pub fn get_frame(&mut self, t: i64) -> Option<DecodedFrame> {
        if t < 0 {
            self.pipeline.start();
            return None;
        }

        // Still-image / unbounded source with no known duration: once
        // we've handed back our one frame there's nothing to seek
        // within, every later call is a no-op.
        if self.trim_duration_us < 0 && self.last_pushed_frame_ts.is_some() {
            return None;
        }

        let vt = self.get_media_time(t);

        // On the very first call there's no last-pushed pts to diff
        // against yet, so start the pipeline and pop its first candidate
        // up front — it still has to run through the same diff/seek/
        // consume-forward logic every later call goes through below.
        let mut pre_popped = None;
        if self.last_pushed_frame_ts.is_none() {
            self.pipeline.start();
            let candidate = self.pop()?;
            self.first_ts = Some(candidate.pts);
            pre_popped = Some(candidate);
        }

        let diff = match &pre_popped {
            Some(c) => vt - c.pts,
            None => vt - self.last_pushed_frame_ts.unwrap(),
        };

        if pre_popped.is_none() && diff == 0 {
            return None;
        }

        if vt < self.first_ts.unwrap_or(i64::MIN) {
            // Query predates anything we've ever observed: cache what we
            // already have (or what arrives next) so a later forward
            // query can use it, but there's nothing earlier to hand
            // back now.
            if let Some(c) = pre_popped.take() {
                self.cached_frame = Some(c);
            } else if let Some(candidate) = self.pop() {
                self.cached_frame = Some(candidate);
            }
            return None;
        }

        let mut candidate = if diff < 0 || diff > self.dist_time_seek_trigger_us {
            self.cached_frame = None;
            self.pipeline.seek(vt);
            let mut c = self.pop()?;
            if diff < 0 {
                // Backward seek: containers seek to the nearest keyframe
                // at or before the target, but decode can still produce
                // a frame past it on the first pass. Drain until we've
                // actually landed at or before `vt`.
                while c.pts > vt {
                    c = self.pop()?;
                }
            }
            c
        } else if let Some(c) = pre_popped {
            c
        } else {
            self.pop()?
        };

        // Consume forward up to but not past `vt`, keeping the last
        // candidate whose pts doesn't exceed the query. Each next frame
        // is checked for overshoot *before* it replaces `candidate`, so
        // an overshooting frame is cached for the next call instead of
        // silently discarding the last good candidate.
        if candidate.pts > vt {
            self.cached_frame = Some(candidate);
            return None;
        }
        loop {
            if candidate.pts == vt {
                break;
            }
            match self.pop() {
                Some(next) if next.pts <= vt => candidate = next,
                Some(next) => {
                    self.cached_frame = Some(next);
                    break;
                }
                None => break,
            }
        }

        self.ret_frame(candidate)
    }

    /// Ignore timestamps entirely, pop whatever frame comes next.
    pub fn get_next_frame(&mut self) -> Option<DecodedFrame> {
        if self.last_pushed_frame_ts.is_none() {
            self.pipeline.start();
        }
        let frame = self.pop()?;
        self.first_ts.get_or_insert(frame.pts);
        self.last_pushed_frame_ts = Some(frame.pts);
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FramePayload, PixelFormat, SampleFormat};
    use std::collections::VecDeque;

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

    struct FakePipeline {
        queue: VecDeque<DecodedFrame>,
        starts: u32,
        seeks: Vec<i64>,
    }

    impl FakePipeline {
        fn new(ptss: &[i64]) -> Self {
            FakePipeline {
                queue: ptss.iter().map(|&p| frame(p)).collect(),
                starts: 0,
                seeks: vec![],
            }
        }
    }

    impl PipelineHandle for FakePipeline {
        fn start(&mut self) {
            self.starts += 1;
        }

        fn seek(&mut self, ts: i64) {
            // The script already encodes whatever the decoder would
            // produce after landing at `ts`; the fake just records the
            // call for assertions.
            self.seeks.push(ts);
        }

        fn pop_frame(&mut self) -> Option<DecodedFrame> {
            self.queue.pop_front()
        }
    }

    #[test]
    fn first_call_starts_and_returns_first_frame() {
        let pipeline = FakePipeline::new(&[0, 33_000, 66_000]);
        let mut facade = ClientFacade::new(pipeline, 0, 100_000, 1_500_000);
        let f = facade.get_frame(0).expect("frame");
        assert_eq!(f.pts, 0);
        assert_eq!(facade.pipeline.starts, 1);
    }

    #[test]
    fn negative_time_prefetches_without_returning_a_frame() {
        let pipeline = FakePipeline::new(&[0, 33_000]);
        let mut facade = ClientFacade::new(pipeline, 0, 100_000, 1_500_000);
        assert!(facade.get_frame(-1).is_none());
        assert_eq!(facade.pipeline.starts, 1);
    }

    #[test]
    fn sequential_queries_advance_without_seeking() {
        let pipeline = FakePipeline::new(&[0, 33_000, 66_000, 99_000]);
        let mut facade = ClientFacade::new(pipeline, 0, 200_000, 1_500_000);
        assert_eq!(facade.get_frame(0).unwrap().pts, 0);
        assert_eq!(facade.get_frame(33_000).unwrap().pts, 33_000);
        assert_eq!(facade.get_frame(66_000).unwrap().pts, 66_000);
        assert!(facade.pipeline.seeks.is_empty());
    }

    #[test]
    fn small_forward_gap_consumes_without_seeking() {
        let pipeline = FakePipeline::new(&[0, 10_000, 20_000, 30_000, 40_000]);
        let mut facade = ClientFacade::new(pipeline, 0, 200_000, 1_500_000);
        assert_eq!(facade.get_frame(0).unwrap().pts, 0);
        // Ask for t=35_000: diff=35_000, well under the 1.5s trigger.
        let f = facade.get_frame(35_000).unwrap();
        assert_eq!(f.pts, 30_000);
        assert!(facade.pipeline.seeks.is_empty());
    }

    #[test]
    fn large_forward_gap_triggers_seek() {
        let pipeline = FakePipeline::new(&[0, 10_000_000, 10_033_000]);
        let mut facade = ClientFacade::new(pipeline, 0, 200_000_000, 1_500_000);
        assert_eq!(facade.get_frame(0).unwrap().pts, 0);
        let f = facade.get_frame(10_000_000).unwrap();
        assert_eq!(f.pts, 10_000_000);
        assert_eq!(facade.pipeline.seeks, vec![10_000_000]);
    }

    #[test]
    fn backward_query_triggers_seek() {
        // [first frame, then a big forward jump, then what the decoder
        // produces after a subsequent backward seek].
        let pipeline = FakePipeline::new(&[0, 5_000_000, 10_000_000, 1_000_000, 5_000_000]);
        let mut facade = ClientFacade::new(pipeline, 0, 200_000_000, 1_500_000);
        assert_eq!(facade.get_frame(0).unwrap().pts, 0);
        let f = facade.get_frame(10_000_000).unwrap();
        assert_eq!(f.pts, 10_000_000);
        assert_eq!(facade.pipeline.seeks, vec![10_000_000]);

        let f = facade.get_frame(1_000_000).unwrap();
        assert_eq!(f.pts, 1_000_000);
        assert_eq!(facade.pipeline.seeks, vec![10_000_000, 1_000_000]);
    }

    #[test]
    fn duplicate_query_at_same_instant_returns_none() {
        let pipeline = FakePipeline::new(&[0, 33_000]);
        let mut facade = ClientFacade::new(pipeline, 0, 200_000, 1_500_000);
        assert_eq!(facade.get_frame(0).unwrap().pts, 0);
        assert!(facade.get_frame(0).is_none());
    }

    #[test]
    fn get_next_frame_ignores_timestamps() {
        let pipeline = FakePipeline::new(&[0, 33_000, 66_000]);
        let mut facade = ClientFacade::new(pipeline, 0, 200_000, 1_500_000);
        assert_eq!(facade.get_next_frame().unwrap().pts, 0);
        assert_eq!(facade.get_next_frame().unwrap().pts, 33_000);
        assert_eq!(facade.get_next_frame().unwrap().pts, 66_000);
        assert!(facade.get_next_frame().is_none());
    }
}
