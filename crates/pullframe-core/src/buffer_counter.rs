// crates/pullframe-core/src/buffer_counter.rs
//
// Port of bufcount.c: bounds the number of frames a hardware decoder may
// have in flight at once. A hardware surface pool is typically much
// smaller than the software frame queue depth, so the decoder must block
// new allocations until the client (or the filterer/sink downstream)
// releases one. MIN_BUF=3 matches the original — below that, double
// buffering the display path alone can deadlock the pipeline.

use std::sync::{Arc, Condvar, Mutex};

const MIN_BUF: u32 = 3;

struct State {
    refcount: u32,
    refmax: u32,
}

pub struct BufferCounter {
    state: Mutex<State>,
    cond: Condvar,
}

impl BufferCounter {
    /// `bufmax` is the backend's raw surface pool size; the usable bound
    /// is `max(bufmax, MIN_BUF) + 1` — the `+1` matches bufcount.c giving
    /// the pipeline one slot of headroom over the hard pool limit.
    pub fn new(bufmax: u32) -> Arc<Self> {
        Arc::new(BufferCounter {
            state: Mutex::new(State {
                refcount: 0,
                refmax: bufmax.max(MIN_BUF) + 1,
            }),
            cond: Condvar::new(),
        })
    }

    pub fn update_max(&self, bufmax: u32) {
        let mut s = self.state.lock().unwrap();
        s.refmax = bufmax.max(MIN_BUF) + 1;
        self.cond.notify_all();
    }

    /// Blocks while `refcount >= refmax`, then increments. Call before
    /// handing a new hardware surface to the decoder.
    pub fn acquire(&self) {
        let mut s = self.state.lock().unwrap();
        while s.refcount >= s.refmax {
            s = self.cond.wait(s).unwrap();
        }
        s.refcount += 1;
    }

    /// Decrements and wakes anyone blocked in `acquire`. Call when a
    /// surface handle is released (`FramePayload::HardwareSurface`'s
    /// drop callback).
    pub fn release(&self) {
        let mut s = self.state.lock().unwrap();
        debug_assert!(s.refcount > 0);
        s.refcount = s.refcount.saturating_sub(1);
        self.cond.notify_all();
    }

    pub fn refcount(&self) -> u32 {
        self.state.lock().unwrap().refcount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn refmax_is_bufmax_plus_one_floored_at_min_buf() {
        let bc = BufferCounter::new(1);
        assert_eq!(bc.state.lock().unwrap().refmax, MIN_BUF + 1);
        let bc = BufferCounter::new(10);
        assert_eq!(bc.state.lock().unwrap().refmax, 11);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let bc = BufferCounter::new(0); // refmax = MIN_BUF + 1 = 4
        for _ in 0..4 {
            bc.acquire();
        }
        assert_eq!(bc.refcount(), 4);

        let bc2 = Arc::clone(&bc);
        let handle = thread::spawn(move || {
            bc2.acquire();
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(bc.refcount(), 4);
        bc.release();
        handle.join().unwrap();
        assert_eq!(bc.refcount(), 4);
    }
}
