// crates/pullframe-core/src/queue.rs
//
// Bounded FIFO with two independent error latches, one for the send side
// and one for the recv side. Grounded on the AVThreadMessageQueue usage
// throughout async.c/decoding.c/mod_demuxing.c: a worker that hits EOF
// sets its own send latch so downstream `recv` calls start failing once
// drained, while a worker whose downstream died sets the recv latch so
// its own `send` calls fail immediately instead of blocking forever.
// Setting a latch never drops what's already queued — readers drain
// whatever is buffered before they start observing the error.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::MediaError;

struct Inner<T> {
    items: VecDeque<T>,
    capacity: usize,
    err_send: Option<MediaError>,
    err_recv: Option<MediaError>,
}

pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
                err_send: None,
                err_recv: None,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Blocks while the queue is full and healthy. Returns the latched
    /// send error if one has been set, without enqueuing.
    pub fn send(&self, item: T) -> Result<(), MediaError> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if let Some(e) = g.err_send {
                return Err(e);
            }
            if g.items.len() < g.capacity {
                g.items.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }
            g = self.not_full.wait(g).unwrap();
        }
    }

    /// Blocks while the queue is empty and healthy. Drains buffered items
    /// first even after a recv error has been latched — a graceful EOF
    /// still delivers everything the upstream already sent.
    pub fn recv(&self) -> Result<T, MediaError> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if let Some(item) = g.items.pop_front() {
                self.not_full.notify_one();
                return Ok(item);
            }
            if let Some(e) = g.err_recv {
                return Err(e);
            }
            g = self.not_empty.wait(g).unwrap();
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        let mut g = self.inner.lock().unwrap();
        let item = g.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Non-blocking recv that also surfaces a latched recv error once the
    /// buffer is drained, instead of treating it the same as "no message
    /// yet" the way `try_recv` does — workers that poll a queue each
    /// loop iteration (rather than blocking on it) need this to notice
    /// shutdown.
    pub fn try_recv_checked(&self) -> Result<Option<T>, MediaError> {
        let mut g = self.inner.lock().unwrap();
        if let Some(item) = g.items.pop_front() {
            self.not_full.notify_one();
            return Ok(Some(item));
        }
        if let Some(e) = g.err_recv {
            return Err(e);
        }
        Ok(None)
    }

    /// Latch the send side: future `send` calls fail with `err`, already
    /// queued items remain available to `recv`.
    pub fn set_err_send(&self, err: MediaError) {
        let mut g = self.inner.lock().unwrap();
        if g.err_send.is_none() {
            g.err_send = Some(err);
        }
        self.not_full.notify_all();
    }

    /// Latch the recv side: `recv` fails with `err` once the buffer is
    /// drained; `send` is unaffected until the send latch is also set.
    pub fn set_err_recv(&self, err: MediaError) {
        let mut g = self.inner.lock().unwrap();
        if g.err_recv.is_none() {
            g.err_recv = Some(err);
        }
        self.not_empty.notify_all();
    }

    /// Latch both sides at once — used when a worker is being torn down
    /// and nothing further should pass through the queue in either
    /// direction.
    pub fn set_err(&self, err: MediaError) {
        self.set_err_send(err);
        self.set_err_recv(err);
    }

    pub fn flush(&self) {
        let mut g = self.inner.lock().unwrap();
        g.items.clear();
        self.not_full.notify_all();
    }

    /// Reset both latches and drop any buffered items — used between a
    /// stop and a subsequent start on the same queue instance.
    pub fn reset(&self) {
        let mut g = self.inner.lock().unwrap();
        g.items.clear();
        g.err_send = None;
        g.err_recv = None;
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_recv_roundtrip() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        q.send(1).unwrap();
        q.send(2).unwrap();
        assert_eq!(q.recv().unwrap(), 1);
        assert_eq!(q.recv().unwrap(), 2);
    }

    #[test]
    fn recv_drains_before_observing_latch() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        q.send(42).unwrap();
        q.set_err_recv(MediaError::Eos);
        assert_eq!(q.recv().unwrap(), 42);
        assert_eq!(q.recv().unwrap_err(), MediaError::Eos);
    }

    #[test]
    fn send_latch_rejects_immediately_even_with_space() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        q.set_err_send(MediaError::Exit);
        assert_eq!(q.send(1).unwrap_err(), MediaError::Exit);
        assert!(q.is_empty());
    }

    #[test]
    fn reset_clears_latches_and_items() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        q.send(1).unwrap();
        q.set_err(MediaError::Eos);
        q.reset();
        assert!(q.is_empty());
        q.send(7).unwrap();
        assert_eq!(q.recv().unwrap(), 7);
    }

    #[test]
    fn full_queue_blocks_until_drained() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let q: Arc<BoundedQueue<i32>> = Arc::new(BoundedQueue::new(1));
        q.send(1).unwrap();

        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || {
            q2.send(2).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.recv().unwrap(), 1);
        handle.join().unwrap();
        assert_eq!(q.recv().unwrap(), 2);
    }
}
