// crates/pullframe-media/src/pipeline/demuxer_worker.rs
//
// Pulls packets and forwards them to the decoder, polling the incoming
// src_queue once per iteration for a seek request rather than blocking
// on it — a real seek should preempt whatever packet would otherwise be
// read next. Ported from sxpi_demuxing_run.

use std::sync::Arc;

use pullframe_core::ports::DemuxerBackend;
use pullframe_core::queue::BoundedQueue;
use pullframe_core::{MediaError, Message};

pub fn run(
    mut demuxer: Box<dyn DemuxerBackend>,
    pkt_skip_mod: u32,
    src_queue: Arc<BoundedQueue<Message>>,
    pkt_queue: Arc<BoundedQueue<Message>>,
) {
    let mut non_key_idx: u32 = 0;

    let final_err = loop {
        match src_queue.try_recv_checked() {
            Ok(Some(Message::Seek(ts))) => {
                pkt_queue.flush();
                if demuxer.seek(ts).is_err() {
                    // A failed seek isn't fatal to the stream — fall
                    // through and keep reading from wherever we are.
                }
                non_key_idx = 0;
                if pkt_queue.send(Message::Seek(ts)).is_err() {
                    break MediaError::Exit;
                }
                continue;
            }
            Ok(Some(Message::Stop)) => break MediaError::Exit,
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => break e,
        }

        match demuxer.read_packet() {
            Ok(pkt) => {
                if pkt_skip_mod != 0 && !pkt.is_key {
                    non_key_idx += 1;
                    if non_key_idx % pkt_skip_mod != 0 {
                        continue;
                    }
                }
                if pkt_queue.send(Message::Packet(pkt)).is_err() {
                    break MediaError::Exit;
                }
            }
            Err(e) => break e,
        }
    };

    src_queue.set_err_recv(final_err);
    pkt_queue.set_err_send(final_err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pullframe_core::Packet;

    fn pkt(pts: i64, is_key: bool) -> Packet {
        Packet {
            data: vec![],
            pts,
            duration: 0,
            is_key,
            stream_index: 0,
        }
    }

    /// Replays a fixed packet list; `read_packet` yields `Eos` once
    /// exhausted, same as a real container running out of data.
    struct FakeDemuxer {
        packets: std::vec::IntoIter<Packet>,
    }

    impl DemuxerBackend for FakeDemuxer {
        fn probe_info(&mut self) -> Result<pullframe_core::MediaInfo, MediaError> {
            unimplemented!()
        }
        fn seek(&mut self, _ts: i64) -> Result<(), MediaError> {
            Ok(())
        }
        fn read_packet(&mut self) -> Result<Packet, MediaError> {
            self.packets.next().ok_or(MediaError::Eos)
        }
    }

    fn drain_pts(q: &BoundedQueue<Message>) -> Vec<i64> {
        let mut out = vec![];
        loop {
            match q.recv() {
                Ok(Message::Packet(p)) => out.push(p.pts),
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        out
    }

    #[test]
    fn pkt_skip_mod_zero_forwards_every_packet() {
        let demuxer = Box::new(FakeDemuxer {
            packets: vec![pkt(0, true), pkt(1, false), pkt(2, false), pkt(3, false)].into_iter(),
        });
        let src: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(4));
        let pkt_q: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));

        run(demuxer, 0, src, Arc::clone(&pkt_q));

        assert_eq!(drain_pts(&pkt_q), vec![0, 1, 2, 3]);
    }

    #[test]
    fn pkt_skip_mod_drops_non_key_packets_not_on_the_modulus() {
        // Key packets always pass; non-key packets only pass every 2nd one
        // (1-based index among non-key packets).
        let demuxer = Box::new(FakeDemuxer {
            packets: vec![
                pkt(0, true),
                pkt(1, false),
                pkt(2, false),
                pkt(3, false),
                pkt(4, false),
            ]
            .into_iter(),
        });
        let src: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(4));
        let pkt_q: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));

        run(demuxer, 2, src, Arc::clone(&pkt_q));

        assert_eq!(drain_pts(&pkt_q), vec![0, 2, 4]);
    }

    #[test]
    fn seek_resets_the_non_key_skip_counter() {
        let demuxer = Box::new(FakeDemuxer {
            packets: vec![pkt(0, false), pkt(1, false)].into_iter(),
        });
        let src: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(4));
        let pkt_q: Arc<BoundedQueue<Message>> = Arc::new(BoundedQueue::new(8));
        src.send(Message::Seek(0)).unwrap();

        run(demuxer, 2, src, Arc::clone(&pkt_q));

        // Seek message forwarded first, then the first non-key packet
        // after it is index 1 of a fresh count (dropped), second is kept.
        assert_eq!(pkt_q.recv().unwrap().as_seek(), Some(0));
        assert_eq!(drain_pts(&pkt_q), vec![1]);
    }
}
