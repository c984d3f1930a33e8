// crates/pullframe-core/src/message.rs
//
// Tagged message sum flowing through every bounded queue in the pipeline.
// Grounded on original_source/msg.c + msg.h: a `struct message { void *data;
// enum msg_type type; }` with a free function dispatching on tag. Rust's
// enum + Drop gives us the free function for free (pun intended) — no
// separate `free_message` entry point is needed, dropping a `Message`
// releases its payload exactly like `sxpi_msg_free_data`.

use crate::frame::DecodedFrame;
use crate::info::MediaInfo;
use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Frame,
    Packet,
    Seek,
    Info,
    Start,
    Stop,
    Sync,
}

#[derive(Debug)]
pub enum Message {
    Frame(DecodedFrame),
    Packet(Packet),
    /// Signed timestamp, pipeline's global microsecond time base.
    Seek(i64),
    /// `None` if the reply was requested before the source could be
    /// probed (e.g. open failed).
    Info(Option<MediaInfo>),
    Start,
    Stop,
    Sync,
}

impl Message {
    pub fn tag(&self) -> Tag {
        match self {
            Message::Frame(_) => Tag::Frame,
            Message::Packet(_) => Tag::Packet,
            Message::Seek(_) => Tag::Seek,
            Message::Info(_) => Tag::Info,
            Message::Start => Tag::Start,
            Message::Stop => Tag::Stop,
            Message::Sync => Tag::Sync,
        }
    }

    pub fn as_frame(self) -> Option<DecodedFrame> {
        match self {
            Message::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_seek(&self) -> Option<i64> {
        match self {
            Message::Seek(ts) => Some(*ts),
            _ => None,
        }
    }
}
