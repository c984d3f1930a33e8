// crates/pullframe-core/src/lib.rs
//
// Pure data and policy shared between the pipeline backends and the client
// facade. No ffmpeg, no threads spawned here — just the types that flow
// across queues and the decision logic that turns a timeline query into
// pipeline commands.

pub mod buffer_counter;
pub mod error;
pub mod facade;
pub mod frame;
pub mod info;
pub mod log;
pub mod message;
pub mod options;
pub mod packet;
pub mod ports;
pub mod queue;

pub use buffer_counter::BufferCounter;
pub use error::MediaError;
pub use facade::{ClientFacade, PipelineHandle};
pub use frame::{DecodedFrame, FramePayload, PixelFormat, SampleFormat};
pub use info::MediaInfo;
pub use message::{Message, Tag};
pub use options::{MediaSelect, OptionValue, PipelineOptions, SoftwarePixelFormat};
pub use packet::Packet;
pub use ports::{DecoderBackend, DemuxerBackend, FilterBackend};
pub use queue::BoundedQueue;
