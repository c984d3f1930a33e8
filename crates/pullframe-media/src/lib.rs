// crates/pullframe-media/src/lib.rs

pub mod client;
pub mod ffmpeg;
pub mod filter;
pub mod pipeline;

pub use client::MediaProvider;
pub use pullframe_core::{MediaError, MediaInfo, PipelineOptions};
