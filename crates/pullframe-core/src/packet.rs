// crates/pullframe-core/src/packet.rs
//
// A compressed packet as it flows demuxer -> decoder only.

#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Vec<u8>,
    /// Presentation timestamp, already rescaled to the global microsecond
    /// time base by the demuxer.
    pub pts: i64,
    /// Packet duration in microseconds, 0 if the container didn't supply
    /// one. Only consulted when `use_pkt_duration` is set — estimating a
    /// missing pts from the previous packet's duration.
    pub duration: i64,
    pub is_key: bool,
    pub stream_index: usize,
}
