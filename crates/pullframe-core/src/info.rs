// crates/pullframe-core/src/info.rs

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Microseconds; 0 if unknown.
    pub duration_us: i64,
    pub is_image: bool,
    /// Original stream time base, as (numerator, denominator).
    pub timebase: (i32, i32),
}
