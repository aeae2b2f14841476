//! Orientation classification from stream geometry.
//!
//! A stream is 16:9 when `long / short * 9` falls within `16 ± 0.2`
//! (about 1.25%), which absorbs encoder rounding such as 1920x1088.
//! Landscape and portrait use the same test with the sides swapped.

use super::probe::{ProbeError, StreamInfo};
use tubely_core::Orientation;

const NOMINAL: f64 = 16.0;
const TOLERANCE: f64 = 0.2;

fn is_sixteen_by_nine(long: u32, short: u32) -> bool {
    if short == 0 {
        return false;
    }
    let scaled = f64::from(long) / f64::from(short) * 9.0;
    (scaled - NOMINAL).abs() < TOLERANCE
}

/// Classify a frame size.
pub fn classify_geometry(width: u32, height: u32) -> Orientation {
    if is_sixteen_by_nine(width, height) {
        Orientation::Landscape
    } else if is_sixteen_by_nine(height, width) {
        Orientation::Portrait
    } else {
        Orientation::Other
    }
}

/// Classify by the first video stream. An empty list is an error, never `Other`.
pub fn classify_streams(streams: &[StreamInfo]) -> Result<Orientation, ProbeError> {
    let first = streams.first().ok_or(ProbeError::NoStreams)?;
    Ok(classify_geometry(first.width, first.height))
}
