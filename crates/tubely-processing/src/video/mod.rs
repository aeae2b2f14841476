//! External media tools: probing, orientation classification, fast-start remuxing.

mod command;
pub mod orientation;
pub mod probe;
pub mod remux;
pub mod toolchain;

pub use orientation::{classify_geometry, classify_streams};
pub use probe::{FfprobeService, ProbeError, StreamInfo};
pub use remux::{FastStartRemuxer, RemuxError};
pub use toolchain::{FfmpegToolchain, MediaToolchain};
