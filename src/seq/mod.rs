pub mod colorspace;
pub mod fastx;
pub mod segment;

pub use fastx::Format;
pub use segment::{segment_offsets, split_read, split_reads};
