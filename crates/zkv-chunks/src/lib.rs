//! zkv-chunks: split a file into a fixed number of pieces and put it back together
//!
//! Chunks are positional: the caller carries each chunk's index explicitly
//! from here to storage and back. Names produced by [`chunk_name`] are for
//! display only.

pub mod codec;

pub use codec::{chunk_count, chunk_len, chunk_name, combine, split};
