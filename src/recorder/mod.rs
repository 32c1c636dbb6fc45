//! Chunked persistence of the mixed stream.

mod chunk;

pub use chunk::{ChunkFile, ChunkRecorder, RecorderConfig, BLOCK_LATENCY};
