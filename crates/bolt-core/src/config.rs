//! Codec-wide tunables shared by the chunker and the value decoder.

use serde::{Deserialize, Serialize};

use crate::value::DEFAULT_MAX_NESTING_DEPTH;

/// The largest chunk payload a Bolt chunk length field can express.
pub const MAX_CHUNK_SIZE: u16 = u16::MAX;

/// A conservative default chunk size well below [`MAX_CHUNK_SIZE`], matching
/// what most Bolt implementations use in practice.
pub const DEFAULT_MAX_CHUNK_SIZE: u16 = 8192;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Largest payload length written into a single chunk by [`crate::chunk::ChunkWriter`].
    pub max_chunk_size: u16,
    /// Deepest nesting of lists/maps/structures the decoder will follow
    /// before giving up with [`crate::value::PackStreamError::NestingTooDeep`].
    pub max_nesting_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}
