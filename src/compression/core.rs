use std::fmt::Debug;

use crate::error::Result;

/// A block codec.
///
/// Codecs are shared between the caller's thread and the decompression
/// workers, so they work through `&self` and allocate their own output.
pub trait Codec: Send + Sync + Debug {
    /// Upper bound on the compressed size of `len` source bytes.
    fn compress_bound(&self, len: usize) -> usize;

    /// Compress `src` into a freshly allocated buffer.
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `src`, which must expand to exactly `expected_len` bytes.
    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}
