//! Block codecs.
//!
//! The container only needs a byte-buffer-to-byte-buffer codec with a known
//! worst-case output bound; [`Codec`] is that seam and [`ZstdCodec`] the
//! implementation used by default.

pub(crate) mod core;
pub(crate) mod zstd;

pub use self::core::Codec;
pub use self::zstd::ZstdCodec;
