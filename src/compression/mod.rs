//! Streaming decompression with word-alignment buffering.
//!
//! A [`Decoder`] consumes arbitrary byte chunks and produces decompressed
//! chunks whose total length is a multiple of `word_size`; any sub-word
//! residual tail is withheld until more input arrives or [`Decoder::finish`]
//! is called. A non-empty residual at end-of-input is
//! [`crate::error::UndrError::TrailingBytes`]. Decoders are single-use and
//! not `Sync` (one per file, one worker per file at a time).

mod brotli_codec;
mod none_codec;

pub use brotli_codec::BrotliDecoder;
pub use none_codec::NoneDecoder;

/// Consumes compressed bytes, returns word-aligned decompressed bytes.
pub trait Decoder {
    fn decompress(&mut self, buffer: &[u8]) -> crate::error::Result<Vec<u8>>;

    /// Returns `(last_aligned_chunk, residual)`. Callers must check that
    /// `residual` is empty; a non-empty residual means the stream didn't end
    /// on a word boundary.
    fn finish(&mut self) -> crate::error::Result<(Vec<u8>, Vec<u8>)>;
}

/// `{suffix, compressed_size, compressed_hash}` tagged by codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    None {
        compressed_size: u64,
        compressed_hash: String,
    },
    Brotli {
        suffix: String,
        compressed_size: u64,
        compressed_hash: String,
    },
}

impl Compression {
    pub fn suffix(&self) -> &str {
        match self {
            Compression::None { .. } => "",
            Compression::Brotli { suffix, .. } => suffix,
        }
    }

    pub fn compressed_size(&self) -> u64 {
        match self {
            Compression::None { compressed_size, .. } => *compressed_size,
            Compression::Brotli { compressed_size, .. } => *compressed_size,
        }
    }

    pub fn compressed_hash(&self) -> &str {
        match self {
            Compression::None { compressed_hash, .. } => compressed_hash,
            Compression::Brotli { compressed_hash, .. } => compressed_hash,
        }
    }

    pub fn decoder(&self, word_size: usize) -> Box<dyn Decoder + Send> {
        match self {
            Compression::None { .. } => Box::new(NoneDecoder::new(word_size)),
            Compression::Brotli { .. } => Box::new(BrotliDecoder::new(word_size)),
        }
    }
}
