use super::Decoder;
use crate::error::Result;

/// Word-alignment buffering only; no actual decompression.
pub struct NoneDecoder {
    word_size: usize,
    residual: Vec<u8>,
}

impl NoneDecoder {
    pub fn new(word_size: usize) -> Self {
        assert!(word_size > 0);
        NoneDecoder {
            word_size,
            residual: Vec::new(),
        }
    }
}

impl Decoder for NoneDecoder {
    fn decompress(&mut self, buffer: &[u8]) -> Result<Vec<u8>> {
        self.residual.extend_from_slice(buffer);
        let aligned_len = self.residual.len() - (self.residual.len() % self.word_size);
        let tail = self.residual.split_off(aligned_len);
        Ok(std::mem::replace(&mut self.residual, tail))
    }

    fn finish(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let aligned_len = self.residual.len() - (self.residual.len() % self.word_size);
        let tail = self.residual.split_off(aligned_len);
        let aligned = std::mem::take(&mut self.residual);
        Ok((aligned, tail))
    }
}
