use super::Decoder;
use crate::error::{Result, UndrError};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// A `Write` sink shared with the `brotli` crate's push-based decompressor
/// writer so decompressed bytes can be drained after each `write_all` call.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Wraps a streaming Brotli decompressor then applies the same
/// word-alignment buffering as [`super::NoneDecoder`].
pub struct BrotliDecoder {
    word_size: usize,
    residual: Vec<u8>,
    sink: SharedBuffer,
    inner: brotli::DecompressorWriter<SharedBuffer>,
}

impl BrotliDecoder {
    pub fn new(word_size: usize) -> Self {
        assert!(word_size > 0);
        let sink = SharedBuffer::default();
        let inner = brotli::DecompressorWriter::new(sink.clone(), 4096);
        BrotliDecoder {
            word_size,
            residual: Vec::new(),
            sink,
            inner,
        }
    }

    fn drain_sink(&mut self) -> Vec<u8> {
        let mut buf = self.sink.0.lock().unwrap();
        std::mem::take(&mut *buf)
    }

    fn align(&mut self, mut decompressed: Vec<u8>) -> Vec<u8> {
        self.residual.append(&mut decompressed);
        let aligned_len = self.residual.len() - (self.residual.len() % self.word_size);
        let tail = self.residual.split_off(aligned_len);
        std::mem::replace(&mut self.residual, tail)
    }
}

impl Decoder for BrotliDecoder {
    fn decompress(&mut self, buffer: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .write_all(buffer)
            .map_err(|e| UndrError::Config(format!("brotli decode error: {e}")))?;
        let decompressed = self.drain_sink();
        Ok(self.align(decompressed))
    }

    fn finish(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        self.inner
            .flush()
            .map_err(|e| UndrError::Config(format!("brotli flush error: {e}")))?;
        let decompressed = self.drain_sink();
        let aligned = self.align(decompressed);
        let residual = std::mem::take(&mut self.residual);
        Ok((aligned, residual))
    }
}
