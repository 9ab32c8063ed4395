//! File abstraction: `chunks()` yields decompressed, hash-verified
//! bytes regardless of whether the content sits on disk raw, on disk
//! compressed, or only on the remote server.

use crate::compression::Compression;
use crate::config::CHUNK_SIZE;
use crate::error::{Result, UndrError};
use crate::manifest::FileDescriptor;
use crate::path_id::PathId;
use crate::remote::{Progress, Server};
use crate::task::Phase;
use sha3::{Digest, Sha3_224};
use std::io::Read;
use std::path::Path;

fn hex_digest(hasher: Sha3_224) -> String {
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// A file's content, addressable from three possible sources. Borrows its
/// descriptor and server rather than owning them since callers already hold
/// a loaded [`crate::manifest::Directory`] and dataset [`Server`].
pub struct File<'a> {
    pub path_id: PathId,
    pub root: &'a Path,
    pub server: Option<&'a Server>,
    pub descriptor: &'a FileDescriptor,
}

impl<'a> File<'a> {
    pub fn new(
        path_id: PathId,
        root: &'a Path,
        server: Option<&'a Server>,
        descriptor: &'a FileDescriptor,
    ) -> Self {
        File {
            path_id,
            root,
            server,
            descriptor,
        }
    }

    /// Stream decompressed, word-aligned chunks to `on_chunk`, in source
    /// priority order: local raw, then local compressed, then remote.
    /// `on_progress` receives a delta per phase as bytes are read/decoded,
    /// and a final `complete: true` event per phase this source touches.
    pub fn chunks(
        &self,
        client: &reqwest::blocking::Client,
        mut on_progress: impl FnMut(Phase, Progress),
        mut on_chunk: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let raw_path = self.path_id.local_path(self.root);
        if raw_path.is_file() {
            return self.stream_local_raw(&raw_path, &mut on_progress, &mut on_chunk);
        }

        let compression = self.descriptor.best_compression();
        let compressed_path = self
            .path_id
            .with_suffix(compression.suffix())
            .local_path(self.root);
        if compressed_path.is_file() {
            return self.stream_local_compressed(&compressed_path, compression, &mut on_progress, &mut on_chunk);
        }

        let server = self.server.ok_or_else(|| UndrError::NotInstalled {
            path_id: self.path_id.clone(),
        })?;
        self.stream_remote(client, server, compression, &mut on_progress, &mut on_chunk)
    }

    fn decompress_progress(&self, current_bytes: i64, complete: bool) -> Progress {
        Progress {
            path_id: self.path_id.clone(),
            initial_bytes: 0,
            current_bytes,
            final_bytes: self.descriptor.size as i64,
            complete,
        }
    }

    fn verify(&self, hasher: Sha3_224, total_len: u64) -> Result<()> {
        if total_len != self.descriptor.size {
            return Err(UndrError::SizeMismatch {
                path_id: self.path_id.clone(),
                expected: self.descriptor.size,
                actual: total_len,
            });
        }
        let digest = hex_digest(hasher);
        if digest != self.descriptor.hash {
            return Err(UndrError::HashMismatch {
                path_id: self.path_id.clone(),
                expected: self.descriptor.hash.clone(),
                actual: digest,
            });
        }
        Ok(())
    }

    fn stream_local_raw(
        &self,
        path: &Path,
        on_progress: &mut impl FnMut(Phase, Progress),
        on_chunk: &mut impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let mut file = std::fs::File::open(path).map_err(|e| UndrError::io(path.display().to_string(), e))?;
        let mut hasher = Sha3_224::new();
        let mut total = 0u64;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).map_err(|e| UndrError::io(path.display().to_string(), e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
            on_progress(Phase::Decompress, self.decompress_progress(n as i64, false));
            on_chunk(&buf[..n])?;
        }
        self.verify(hasher, total)?;
        on_progress(Phase::Decompress, self.decompress_progress(0, true));
        Ok(())
    }

    fn stream_local_compressed(
        &self,
        path: &Path,
        compression: &Compression,
        on_progress: &mut impl FnMut(Phase, Progress),
        on_chunk: &mut impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let mut file = std::fs::File::open(path).map_err(|e| UndrError::io(path.display().to_string(), e))?;
        let mut decoder = compression.decoder(self.descriptor.word_size());
        let mut hasher = Sha3_224::new();
        let mut total = 0u64;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).map_err(|e| UndrError::io(path.display().to_string(), e))?;
            if n == 0 {
                break;
            }
            let decompressed = decoder.decompress(&buf[..n])?;
            if !decompressed.is_empty() {
                hasher.update(&decompressed);
                total += decompressed.len() as u64;
                on_progress(Phase::Decompress, self.decompress_progress(decompressed.len() as i64, false));
                on_chunk(&decompressed)?;
            }
        }
        self.finish_decoder(decoder, &mut hasher, &mut total, on_progress, on_chunk)?;
        self.verify(hasher, total)?;
        on_progress(Phase::Decompress, self.decompress_progress(0, true));
        Ok(())
    }

    fn stream_remote(
        &self,
        client: &reqwest::blocking::Client,
        server: &Server,
        compression: &Compression,
        on_progress: &mut impl FnMut(Phase, Progress),
        on_chunk: &mut impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let suffixed = self.path_id.with_suffix(compression.suffix());
        let url = server.resolve(&suffixed);
        let mut response = client
            .get(&url)
            .timeout(server.timeout)
            .send()
            .map_err(|source| UndrError::NetworkError {
                path_id: self.path_id.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(UndrError::NetworkError {
                path_id: self.path_id.clone(),
                source: response.error_for_status().unwrap_err(),
            });
        }

        let mut decoder = compression.decoder(self.descriptor.word_size());
        let mut hasher = Sha3_224::new();
        let mut compressed_hasher = Sha3_224::new();
        let mut total = 0u64;
        let compressed_total = compression.compressed_size() as i64;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| UndrError::io(self.path_id.to_string(), e))?;
            if n == 0 {
                break;
            }
            compressed_hasher.update(&buf[..n]);
            on_progress(
                Phase::Download,
                Progress {
                    path_id: self.path_id.clone(),
                    initial_bytes: 0,
                    current_bytes: n as i64,
                    final_bytes: compressed_total,
                    complete: false,
                },
            );

            let decompressed = decoder.decompress(&buf[..n])?;
            if !decompressed.is_empty() {
                hasher.update(&decompressed);
                total += decompressed.len() as u64;
                on_progress(Phase::Decompress, self.decompress_progress(decompressed.len() as i64, false));
                on_chunk(&decompressed)?;
            }
        }
        self.finish_decoder(decoder, &mut hasher, &mut total, on_progress, on_chunk)?;

        let compressed_digest = hex_digest(compressed_hasher);
        let expected_compressed_hash = compression.compressed_hash();
        if compressed_digest != expected_compressed_hash {
            return Err(UndrError::HashMismatch {
                path_id: self.path_id.clone(),
                expected: expected_compressed_hash.to_string(),
                actual: compressed_digest,
            });
        }

        self.verify(hasher, total)?;
        on_progress(
            Phase::Download,
            Progress {
                path_id: self.path_id.clone(),
                initial_bytes: 0,
                current_bytes: 0,
                final_bytes: 0,
                complete: true,
            },
        );
        on_progress(Phase::Decompress, self.decompress_progress(0, true));
        Ok(())
    }

    fn finish_decoder(
        &self,
        mut decoder: Box<dyn crate::compression::Decoder + Send>,
        hasher: &mut Sha3_224,
        total: &mut u64,
        on_progress: &mut impl FnMut(Phase, Progress),
        on_chunk: &mut impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let (last, residual) = decoder.finish()?;
        if !last.is_empty() {
            hasher.update(&last);
            *total += last.len() as u64;
            on_progress(Phase::Decompress, self.decompress_progress(last.len() as i64, false));
            on_chunk(&last)?;
        }
        if !residual.is_empty() {
            return Err(UndrError::TrailingBytes {
                path_id: self.path_id.clone(),
                word_size: self.descriptor.word_size(),
                remaining: residual.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileKind;

    fn descriptor_for(data: &[u8]) -> FileDescriptor {
        let hash: String = Sha3_224::digest(data).iter().map(|b| format!("{b:02x}")).collect();
        FileDescriptor {
            path_id: PathId::new("a/x.es"),
            size: data.len() as u64,
            hash,
            own_doi: None,
            metadata: serde_json::Value::Null,
            compressions: vec![Compression::None {
                compressed_size: data.len() as u64,
                compressed_hash: String::new(),
            }],
            kind: FileKind::Other,
        }
    }

    #[test]
    fn reads_local_raw_file_and_verifies_hash() {
        let data = b"abcdefgh".to_vec();
        let descriptor = descriptor_for(&data);
        let root = std::env::temp_dir().join(format!("undr-file-raw-{}", std::process::id()));
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("a/x.es"), &data).unwrap();

        let file = File::new(PathId::new("a/x.es"), &root, None, &descriptor);
        let client = reqwest::blocking::Client::new();
        let mut collected = Vec::new();
        let mut progress_events = Vec::new();
        file.chunks(
            &client,
            |phase, progress| progress_events.push((phase, progress.complete)),
            |chunk| {
                collected.extend_from_slice(chunk);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(collected, data);
        assert!(progress_events.iter().any(|(phase, complete)| *phase == Phase::Decompress && *complete));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn rejects_size_mismatch() {
        let data = b"abcdefgh".to_vec();
        let mut descriptor = descriptor_for(&data);
        descriptor.size += 1;
        let root = std::env::temp_dir().join(format!("undr-file-sizemismatch-{}", std::process::id()));
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("a/x.es"), &data).unwrap();

        let file = File::new(PathId::new("a/x.es"), &root, None, &descriptor);
        let client = reqwest::blocking::Client::new();
        let err = file.chunks(&client, |_, _| {}, |_| Ok(())).unwrap_err();
        assert!(matches!(err, UndrError::SizeMismatch { .. }));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_everywhere_is_not_installed() {
        let data = b"abcdefgh".to_vec();
        let descriptor = descriptor_for(&data);
        let root = std::env::temp_dir().join(format!("undr-file-missing-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();

        let file = File::new(PathId::new("a/x.es"), &root, None, &descriptor);
        let client = reqwest::blocking::Client::new();
        let err = file.chunks(&client, |_, _| {}, |_| Ok(())).unwrap_err();
        assert!(matches!(err, UndrError::NotInstalled { .. }));
        std::fs::remove_dir_all(&root).ok();
    }
}
