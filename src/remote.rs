//! Remote server: URL composition and resumable range-aware downloads.

use crate::config::CHUNK_SIZE;
use crate::error::{Result, UndrError};
use crate::path_id::PathId;
use sha3::{Digest, Sha3_224};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

/// `{url, timeout}`; produces URLs from PathIds by appending path parts
/// beyond the dataset-name root.
#[derive(Clone, Debug)]
pub struct Server {
    pub url: String,
    pub timeout: Duration,
}

impl Server {
    pub fn new(url: impl Into<String>, timeout_secs: f64) -> Self {
        Server {
            url: url.into(),
            timeout: Duration::from_secs_f64(timeout_secs),
        }
    }

    /// Concatenate the server URL with `path_id`'s parts beyond the dataset
    /// name, inserting `/` between the server URL and the first part if absent.
    pub fn resolve(&self, path_id: &PathId) -> String {
        let mut url = self.url.clone();
        for part in path_id.url_parts() {
            if !url.ends_with('/') {
                url.push('/');
            }
            url.push_str(part);
        }
        url
    }
}

/// Download progress: a delta report for one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    pub path_id: PathId,
    pub initial_bytes: i64,
    pub current_bytes: i64,
    pub final_bytes: i64,
    pub complete: bool,
}

fn hex_digest(hasher: Sha3_224) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Idempotent resumable download: skip if the final file already exists
/// (unless `force`), resume from a partial `.download` file via an HTTP
/// range request, restart fresh if the server rejects the range. `suffixed_path_id`
/// is the PathId with any compression suffix already appended (e.g. the `.br`
/// target, not the base file); `local_path` is `root.join(suffixed_path_id)`.
#[allow(clippy::too_many_arguments)]
pub fn download_file(
    client: &reqwest::blocking::Client,
    server: &Server,
    root: &Path,
    path_id: &PathId,
    suffixed_path_id: &PathId,
    force: bool,
    expected_size: Option<u64>,
    expected_hash: Option<&str>,
    mut on_progress: impl FnMut(Progress),
) -> Result<()> {
    let final_path = suffixed_path_id.local_path(root);
    let download_path = suffixed_path_id.with_suffix(crate::config::DOWNLOAD_SUFFIX).local_path(root);

    if !force && final_path.is_file() {
        on_progress(Progress {
            path_id: path_id.clone(),
            initial_bytes: 0,
            current_bytes: 0,
            final_bytes: 0,
            complete: true,
        });
        return Ok(());
    }

    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| UndrError::io(parent.display().to_string(), e))?;
    }

    let (mut file, mut hasher, resume_from): (std::fs::File, Sha3_224, u64) =
        if !force && download_path.is_file() {
            let existing_len = std::fs::metadata(&download_path)
                .map_err(|e| UndrError::io(download_path.display().to_string(), e))?
                .len();
            let mut hasher = Sha3_224::new();
            {
                let mut reader = std::fs::File::open(&download_path)
                    .map_err(|e| UndrError::io(download_path.display().to_string(), e))?;
                let mut buf = [0u8; CHUNK_SIZE];
                loop {
                    let n = reader.read(&mut buf).map_err(|e| UndrError::io(download_path.display().to_string(), e))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
            }
            let file = std::fs::OpenOptions::new()
                .append(true)
                .open(&download_path)
                .map_err(|e| UndrError::io(download_path.display().to_string(), e))?;
            on_progress(Progress {
                path_id: path_id.clone(),
                initial_bytes: existing_len as i64,
                current_bytes: 0,
                final_bytes: expected_size.unwrap_or(existing_len) as i64,
                complete: false,
            });
            (file, hasher, existing_len)
        } else {
            let file = std::fs::File::create(&download_path)
                .map_err(|e| UndrError::io(download_path.display().to_string(), e))?;
            (file, Sha3_224::new(), 0)
        };

    let url = server.resolve(suffixed_path_id);
    let use_range = resume_from > 0;
    let mut request = client.get(&url).timeout(server.timeout);
    if use_range {
        request = request.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
    }
    let response = request
        .send()
        .map_err(|source| UndrError::NetworkError { path_id: path_id.clone(), source })?;

    let status = response.status();
    let (mut file, mut hasher, stream_start) = if use_range {
        if status.as_u16() != 206 {
            // Server doesn't honor Range: roll back and restart fresh.
            on_progress(Progress {
                path_id: path_id.clone(),
                initial_bytes: 0,
                current_bytes: -(resume_from as i64),
                final_bytes: 0,
                complete: false,
            });
            drop(file);
            let file = std::fs::File::create(&download_path)
                .map_err(|e| UndrError::io(download_path.display().to_string(), e))?;
            let fresh_url = server.resolve(suffixed_path_id);
            let fresh = client
                .get(&fresh_url)
                .timeout(server.timeout)
                .send()
                .map_err(|source| UndrError::NetworkError { path_id: path_id.clone(), source })?;
            if !fresh.status().is_success() {
                return Err(UndrError::NetworkError {
                    path_id: path_id.clone(),
                    source: fresh.error_for_status().unwrap_err(),
                });
            }
            (file, Sha3_224::new(), fresh)
        } else {
            (file, hasher, response)
        }
    } else {
        if !status.is_success() {
            return Err(UndrError::NetworkError {
                path_id: path_id.clone(),
                source: response.error_for_status().unwrap_err(),
            });
        }
        (file, hasher, response)
    };

    stream_body_into(stream_start, &mut file, &mut hasher, path_id, expected_size, &mut on_progress)?;

    drop(file);
    let len = std::fs::metadata(&download_path)
        .map_err(|e| UndrError::io(download_path.display().to_string(), e))?
        .len();
    if let Some(expected) = expected_size {
        if expected != len {
            return Err(UndrError::SizeMismatch {
                path_id: path_id.clone(),
                expected,
                actual: len,
            });
        }
    }
    let digest = hex_digest(hasher);
    if let Some(expected) = expected_hash {
        if expected != digest {
            return Err(UndrError::HashMismatch {
                path_id: path_id.clone(),
                expected: expected.to_string(),
                actual: digest,
            });
        }
    }

    std::fs::rename(&download_path, &final_path)
        .map_err(|e| UndrError::io(final_path.display().to_string(), e))?;

    on_progress(Progress {
        path_id: path_id.clone(),
        initial_bytes: 0,
        current_bytes: 0,
        final_bytes: 0,
        complete: true,
    });

    Ok(())
}

fn stream_body_into(
    mut response: reqwest::blocking::Response,
    file: &mut std::fs::File,
    hasher: &mut Sha3_224,
    path_id: &PathId,
    expected_size: Option<u64>,
    on_progress: &mut impl FnMut(Progress),
) -> Result<()> {
    file.seek(SeekFrom::End(0)).map_err(|e| UndrError::io(path_id.to_string(), e))?;
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = response
            .read(&mut buf)
            .map_err(|e| UndrError::io(path_id.to_string(), e))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(|e| UndrError::io(path_id.to_string(), e))?;
        hasher.update(&buf[..n]);
        on_progress(Progress {
            path_id: path_id.clone(),
            initial_bytes: 0,
            current_bytes: n as i64,
            final_bytes: expected_size.map(|s| s as i64).unwrap_or(n as i64),
            complete: false,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_appends_parts_beyond_dataset() {
        let server = Server::new("https://example.org/a", 60.0);
        let path_id = PathId::new("a/b/c.es");
        assert_eq!(server.resolve(&path_id), "https://example.org/a/b/c.es");
    }

    #[test]
    fn resolve_inserts_slash_when_missing() {
        let server = Server::new("https://example.org/a", 60.0);
        let path_id = PathId::new("a/b");
        assert_eq!(server.resolve(&path_id), "https://example.org/a/b");
    }

    #[test]
    fn resolve_dataset_root_is_server_url() {
        let server = Server::new("https://example.org/a/", 60.0);
        let path_id = PathId::new("a");
        assert_eq!(server.resolve(&path_id), "https://example.org/a/");
    }
}
