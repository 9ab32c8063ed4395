//! Install task: the exact 0-4 `actual_action` decision table deciding,
//! per file, whether to skip, download, decompress, or both.

use crate::compression::Compression;
use crate::config::{CHUNK_SIZE, DECOMPRESS_SUFFIX};
use crate::error::{Result, UndrError};
use crate::index_store::IndexStore;
use crate::path_id::PathId;
use crate::remote::{download_file, Progress, Server};
use crate::selector::{Action, Selector};
use crate::task::{Chain, Manager, Message, Phase, Task};
use sha3::{Digest, Sha3_224};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// What to actually do for one file, given its selector action and current
/// on-disk state. Named to mirror the originating decision table; `Noop`
/// stands in for action 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ActualAction {
    Noop,
    DownloadOnly,
    DownloadThenReportDecompressed,
    DownloadThenDecompress,
    DecompressOnly,
}

fn actual_action(
    force: bool,
    action: Action,
    best_compression_is_none: bool,
    raw_present: bool,
    compressed_present: bool,
) -> ActualAction {
    if force {
        if action == Action::Download {
            ActualAction::DownloadOnly
        } else if best_compression_is_none {
            ActualAction::DownloadThenReportDecompressed
        } else {
            ActualAction::DownloadThenDecompress
        }
    } else if raw_present {
        ActualAction::Noop
    } else if action == Action::Download {
        if compressed_present {
            ActualAction::Noop
        } else {
            ActualAction::DownloadOnly
        }
    } else if best_compression_is_none {
        ActualAction::DownloadThenReportDecompressed
    } else if compressed_present {
        ActualAction::DecompressOnly
    } else {
        ActualAction::DownloadThenDecompress
    }
}

pub struct InstallTask {
    pub root: PathBuf,
    pub path_id: PathId,
    pub server: Server,
    pub selector: Arc<dyn Selector>,
    pub index_store: Arc<IndexStore>,
    pub priority: usize,
    pub force: bool,
}

impl Task for InstallTask {
    fn path_id(&self) -> Option<PathId> {
        Some(self.path_id.clone())
    }

    fn run(&mut self, _client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
        let directory = self.index_store.load(&self.root, &self.path_id)?;
        let local_dir = self.path_id.local_path(&self.root);

        let names: HashSet<String> = if self.selector.scan_filesystem() {
            std::fs::read_dir(&local_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        } else {
            HashSet::new()
        };

        for file in directory.files.iter().chain(directory.other_files.iter()) {
            // Only DOWNLOAD/DECOMPRESS selectors drive this task; PROCESS is
            // MapTask's concern (it streams through File::chunks() instead of
            // persisting a decompressed copy, so it never reaches here).
            let action = self.selector.action(file);
            if action.install_ignores() || action == Action::Process {
                continue;
            }

            let raw_name = file.path_id.as_str().rsplit('/').next().unwrap_or_default().to_string();
            let compression = file.best_compression().clone();
            let compressed_name = format!("{raw_name}{}", compression.suffix());

            let decision = actual_action(
                self.force,
                action,
                matches!(compression, Compression::None { .. }),
                names.contains(&raw_name),
                names.contains(&compressed_name),
            );
            if decision == ActualAction::Noop {
                continue;
            }

            let download_task: Box<dyn Task> = Box::new(DownloadTask {
                root: self.root.clone(),
                path_id: file.path_id.clone(),
                suffix: compression.suffix().to_string(),
                server: self.server.clone(),
                force: self.force,
                expected_size: compression.compressed_size(),
                expected_hash: compression.compressed_hash().to_string(),
            });
            let decompress_task = || -> Box<dyn Task> {
                Box::new(DecompressTask {
                    root: self.root.clone(),
                    path_id: file.path_id.clone(),
                    compression: compression.clone(),
                    expected_size: file.size,
                    expected_hash: file.hash.clone(),
                    word_size: file.word_size(),
                })
            };

            match decision {
                ActualAction::Noop => unreachable!(),
                ActualAction::DownloadOnly => manager.schedule(download_task, self.priority),
                ActualAction::DownloadThenReportDecompressed => manager.schedule(
                    Box::new(Chain(vec![
                        download_task,
                        Box::new(UncompressedDecodeProgress {
                            path_id: file.path_id.clone(),
                            size: file.size,
                        }),
                    ])),
                    self.priority,
                ),
                ActualAction::DownloadThenDecompress => manager.schedule(
                    Box::new(Chain(vec![download_task, decompress_task()])),
                    self.priority,
                ),
                ActualAction::DecompressOnly => manager.schedule(decompress_task(), self.priority),
            }
        }

        for child in &directory.child_dirs {
            manager.schedule(
                Box::new(InstallTask {
                    root: self.root.clone(),
                    path_id: child.path_id.clone(),
                    server: self.server.clone(),
                    selector: self.selector.clone(),
                    index_store: self.index_store.clone(),
                    priority: self.priority,
                    force: self.force,
                }),
                self.priority,
            );
        }

        Ok(())
    }
}

struct DownloadTask {
    root: PathBuf,
    path_id: PathId,
    suffix: String,
    server: Server,
    force: bool,
    expected_size: u64,
    expected_hash: String,
}

impl Task for DownloadTask {
    fn path_id(&self) -> Option<PathId> {
        Some(self.path_id.clone())
    }

    fn run(&mut self, client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
        let suffixed = self.path_id.with_suffix(&self.suffix);
        download_file(
            client,
            &self.server,
            &self.root,
            &self.path_id,
            &suffixed,
            self.force,
            Some(self.expected_size),
            Some(&self.expected_hash),
            |progress| manager.send_message(Message::Progress { phase: Phase::Download, progress }),
        )?;
        Ok(())
    }
}

/// A no-op decompression step reported for `NoneCompression` files: the
/// downloaded bytes already are the final file, but callers still expect a
/// decompress-phase completion message.
struct UncompressedDecodeProgress {
    path_id: PathId,
    size: u64,
}

impl Task for UncompressedDecodeProgress {
    fn path_id(&self) -> Option<PathId> {
        Some(self.path_id.clone())
    }

    fn run(&mut self, _client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
        manager.send_message(Message::Progress {
            phase: Phase::Decompress,
            progress: Progress {
                path_id: self.path_id.clone(),
                initial_bytes: 0,
                current_bytes: self.size as i64,
                final_bytes: 0,
                complete: true,
            },
        });
        Ok(())
    }
}

struct DecompressTask {
    root: PathBuf,
    path_id: PathId,
    compression: Compression,
    expected_size: u64,
    expected_hash: String,
    word_size: usize,
}

impl Task for DecompressTask {
    fn path_id(&self) -> Option<PathId> {
        Some(self.path_id.clone())
    }

    fn run(&mut self, _client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
        decompress_to_disk(
            &self.root,
            &self.path_id,
            &self.compression,
            self.expected_size,
            &self.expected_hash,
            self.word_size,
            manager,
        )
        .map_err(anyhow::Error::from)?;

        let compressed_path = self.path_id.with_suffix(self.compression.suffix()).local_path(&self.root);
        std::fs::remove_file(&compressed_path).ok();
        Ok(())
    }
}

/// Streams `<root>/<path_id><suffix>` through its decoder into
/// `<root>/<path_id>`, verifying size and hash, reporting decompress
/// progress along the way. Does not remove the compressed source; callers
/// decide whether to keep it.
fn decompress_to_disk(
    root: &std::path::Path,
    path_id: &PathId,
    compression: &Compression,
    expected_size: u64,
    expected_hash: &str,
    word_size: usize,
    manager: &dyn Manager,
) -> Result<()> {
    let compressed_path = path_id.with_suffix(compression.suffix()).local_path(root);
    let final_path = path_id.local_path(root);
    let tmp_path = path_id.with_suffix(DECOMPRESS_SUFFIX).local_path(root);

    let mut input = std::fs::File::open(&compressed_path).map_err(|e| UndrError::io(compressed_path.display().to_string(), e))?;
    let mut output = std::fs::File::create(&tmp_path).map_err(|e| UndrError::io(tmp_path.display().to_string(), e))?;
    let mut decoder = compression.decoder(word_size);
    let mut hasher = Sha3_224::new();
    let mut total = 0u64;
    let mut buf = [0u8; CHUNK_SIZE];

    let mut write_chunk = |chunk: &[u8], output: &mut std::fs::File, hasher: &mut Sha3_224, total: &mut u64| -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        output.write_all(chunk).map_err(|e| UndrError::io(tmp_path.display().to_string(), e))?;
        hasher.update(chunk);
        *total += chunk.len() as u64;
        manager.send_message(Message::Progress {
            phase: Phase::Decompress,
            progress: Progress {
                path_id: path_id.clone(),
                initial_bytes: 0,
                current_bytes: chunk.len() as i64,
                final_bytes: expected_size as i64,
                complete: false,
            },
        });
        Ok(())
    };

    loop {
        let n = input.read(&mut buf).map_err(|e| UndrError::io(compressed_path.display().to_string(), e))?;
        if n == 0 {
            break;
        }
        let decompressed = decoder.decompress(&buf[..n])?;
        write_chunk(&decompressed, &mut output, &mut hasher, &mut total)?;
    }
    let (last, residual) = decoder.finish()?;
    write_chunk(&last, &mut output, &mut hasher, &mut total)?;
    if !residual.is_empty() {
        return Err(UndrError::TrailingBytes {
            path_id: path_id.clone(),
            word_size,
            remaining: residual.len(),
        });
    }
    drop(output);

    if total != expected_size {
        std::fs::remove_file(&tmp_path).ok();
        return Err(UndrError::SizeMismatch {
            path_id: path_id.clone(),
            expected: expected_size,
            actual: total,
        });
    }
    let digest: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
    if digest != expected_hash {
        std::fs::remove_file(&tmp_path).ok();
        return Err(UndrError::HashMismatch {
            path_id: path_id.clone(),
            expected: expected_hash.to_string(),
            actual: digest,
        });
    }

    std::fs::rename(&tmp_path, &final_path).map_err(|e| UndrError::io(final_path.display().to_string(), e))?;
    manager.send_message(Message::Progress {
        phase: Phase::Decompress,
        progress: Progress {
            path_id: path_id.clone(),
            initial_bytes: 0,
            current_bytes: 0,
            final_bytes: 0,
            complete: true,
        },
    });
    Ok(())
}
