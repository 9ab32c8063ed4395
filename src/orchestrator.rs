//! Orchestrator: seeds per-dataset `IndexTask`s, tracks each dataset's
//! indexing progress, and schedules `InstallTask`s once a dataset's indexing
//! completes and it isn't already fully downloaded and processed.

use crate::config::{Configuration, Mode};
use crate::error::{Result, UndrError};
use crate::index_store::IndexStore;
use crate::manifest::FileKind;
use crate::path_id::PathId;
use crate::remote::Server;
use crate::selector::{DoiSelector, InstallSelector, MapSelector, Selector};
use crate::store::{ReadOnlyStore, Store};
use crate::task::{ClosePolicy, Envelope, Message, WorkerPool};
use crate::tasks::{ChunkHandler, IndexTask, InstallTask, MapTask};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

struct IndexStatus {
    server: Server,
    selector: Arc<dyn Selector>,
    current_index_files: usize,
    final_index_files: usize,
    downloaded_and_processed: bool,
}

impl IndexStatus {
    /// Returns `true` once this dataset's indexing has fully completed.
    fn push(&mut self, message: &Message) -> bool {
        match message {
            Message::IndexLoaded { children, .. } => {
                self.final_index_files += children;
                false
            }
            Message::DirectoryScanned {
                download_bytes,
                process_bytes,
                ..
            } => {
                self.current_index_files += 1;
                if download_bytes.initial != download_bytes.r#final || process_bytes.initial != process_bytes.r#final {
                    self.downloaded_and_processed = false;
                }
                self.current_index_files == self.final_index_files
            }
            _ => false,
        }
    }
}

struct IndexesStatuses(HashMap<String, IndexStatus>);

impl IndexesStatuses {
    /// If `message` concerns one dataset's indexing, apply it and return
    /// `(dataset_name, indexing_just_completed)`.
    fn push(&mut self, message: &Message) -> Option<(String, bool)> {
        let path_id = match message {
            Message::IndexLoaded { path_id, .. } | Message::DirectoryScanned { path_id, .. } => path_id,
            _ => return None,
        };
        let dataset = path_id.dataset().to_string();
        let status = self.0.get_mut(&dataset)?;
        let complete = status.push(message);
        Some((dataset, complete))
    }
}

/// Run `install`: index every enabled dataset, then download (and, for
/// RAW-mode datasets, decompress) every selected file. `on_message` is
/// called for every message in arrival order (progress display hook).
pub fn run_install(
    config: &Configuration,
    workers: usize,
    force: bool,
    interrupted: &AtomicBool,
    mut on_message: impl FnMut(&Message),
) -> Result<()> {
    let datasets = config.enabled_datasets()?;
    let pool = WorkerPool::new(workers);
    let index_store = Arc::new(IndexStore::new());

    let mut statuses = IndexesStatuses(HashMap::new());
    for dataset in &datasets {
        let server = Server::new(dataset.url.clone(), dataset.timeout_secs());
        let selector: Arc<dyn Selector> = Arc::new(InstallSelector::new(dataset.mode));
        statuses.0.insert(
            dataset.name.clone(),
            IndexStatus {
                server: server.clone(),
                selector: selector.clone(),
                current_index_files: 0,
                final_index_files: 1,
                downloaded_and_processed: true,
            },
        );
        pool.manager().schedule(
            Box::new(IndexTask {
                root: config.directory.clone(),
                path_id: PathId::new(dataset.name.clone()),
                server,
                selector,
                index_store: index_store.clone(),
                priority: 0,
                force,
                directory_doi: false,
            }),
            0,
        );
    }

    for envelope in pool.messages() {
        match envelope {
            Envelope::Exception(exception) => {
                pool.shutdown(ClosePolicy::Cancel);
                return Err(UndrError::Config(exception.to_string()));
            }
            Envelope::Message(message) => {
                on_message(&message);
                if let Some((name, indexing_complete)) = statuses.push(&message) {
                    if indexing_complete {
                        let status = &statuses.0[&name];
                        if !status.downloaded_and_processed {
                            pool.manager().schedule(
                                Box::new(InstallTask {
                                    root: config.directory.clone(),
                                    path_id: PathId::new(name.clone()),
                                    server: status.server.clone(),
                                    selector: status.selector.clone(),
                                    index_store: index_store.clone(),
                                    priority: 1,
                                    force,
                                }),
                                1,
                            );
                        }
                    }
                }
            }
        }
        if crate::interrupt::requested(interrupted) {
            pool.shutdown(ClosePolicy::Cancel);
            return Err(UndrError::UserInterrupt);
        }
    }

    pool.shutdown(ClosePolicy::Join);
    Ok(())
}

/// Run `map`: index every enabled dataset with a [`MapSelector`], then drive
/// `handler` over every selected file's decoded chunks. If `store_path` is
/// given, a completed file's path_id is durably recorded there so a later
/// resumed run skips it (see [`MapSelector`]).
pub fn run_map(
    config: &Configuration,
    workers: usize,
    enabled_kinds: Vec<FileKind>,
    store_path: Option<&Path>,
    handler: ChunkHandler,
    interrupted: &AtomicBool,
    mut on_message: impl FnMut(&Message),
) -> Result<()> {
    let datasets = config.enabled_datasets()?;
    let pool = WorkerPool::new(workers);
    let index_store = Arc::new(IndexStore::new());

    let store = match store_path {
        Some(path) => Some(Store::open(path)?.0),
        None => None,
    };
    let read_store = match store_path {
        Some(path) => Some(ReadOnlyStore::open(path)?),
        None => None,
    };
    let selector: Arc<dyn Selector> = Arc::new(MapSelector::new(enabled_kinds, read_store));

    let mut statuses = IndexesStatuses(HashMap::new());
    for dataset in &datasets {
        let server = Server::new(dataset.url.clone(), dataset.timeout_secs());
        statuses.0.insert(
            dataset.name.clone(),
            IndexStatus {
                server: server.clone(),
                selector: selector.clone(),
                current_index_files: 0,
                final_index_files: 1,
                downloaded_and_processed: true,
            },
        );
        pool.manager().schedule(
            Box::new(IndexTask {
                root: config.directory.clone(),
                path_id: PathId::new(dataset.name.clone()),
                server: server.clone(),
                selector: selector.clone(),
                index_store: index_store.clone(),
                priority: 0,
                force: false,
                directory_doi: false,
            }),
            0,
        );
    }

    for envelope in pool.messages() {
        match envelope {
            Envelope::Exception(exception) => {
                pool.shutdown(ClosePolicy::Cancel);
                return Err(UndrError::Config(exception.to_string()));
            }
            Envelope::Message(message) => {
                on_message(&message);
                if let Message::Processed { path_id } = &message {
                    if let Some(store) = &store {
                        store.mark_complete(path_id.as_str());
                    }
                }
                if let Some((name, indexing_complete)) = statuses.push(&message) {
                    if indexing_complete {
                        let status = &statuses.0[&name];
                        if !status.downloaded_and_processed {
                            pool.manager().schedule(
                                Box::new(MapTask {
                                    root: config.directory.clone(),
                                    path_id: PathId::new(name.clone()),
                                    server: Some(status.server.clone()),
                                    selector: status.selector.clone(),
                                    index_store: index_store.clone(),
                                    handler: handler.clone(),
                                    priority: 1,
                                }),
                                1,
                            );
                        }
                    }
                }
            }
        }
        if crate::interrupt::requested(interrupted) {
            pool.shutdown(ClosePolicy::Cancel);
            return Err(UndrError::UserInterrupt);
        }
    }

    pool.shutdown(ClosePolicy::Join);
    if let Some(store) = &store {
        store.flush();
    }
    Ok(())
}

/// Run `bibtex`: index every enabled dataset with a DOI-only selector
/// (no downloads), collect the distinct DOIs encountered, and fetch a
/// bibtex entry for each. Returns one bibtex entry per distinct DOI,
/// preceded by a comment listing the path_ids it covers, sorted by DOI's
/// first path_id.
pub fn run_bibtex(
    config: &Configuration,
    workers: usize,
    timeout_secs: f64,
    interrupted: &AtomicBool,
    mut on_message: impl FnMut(&Message),
) -> Result<String> {
    let datasets = config.enabled_datasets()?;
    let pool = WorkerPool::new(workers);
    let index_store = Arc::new(IndexStore::new());
    let selector: Arc<dyn Selector> = Arc::new(DoiSelector);

    for dataset in &datasets {
        let server = Server::new(dataset.url.clone(), dataset.timeout_secs());
        pool.manager().schedule(
            Box::new(IndexTask {
                root: config.directory.clone(),
                path_id: PathId::new(dataset.name.clone()),
                server,
                selector: selector.clone(),
                index_store: index_store.clone(),
                priority: 0,
                force: false,
                directory_doi: false,
            }),
            0,
        );
    }

    let mut doi_to_path_ids: HashMap<String, Vec<PathId>> = HashMap::new();
    for envelope in pool.messages() {
        match envelope {
            Envelope::Exception(exception) => {
                pool.shutdown(ClosePolicy::Cancel);
                return Err(UndrError::Config(exception.to_string()));
            }
            Envelope::Message(message) => {
                on_message(&message);
                if let Message::Doi { path_id, doi } = &message {
                    doi_to_path_ids.entry(doi.clone()).or_default().push(path_id.clone());
                }
            }
        }
        if crate::interrupt::requested(interrupted) {
            pool.shutdown(ClosePolicy::Cancel);
            return Err(UndrError::UserInterrupt);
        }
    }
    pool.shutdown(ClosePolicy::Join);

    let client = reqwest::blocking::Client::new();
    let mut entries: Vec<(Vec<PathId>, String)> = Vec::new();
    for (doi, mut path_ids) in doi_to_path_ids {
        path_ids.sort();
        let bibtex = fetch_bibtex(&client, &doi, timeout_secs);
        entries.push((path_ids, bibtex));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut result = String::new();
    for (path_ids, bibtex) in entries {
        for path_id in &path_ids {
            result.push_str(&format!("% {path_id}\n"));
        }
        result.push_str(&bibtex);
        result.push('\n');
    }
    Ok(result)
}

fn fetch_bibtex(client: &reqwest::blocking::Client, doi: &str, timeout_secs: f64) -> String {
    let url = format!("https://dx.doi.org/{doi}");
    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/x-bibtex")
        .timeout(std::time::Duration::from_secs_f64(timeout_secs))
        .send();
    match response.and_then(|r| r.error_for_status()).and_then(|r| r.text()) {
        Ok(text) => text,
        Err(error) => format!("% fetching bibtex data from {url} failed, {error}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ByteCounter;

    fn scanned(download_done: bool, process_done: bool) -> Message {
        Message::DirectoryScanned {
            path_id: PathId::new("a"),
            initial_download_count: 0,
            initial_process_count: 0,
            final_count: 0,
            index_bytes: ByteCounter::default(),
            download_bytes: ByteCounter {
                initial: if download_done { 5 } else { 0 },
                r#final: 5,
            },
            process_bytes: ByteCounter {
                initial: if process_done { 5 } else { 0 },
                r#final: 5,
            },
        }
    }

    #[test]
    fn index_status_completes_once_counts_match() {
        let mut status = IndexStatus {
            server: Server::new("https://example.org", 1.0),
            selector: Arc::new(InstallSelector::new(Mode::Raw)),
            current_index_files: 0,
            final_index_files: 1,
            downloaded_and_processed: true,
        };
        assert!(status.push(&scanned(true, true)));
        assert!(status.downloaded_and_processed);
    }

    #[test]
    fn index_status_flags_incomplete_download() {
        let mut status = IndexStatus {
            server: Server::new("https://example.org", 1.0),
            selector: Arc::new(InstallSelector::new(Mode::Raw)),
            current_index_files: 0,
            final_index_files: 1,
            downloaded_and_processed: true,
        };
        status.push(&scanned(false, true));
        assert!(!status.downloaded_and_processed);
    }
}
