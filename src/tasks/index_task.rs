//! Index task: downloads one directory's `-index.json`, schedules a
//! child `IndexTask` per subdirectory, and reports per-file byte accounting
//! for the download/process stages that will follow.

use crate::config::DOWNLOAD_SUFFIX;
use crate::index_store::IndexStore;
use crate::path_id::PathId;
use crate::remote::{download_file, Server};
use crate::selector::{Action, Selector};
use crate::task::{ByteCounter, Manager, Message, Task};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub struct IndexTask {
    pub root: PathBuf,
    pub path_id: PathId,
    pub server: Server,
    pub selector: Arc<dyn Selector>,
    pub index_store: Arc<IndexStore>,
    pub priority: usize,
    pub force: bool,
    pub directory_doi: bool,
}

impl Task for IndexTask {
    fn path_id(&self) -> Option<PathId> {
        Some(self.path_id.clone())
    }

    fn run(&mut self, client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
        let index_path_id = self.path_id.join("-index.json");
        let local_dir = self.path_id.local_path(&self.root);
        std::fs::create_dir_all(&local_dir)?;

        let final_path = index_path_id.local_path(&self.root);
        let partial_path = index_path_id.with_suffix(DOWNLOAD_SUFFIX).local_path(&self.root);
        let mut index_bytes = ByteCounter::default();
        if !self.force {
            if let Ok(meta) = std::fs::metadata(&final_path) {
                index_bytes.initial = meta.len() as i64;
            } else if let Ok(meta) = std::fs::metadata(&partial_path) {
                index_bytes.initial = meta.len() as i64;
            }
        }

        download_file(
            client,
            &self.server,
            &self.root,
            &index_path_id,
            &index_path_id,
            self.force,
            None,
            None,
            |progress| manager.send_message(Message::Progress {
                phase: crate::task::Phase::Download,
                progress,
            }),
        )?;
        index_bytes.r#final = std::fs::metadata(&final_path)?.len() as i64;

        let directory = self.index_store.load(&self.root, &self.path_id)?;

        manager.send_message(Message::IndexLoaded {
            path_id: self.path_id.clone(),
            children: directory.child_dirs.len(),
        });

        for child in &directory.child_dirs {
            manager.schedule(
                Box::new(IndexTask {
                    root: self.root.clone(),
                    path_id: child.path_id.clone(),
                    server: self.server.clone(),
                    selector: self.selector.clone(),
                    index_store: self.index_store.clone(),
                    priority: self.priority,
                    force: self.force,
                    directory_doi: self.directory_doi,
                }),
                self.priority,
            );
        }

        let name_to_size: HashMap<String, u64> = if self.selector.scan_filesystem() {
            std::fs::read_dir(&local_dir)?
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let size = e.metadata().ok()?.len();
                    Some((e.file_name().to_string_lossy().into_owned(), size))
                })
                .collect()
        } else {
            HashMap::new()
        };

        if self.directory_doi {
            if let Some(doi) = &directory.own_doi {
                manager.send_message(Message::Doi {
                    path_id: self.path_id.clone(),
                    doi: doi.clone(),
                });
            }
        }

        let mut initial_download_count = 0usize;
        let mut initial_process_count = 0usize;
        let mut final_count = 0usize;
        let mut download_bytes = ByteCounter::default();
        let mut process_bytes = ByteCounter::default();

        for file in directory.files.iter().chain(directory.other_files.iter()) {
            let action = self.selector.action(file);
            if action == Action::Ignore {
                continue;
            }
            if action == Action::Doi {
                if let Some(doi) = &file.own_doi {
                    manager.send_message(Message::Doi {
                        path_id: file.path_id.clone(),
                        doi: doi.clone(),
                    });
                }
                continue;
            }

            final_count += 1;
            if !action.reports_download() {
                continue;
            }
            let compressed_size = file.best_compression().compressed_size() as i64;
            download_bytes.r#final += compressed_size;
            if action.reports_process() {
                process_bytes.r#final += file.size as i64;
            }

            if action.is_skip() {
                initial_download_count += 1;
                download_bytes.initial += compressed_size;
                if action.reports_process() {
                    initial_process_count += 1;
                    process_bytes.initial += file.size as i64;
                }
            } else if !self.force {
                let raw_name = file.path_id.as_str().rsplit('/').next().unwrap_or_default();
                let compressed_name = format!("{raw_name}{}", file.best_compression().suffix());
                if name_to_size.contains_key(raw_name) {
                    initial_download_count += 1;
                    download_bytes.initial += compressed_size;
                    if action.reports_process() {
                        initial_process_count += 1;
                        process_bytes.initial += file.size as i64;
                    }
                } else if name_to_size.contains_key(&compressed_name) {
                    initial_download_count += 1;
                    download_bytes.initial += compressed_size;
                } else if action != Action::Process {
                    let partial_compressed_name = format!("{compressed_name}{DOWNLOAD_SUFFIX}");
                    if let Some(size) = name_to_size.get(&partial_compressed_name) {
                        download_bytes.initial += *size as i64;
                    }
                }
            }
        }

        manager.send_message(Message::DirectoryScanned {
            path_id: self.path_id.clone(),
            initial_download_count,
            initial_process_count,
            final_count,
            index_bytes,
            download_bytes,
            process_bytes,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::selector::InstallSelector;

    #[test]
    fn child_index_tasks_inherit_force_and_priority() {
        let root = std::env::temp_dir();
        let task = IndexTask {
            root: root.clone(),
            path_id: PathId::new("a"),
            server: Server::new("https://example.org", 1.0),
            selector: Arc::new(InstallSelector::new(Mode::Raw)),
            index_store: Arc::new(IndexStore::new()),
            priority: 0,
            force: true,
            directory_doi: true,
        };
        assert!(task.force);
        assert_eq!(task.priority, 0);
    }
}
