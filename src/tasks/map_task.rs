//! Map task: recursively schedules one `ProcessFileTask` per selected
//! file, each streaming decoded chunks to a user-supplied handler.

use crate::error::Result;
use crate::file::File;
use crate::formats::Switch;
use crate::index_store::IndexStore;
use crate::manifest::FileKind;
use crate::path_id::PathId;
use crate::remote::Server;
use crate::selector::{Action, Selector};
use crate::task::{Manager, Message, Task};
use std::path::PathBuf;
use std::sync::Arc;

/// Invoked once per decoded chunk: `(path_id, file_kind, bytes)`. A `Some`
/// return value is published as a `Message::UserMessage` payload.
pub type ChunkHandler = Arc<dyn Fn(&PathId, FileKind, &[u8]) -> Result<Option<serde_json::Value>> + Send + Sync>;

pub struct MapTask {
    pub root: PathBuf,
    pub path_id: PathId,
    pub server: Option<Server>,
    pub selector: Arc<dyn Selector>,
    pub index_store: Arc<IndexStore>,
    pub handler: ChunkHandler,
    pub priority: usize,
}

impl Task for MapTask {
    fn path_id(&self) -> Option<PathId> {
        Some(self.path_id.clone())
    }

    fn run(&mut self, _client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
        let directory = self.index_store.load(&self.root, &self.path_id)?;

        for file in directory.files.iter().chain(directory.other_files.iter()) {
            if self.selector.action(file) != Action::Process {
                continue;
            }
            manager.schedule(
                Box::new(ProcessFileTask {
                    root: self.root.clone(),
                    path_id: file.path_id.clone(),
                    server: self.server.clone(),
                    descriptor: file.clone(),
                    handler: self.handler.clone(),
                }),
                self.priority,
            );
        }

        for child in &directory.child_dirs {
            manager.schedule(
                Box::new(MapTask {
                    root: self.root.clone(),
                    path_id: child.path_id.clone(),
                    server: self.server.clone(),
                    selector: self.selector.clone(),
                    index_store: self.index_store.clone(),
                    handler: self.handler.clone(),
                    priority: self.priority,
                }),
                self.priority,
            );
        }

        Ok(())
    }
}

struct ProcessFileTask {
    root: PathBuf,
    path_id: PathId,
    server: Option<Server>,
    descriptor: crate::manifest::FileDescriptor,
    handler: ChunkHandler,
}

impl Task for ProcessFileTask {
    fn path_id(&self) -> Option<PathId> {
        Some(self.path_id.clone())
    }

    fn run(&mut self, client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
        let file = File::new(self.path_id.clone(), &self.root, self.server.as_ref(), &self.descriptor);
        let kind = self.descriptor.kind;
        let path_id = self.path_id.clone();
        let handler = &self.handler;

        let mut handle_dvs = |chunk: &[u8]| (handler)(&path_id, kind, chunk);
        let mut handle_aps = |chunk: &[u8], _w: u32, _h: u32| (handler)(&path_id, kind, chunk);
        let mut handle_imu = |chunk: &[u8]| (handler)(&path_id, kind, chunk);
        let mut handle_other = |chunk: &[u8]| (handler)(&path_id, kind, chunk);
        let mut switch = Switch {
            handle_dvs: &mut handle_dvs,
            handle_aps: &mut handle_aps,
            handle_imu: &mut handle_imu,
            handle_other: &mut handle_other,
        };

        file.chunks(
            client,
            |phase, progress| manager.send_message(Message::Progress { phase, progress }),
            |chunk| {
                if let Some(payload) = switch.dispatch(kind, chunk)? {
                    manager.send_message(Message::UserMessage {
                        path_id: path_id.clone(),
                        payload,
                    });
                }
                Ok(())
            },
        )?;
        manager.send_message(Message::Processed {
            path_id: self.path_id.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compression;
    use crate::manifest::FileDescriptor;
    use crate::selector::MapSelector;
    use crate::task::{ClosePolicy, Envelope, WorkerPool};
    use sha3::{Digest, Sha3_224};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn process_file_task_streams_chunks_to_handler() {
        let data = b"hello undr".to_vec();
        let hash: String = Sha3_224::digest(&data).iter().map(|b| format!("{b:02x}")).collect();
        let root = std::env::temp_dir().join(format!("undr-map-{}", std::process::id()));
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("a/x.bin"), &data).unwrap();

        let descriptor = FileDescriptor {
            path_id: PathId::new("a/x.bin"),
            size: data.len() as u64,
            hash,
            own_doi: None,
            metadata: serde_json::Value::Null,
            compressions: vec![Compression::None {
                compressed_size: data.len() as u64,
                compressed_hash: String::new(),
            }],
            kind: FileKind::Other,
        };

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let handler: ChunkHandler = Arc::new(move |_path_id, _kind, chunk| {
            seen_clone.fetch_add(chunk.len(), Ordering::SeqCst);
            Ok(Some(serde_json::json!(chunk.len())))
        });

        let pool = WorkerPool::new(1);
        pool.manager().schedule(
            Box::new(ProcessFileTask {
                root: root.clone(),
                path_id: PathId::new("a/x.bin"),
                server: None,
                descriptor,
                handler,
            }),
            0,
        );
        let envelopes: Vec<_> = pool.messages().collect();
        pool.shutdown(ClosePolicy::Cancel);

        assert_eq!(seen.load(Ordering::SeqCst), data.len());
        let user_messages = envelopes
            .iter()
            .filter(|e| matches!(e, Envelope::Message(Message::UserMessage { .. })))
            .count();
        assert_eq!(user_messages, 1);
        assert!(envelopes.iter().any(|e| matches!(e, Envelope::Message(Message::Processed { .. }))));
        assert!(envelopes.iter().any(|e| matches!(
            e,
            Envelope::Message(Message::Progress { progress, .. }) if progress.complete
        )));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn map_selector_filters_out_unselected_kinds() {
        let selector = MapSelector::new(vec![FileKind::Dvs], None);
        assert_eq!(selector.action(&FileDescriptor {
            path_id: PathId::new("a/x"),
            size: 0,
            hash: String::new(),
            own_doi: None,
            metadata: serde_json::Value::Null,
            compressions: vec![Compression::None { compressed_size: 0, compressed_hash: String::new() }],
            kind: FileKind::Other,
        }), Action::Ignore);
    }
}
