//! Task and message types shared by every worker-pool implementation.

use crate::path_id::PathId;
use crate::remote::Progress;

/// An operation with `run(client, manager)`. Implementors do their own I/O;
/// the worker pool only dispatches and collects messages.
pub trait Task: Send {
    fn run(&mut self, client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()>;

    /// The resource this task concerns, if any — attached to a [`WorkerException`]
    /// when `run` fails so the exception message names what it was working on.
    fn path_id(&self) -> Option<PathId> {
        None
    }
}

/// Runs its children sequentially within one worker slot (used for
/// download-then-decompress). A failure in any child aborts the chain.
pub struct Chain(pub Vec<Box<dyn Task>>);

impl Task for Chain {
    fn run(&mut self, client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
        for task in &mut self.0 {
            task.run(client, manager)?;
        }
        Ok(())
    }

    fn path_id(&self) -> Option<PathId> {
        self.0.first().and_then(|t| t.path_id())
    }
}

/// `{initial, final}` byte accounting pair used by `DirectoryScanned`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ByteCounter {
    pub initial: i64,
    pub r#final: i64,
}

impl ByteCounter {
    pub fn done(&self) -> bool {
        self.initial == self.r#final
    }
}

/// Which streaming phase a [`Progress`] report belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Download,
    Decompress,
}

/// Every message carries a `path_id` (or is an exception). Messages are
/// delivered in the order the manager receives them from workers.
#[derive(Clone, Debug)]
pub enum Message {
    /// One per directory: the number of child indices just scheduled.
    IndexLoaded { path_id: PathId, children: usize },
    /// One per directory: per-file accounting for its contents. Counts and
    /// byte totals exclude `-index.json` itself except for `index_bytes`.
    DirectoryScanned {
        path_id: PathId,
        initial_download_count: usize,
        initial_process_count: usize,
        final_count: usize,
        index_bytes: ByteCounter,
        download_bytes: ByteCounter,
        process_bytes: ByteCounter,
    },
    /// A file (or directory) declared a DOI in its manifest.
    Doi { path_id: PathId, doi: String },
    /// A download or decompress progress delta.
    Progress { phase: Phase, progress: Progress },
    /// A user message produced by a `ProcessFile` handler, wrapped in an envelope.
    UserMessage { path_id: PathId, payload: serde_json::Value },
    /// Emitted after a Map task's ProcessFile completes, for the durable Store.
    Processed { path_id: PathId },
    /// A non-fatal per-file error (e.g. doctor-mode invariant violations).
    Error { path_id: PathId, message: String },
}

/// A worker exception: wraps a task's failure and its originating path, if any.
#[derive(Clone, Debug)]
pub struct WorkerException {
    pub path_id: Option<PathId>,
    pub message: String,
}

impl std::fmt::Display for WorkerException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path_id {
            Some(p) => write!(f, "worker exception for \"{p}\": {}", self.message),
            None => write!(f, "worker exception: {}", self.message),
        }
    }
}

/// What the consumer loop receives: a regular message, or a task failure.
/// Every message carries a `path_id`, or is an exception.
#[derive(Clone, Debug)]
pub enum Envelope {
    Message(Message),
    Exception(WorkerException),
}

/// `JOIN` drains the message queue then stops workers; `CANCEL` stops
/// workers immediately without draining; `KILL` terminates workers forcibly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClosePolicy {
    Join,
    Cancel,
    Kill,
}

/// Scheduling and messaging surface a [`Task`] sees. Implemented by
/// [`crate::task::WorkerPool`]'s handle and by [`NullManager`].
pub trait Manager: Send + Sync {
    fn schedule(&self, task: Box<dyn Task>, priority: usize);
    fn send_message(&self, message: Message);
}

/// A manager that drops everything. Used when running a [`Task`] outside a
/// pool (e.g. the File abstraction's synchronous local read path).
pub struct NullManager;

impl Manager for NullManager {
    fn schedule(&self, _task: Box<dyn Task>, _priority: usize) {}
    fn send_message(&self, _message: Message) {}
}
