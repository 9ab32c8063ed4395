//! Concrete tasks: indexing, installing, and mapping, each
//! recursing over a dataset's directory tree via the worker pool.

mod index_task;
mod install_task;
mod map_task;

pub use index_task::IndexTask;
pub use install_task::InstallTask;
pub use map_task::{ChunkHandler, MapTask};
