//! Task & worker pool: priority-queued task dispatch, cross-worker
//! messaging, lifecycle.

mod manager;
mod pool;

pub use manager::{
    ByteCounter, Chain, ClosePolicy, Envelope, Manager, Message, NullManager, Phase, Task,
    WorkerException,
};
pub use pool::WorkerPool;
