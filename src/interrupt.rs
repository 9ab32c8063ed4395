//! Ctrl-C handling: a single process-wide flag the orchestrator polls
//! between messages so `install`/`bibtex` exit cleanly instead of leaving
//! partial `.download`/`.decompress` files in an inconsistent state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Install the SIGINT handler once and return the flag it sets. Calling this
/// more than once per process panics (`ctrlc`'s own restriction), so callers
/// should call it exactly once, at `main`.
pub fn register() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let flag_for_handler = flag.clone();
    ctrlc::set_handler(move || {
        flag_for_handler.store(true, Ordering::SeqCst);
    })
    .expect("ctrlc handler registers exactly once per process");
    flag
}

pub fn requested(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}
