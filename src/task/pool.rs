//! Worker pool: OS threads plus `crossbeam-channel` priority queues.
//!
//! Implements the ordering and bookkeeping contracts of a multiprocess/TCP
//! worker design with threads and in-process channels rather than a wire
//! protocol: same priority-queue and exception-propagation behavior, no
//! process boundary to cross.

use super::manager::{Envelope, Manager, Message, Task, WorkerException};
use crate::config::WORKER_POLL_PERIOD_MS;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Exactly two priority levels are used by the core (0 = index/crawl work, 1
/// = install/process work), but the pool itself is not hardcoded further
/// than this array length.
const NUM_PRIORITIES: usize = 2;

struct Queues {
    senders: Vec<Sender<Box<dyn Task>>>,
    receivers: Vec<Receiver<Box<dyn Task>>>,
}

fn priority_queues() -> Queues {
    let mut senders = Vec::with_capacity(NUM_PRIORITIES);
    let mut receivers = Vec::with_capacity(NUM_PRIORITIES);
    for _ in 0..NUM_PRIORITIES {
        let (tx, rx) = crossbeam_channel::unbounded();
        senders.push(tx);
        receivers.push(rx);
    }
    Queues { senders, receivers }
}

/// A `Manager` handle cloned into every worker thread and also usable from
/// the orchestrator thread to seed top-level tasks.
#[derive(Clone)]
pub struct ManagerHandle {
    senders: Arc<Vec<Sender<Box<dyn Task>>>>,
    tasks_in_flight: Arc<AtomicUsize>,
    envelope_tx: Sender<Envelope>,
}

impl Manager for ManagerHandle {
    fn schedule(&self, task: Box<dyn Task>, priority: usize) {
        self.tasks_in_flight.fetch_add(1, Ordering::SeqCst);
        let priority = priority.min(self.senders.len() - 1);
        self.senders[priority]
            .send(task)
            .expect("worker pool outlives every scheduler");
    }

    fn send_message(&self, message: Message) {
        let _ = self.envelope_tx.send(Envelope::Message(message));
    }
}

/// Parallel worker threads pulling from priority queues, lowest-number-first.
pub struct WorkerPool {
    manager: ManagerHandle,
    envelope_rx: Receiver<Envelope>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        let queues = priority_queues();
        let tasks_in_flight = Arc::new(AtomicUsize::new(0));
        let (envelope_tx, envelope_rx) = crossbeam_channel::unbounded();
        let manager = ManagerHandle {
            senders: Arc::new(queues.senders),
            tasks_in_flight: tasks_in_flight.clone(),
            envelope_tx: envelope_tx.clone(),
        };
        let stop = Arc::new(AtomicBool::new(false));

        let receivers: Arc<Vec<Receiver<Box<dyn Task>>>> = Arc::new(queues.receivers);
        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let receivers = receivers.clone();
            let tasks_in_flight = tasks_in_flight.clone();
            let envelope_tx = envelope_tx.clone();
            let manager = manager.clone();
            let stop = stop.clone();
            handles.push(std::thread::spawn(move || {
                worker_loop(&receivers, &tasks_in_flight, &envelope_tx, &manager, &stop);
            }));
        }

        WorkerPool {
            manager,
            envelope_rx,
            stop,
            handles,
        }
    }

    pub fn manager(&self) -> ManagerHandle {
        self.manager.clone()
    }

    /// Single-threaded consumer iterator: yields until the message queue is
    /// empty AND `tasks_in_flight == 0`.
    pub fn messages(&self) -> Messages<'_> {
        Messages { pool: self }
    }

    /// `JOIN` drains the message queue then stops workers; `CANCEL` stops
    /// workers immediately without draining; `KILL` terminates workers
    /// forcibly (here: same as CANCEL, since OS threads can't be killed
    /// from the outside — in-flight work still finishes its current task).
    pub fn shutdown(mut self, policy: super::ClosePolicy) {
        match policy {
            super::ClosePolicy::Join => {
                for _ in self.messages() {}
                self.stop.store(true, Ordering::SeqCst);
            }
            super::ClosePolicy::Cancel | super::ClosePolicy::Kill => {
                self.stop.store(true, Ordering::SeqCst);
            }
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    receivers: &[Receiver<Box<dyn Task>>],
    tasks_in_flight: &AtomicUsize,
    envelope_tx: &Sender<Envelope>,
    manager: &ManagerHandle,
    stop: &AtomicBool,
) {
    let client = reqwest::blocking::Client::new();
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let mut picked = None;
        for rx in receivers {
            if let Ok(task) = rx.try_recv() {
                picked = Some(task);
                break;
            }
        }
        let Some(mut task) = picked else {
            std::thread::sleep(Duration::from_millis(WORKER_POLL_PERIOD_MS));
            continue;
        };

        let path_id = task.path_id();
        let outcome = catch_unwind(AssertUnwindSafe(|| task.run(&client, manager)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = envelope_tx.send(Envelope::Exception(WorkerException {
                    path_id,
                    message: format!("{err:#}"),
                }));
            }
            Err(panic) => {
                let payload = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                let message = crate::error::UndrError::WorkerPanic(payload).to_string();
                let _ = envelope_tx.send(Envelope::Exception(WorkerException { path_id, message }));
            }
        }
        tasks_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Messages<'a> {
    pool: &'a WorkerPool,
}

impl<'a> Iterator for Messages<'a> {
    type Item = Envelope;

    fn next(&mut self) -> Option<Envelope> {
        loop {
            match self.pool.envelope_rx.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(crossbeam_channel::TryRecvError::Disconnected) => return None,
                Err(crossbeam_channel::TryRecvError::Empty) => {
                    if self.pool.manager.tasks_in_flight.load(Ordering::SeqCst) == 0 {
                        return None;
                    }
                    match self
                        .pool
                        .envelope_rx
                        .recv_timeout(Duration::from_millis(WORKER_POLL_PERIOD_MS))
                    {
                        Ok(envelope) => return Some(envelope),
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return None,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_id::PathId;

    struct Noop;
    impl Task for Noop {
        fn run(&mut self, _client: &reqwest::blocking::Client, manager: &dyn Manager) -> anyhow::Result<()> {
            manager.send_message(Message::Processed {
                path_id: PathId::new("a/b"),
            });
            Ok(())
        }
    }

    struct Failing;
    impl Task for Failing {
        fn run(&mut self, _client: &reqwest::blocking::Client, _manager: &dyn Manager) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }

        fn path_id(&self) -> Option<PathId> {
            Some(PathId::new("a/bad"))
        }
    }

    #[test]
    fn drains_once_tasks_in_flight_reaches_zero() {
        let pool = WorkerPool::new(2);
        pool.manager().schedule(Box::new(Noop), 0);
        let envelopes: Vec<_> = pool.messages().collect();
        assert_eq!(envelopes.len(), 1);
        assert!(matches!(envelopes[0], Envelope::Message(Message::Processed { .. })));
        pool.shutdown(super::super::ClosePolicy::Cancel);
    }

    #[test]
    fn task_failure_becomes_exception() {
        let pool = WorkerPool::new(1);
        pool.manager().schedule(Box::new(Failing), 1);
        let envelopes: Vec<_> = pool.messages().collect();
        assert_eq!(envelopes.len(), 1);
        match &envelopes[0] {
            Envelope::Exception(e) => assert_eq!(e.path_id.as_ref().unwrap().as_str(), "a/bad"),
            _ => panic!("expected an exception"),
        }
        pool.shutdown(super::super::ClosePolicy::Cancel);
    }

    struct Panicking;
    impl Task for Panicking {
        fn run(&mut self, _client: &reqwest::blocking::Client, _manager: &dyn Manager) -> anyhow::Result<()> {
            panic!("worker blew up")
        }

        fn path_id(&self) -> Option<PathId> {
            Some(PathId::new("a/panicked"))
        }
    }

    #[test]
    fn task_panic_becomes_exception_with_worker_panic_message() {
        let pool = WorkerPool::new(1);
        pool.manager().schedule(Box::new(Panicking), 0);
        let envelopes: Vec<_> = pool.messages().collect();
        assert_eq!(envelopes.len(), 1);
        match &envelopes[0] {
            Envelope::Exception(e) => {
                assert_eq!(e.path_id.as_ref().unwrap().as_str(), "a/panicked");
                assert!(e.message.contains("worker panicked"));
                assert!(e.message.contains("worker blew up"));
            }
            _ => panic!("expected an exception"),
        }
        pool.shutdown(super::super::ClosePolicy::Cancel);
    }

    #[test]
    fn priority_zero_dispatched_before_priority_one() {
        let pool = WorkerPool::new(1);
        // Schedule a slow priority-1 task first to occupy the single worker,
        // then a priority-0 task: it must still run, just not displace the first.
        pool.manager().schedule(Box::new(Noop), 1);
        pool.manager().schedule(Box::new(Noop), 0);
        let envelopes: Vec<_> = pool.messages().collect();
        assert_eq!(envelopes.len(), 2);
        pool.shutdown(super::super::ClosePolicy::Cancel);
    }
}
