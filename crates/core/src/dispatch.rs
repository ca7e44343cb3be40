//! Notification dispatchers
//!
//! The issue model never decides on its own which thread observers run on.
//! The embedding application hands it a [`Dispatcher`]; every observer
//! notification and every change-triggered recompute goes through it.

use std::sync::Arc;
use std::thread::JoinHandle;
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::DispatcherKind;
use crate::error::{IssueError, Result};

/// Unit of work handed to a dispatcher
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A designated execution context
pub trait Dispatcher: Send + Sync {
    /// Run `task` on this context, now or later
    fn dispatch(&self, task: Task) -> Result<()>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Runs tasks inline on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateDispatcher;

impl Dispatcher for ImmediateDispatcher {
    fn dispatch(&self, task: Task) -> Result<()> {
        task();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "immediate"
    }
}

/// Runs tasks one at a time, in submission order, on a dedicated thread
pub struct ThreadDispatcher {
    sender: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadDispatcher {
    /// Spawn the worker thread
    pub fn spawn(thread_name: &str) -> Result<Self> {
        let (sender, receiver) = unbounded::<Task>();
        let worker = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                for task in receiver.iter() {
                    task();
                }
                debug!("Dispatcher thread exiting");
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting tasks, finish the queued ones and join the worker
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!("Dispatcher thread panicked");
            }
        }
    }
}

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, task: Task) -> Result<()> {
        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| IssueError::Dispatch("dispatcher thread has shut down".into()))?;
        sender
            .send(task)
            .map_err(|e| IssueError::Dispatch(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "thread"
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns tasks onto a tokio runtime
#[derive(Clone)]
pub struct TokioDispatcher {
    handle: tokio::runtime::Handle,
}

impl TokioDispatcher {
    /// Dispatch onto the given runtime
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Dispatch onto the runtime the caller is running in
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| IssueError::Dispatch(e.to_string()))
    }
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, task: Task) -> Result<()> {
        // Observers and sources are synchronous code; keep them off the async workers.
        self.handle.spawn_blocking(task);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

/// Build the dispatcher a configuration asks for
pub fn from_kind(kind: DispatcherKind) -> Result<Arc<dyn Dispatcher>> {
    Ok(match kind {
        DispatcherKind::Immediate => Arc::new(ImmediateDispatcher),
        DispatcherKind::Thread => Arc::new(ThreadDispatcher::spawn("issuehub-notify")?),
        DispatcherKind::Tokio => Arc::new(TokioDispatcher::current()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_immediate_runs_inline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        ImmediateDispatcher
            .dispatch(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_dispatcher_preserves_order() {
        let dispatcher = ThreadDispatcher::spawn("test-dispatch").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = Arc::clone(&seen);
            dispatcher
                .dispatch(Box::new(move || seen.lock().push(i)))
                .unwrap();
        }
        dispatcher.shutdown();

        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
        assert!(dispatcher.dispatch(Box::new(|| {})).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tokio_dispatcher() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let dispatcher = TokioDispatcher::current().unwrap();
        dispatcher
            .dispatch(Box::new(move || {
                let _ = tx.send(std::thread::current().id());
            }))
            .unwrap();

        let ran_on = tokio::task::spawn_blocking(move || rx.recv().unwrap())
            .await
            .unwrap();
        assert_ne!(ran_on, std::thread::current().id());
    }

    #[test]
    fn test_tokio_kind_needs_runtime() {
        assert!(from_kind(DispatcherKind::Tokio).is_err());
        assert_eq!(from_kind(DispatcherKind::Immediate).unwrap().name(), "immediate");
    }
}
