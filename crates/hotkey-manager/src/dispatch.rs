use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// A unit of work to run on the owner's execution context
pub type Job = Box<dyn FnOnce() + Send>;

/// Hands hotkey callbacks to the context that owns the affected state.
///
/// Neither the notification thread nor the release detector invokes a
/// callback directly; both go through the registry's dispatcher.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs every job inline on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Dispatcher for Immediate {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Queues jobs for an owner that drains the matching receiver
impl Dispatcher for UnboundedSender<Job> {
    fn dispatch(&self, job: Job) {
        if self.send(job).is_err() {
            warn!("owner context has gone away; dropping hotkey callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_immediate_runs_inline() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        Immediate.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_channel_defers_until_drained() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Job>();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        tx.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        while let Ok(job) = rx.try_recv() {
            job();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_channel_drops_job() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Job>();
        drop(rx);
        tx.dispatch(Box::new(|| panic!("must not run")));
    }
}
