//! Live subscription handles.
//!
//! A [`Subscription`] owns the task that feeds it. Dropping the handle aborts
//! the task, so a listener can never outlive whatever holds it.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;

/// Default number of undelivered items buffered per subscription
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// A stream of snapshots or changes with a scoped unsubscribe
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Spawn `producer` on the current tokio runtime, handing it the sending
    /// half of the subscription channel.
    pub fn spawn<F, Fut>(buffer: usize, producer: F) -> Result<Self>
    where
        F: FnOnce(mpsc::Sender<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatError::Subscription(format!("no async runtime available: {e}")))?;

        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let producer = producer(sender);
        MetricsCollector.subscription_opened();
        let task = handle.spawn(producer);

        Ok(Self { receiver, task })
    }
}

impl<T> Subscription<T> {
    /// Wait for the next item. `None` once the producer has stopped.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take an already delivered item without waiting
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// True while the producer task is still running
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Unsubscribe explicitly. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
        MetricsCollector.subscription_closed();
    }
}
