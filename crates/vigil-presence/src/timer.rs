//! Cancellable scheduled tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Holds at most one spawned task. Starting a new one aborts the previous.
#[derive(Debug)]
pub struct TaskSlot {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    /// Empty slot. `name` is used in log lines.
    pub fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    /// Spawn `task`, aborting whatever the slot held before.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(task));
    }

    /// Deliver `make()` to `tx` every `period`, first after one full period.
    pub fn every<T, F>(&mut self, period: Duration, tx: mpsc::UnboundedSender<T>, make: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        self.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(make()).is_err() {
                    return;
                }
            }
        });
    }

    /// Deliver `message` to `tx` once, after `delay`.
    pub fn after<T>(&mut self, delay: Duration, tx: mpsc::UnboundedSender<T>, message: T)
    where
        T: Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message);
        });
    }

    /// Abort the held task. Returns `true` if one was still running.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                if was_running {
                    tracing::trace!("Cancelled {} task", self.name);
                }
                was_running
            }
            None => false,
        }
    }

}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
