//! Single-slot timer for the proactive refresh

use log::{debug, warn};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Holds at most one armed timer. Arming replaces and cancels the previous
/// one.
///
/// Cancelling only stops a timer that has not fired yet: the fired task runs
/// detached, so cancelling from inside it (a logout triggered by a failed
/// refresh) cannot abort the work in progress.
#[derive(Debug, Default)]
pub(crate) struct RefreshTimer {
    slot: Mutex<Option<Armed>>,
}

#[derive(Debug)]
struct Armed {
    task: JoinHandle<()>,
    deadline: Instant,
}

impl Armed {
    fn is_pending(&self) -> bool {
        !self.task.is_finished()
    }
}

impl RefreshTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`
    pub(crate) fn arm<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime, proactive refresh not scheduled");
                return;
            }
        };

        let deadline = Instant::now() + delay;
        let runtime = handle.clone();
        let timer = handle.spawn(async move {
            sleep_until(deadline).await;
            runtime.spawn(task);
        });

        debug!("Refresh timer armed for {:?}", delay);
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(Armed {
                task: timer,
                deadline,
            });
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }

    /// Cancel the armed timer, returning whether one was pending
    pub(crate) fn cancel(&self) -> bool {
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match previous {
            Some(timer) => {
                let pending = timer.is_pending();
                timer.task.abort();
                if pending {
                    debug!("Refresh timer cancelled");
                }
                pending
            }
            None => false,
        }
    }

    /// Whether a timer is armed and has not fired yet
    pub(crate) fn is_armed(&self) -> bool {
        self.deadline().is_some()
    }

    /// When the armed timer fires, if one is pending
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .filter(|timer| timer.is_pending())
            .map(|timer| timer.deadline)
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
