//! Throttled progress rendering through `tracing`

use super::{ProgressReporter, TransferProgress};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Default delay between two renders
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(500);

struct Shared {
    /// Latest update per file since the last render
    pending: Mutex<BTreeMap<String, TransferProgress>>,
    notify: Notify,
    shutdown: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn render_pending(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for (file_name, progress) in pending {
            render(&file_name, progress);
        }
    }
}

/// Progress reporter that logs coalesced updates from a background task
///
/// `on_progress` only stores the latest value for the file and wakes the
/// render task. The task logs everything pending and then sleeps for the
/// render interval, so at most one line per file is written per interval
/// no matter how fast chunks arrive.
///
/// Must be created inside a tokio runtime.
pub struct TracingProgressReporter {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TracingProgressReporter {
    /// Spawn the render task
    pub fn spawn(interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(BTreeMap::new()),
            notify: Notify::new(),
            shutdown: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let task = tokio::spawn(render_loop(shared.clone(), interval));

        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    /// Render whatever is pending and stop the render task
    pub async fn shutdown(&self) {
        self.close();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Progress render task failed");
            }
        }
    }

    fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
        self.shared.shutdown.notify_one();
    }

    #[cfg(test)]
    fn pending(&self) -> BTreeMap<String, TransferProgress> {
        self.shared.pending.lock().clone()
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn on_progress(&self, file_name: &str, progress: TransferProgress) {
        {
            let mut pending = self.shared.pending.lock();
            match pending.get_mut(file_name) {
                Some(entry) => *entry = progress,
                None => {
                    pending.insert(file_name.to_string(), progress);
                }
            }
        }
        self.shared.notify.notify_one();
    }
}

impl Drop for TracingProgressReporter {
    fn drop(&mut self) {
        self.close();
    }
}

async fn render_loop(shared: Arc<Shared>, interval: Duration) {
    loop {
        shared.notify.notified().await;
        let closed = shared.closed.load(Ordering::Acquire);
        shared.render_pending();
        if closed {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shared.shutdown.notified() => {
                shared.render_pending();
                return;
            }
        }
    }
}

fn render(file_name: &str, progress: TransferProgress) {
    let percent = progress.fraction() * 100.0;
    if progress.is_complete() {
        tracing::info!(
            file = %file_name,
            bytes_sent = progress.bytes_sent,
            total_bytes = progress.total_bytes,
            "Upload finished"
        );
    } else {
        tracing::info!(
            file = %file_name,
            bytes_sent = progress.bytes_sent,
            total_bytes = progress.total_bytes,
            percent = format_args!("{:.1}", percent),
            "Uploading"
        );
    }
}
