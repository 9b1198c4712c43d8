use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative cancellation flag shared between a running operation and whoever wants to stop it.
///
/// Long running modes check the flag once per iteration. Streaming reads additionally await
/// [`Interrupt::interrupted`] so a quiet server does not delay cancellation.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Completes once the flag is set.
    pub async fn interrupted(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent `interrupt()` is not missed.
            notified.as_mut().enable();

            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }
}
