//! Cooperative cancellation shared by every instance worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide terminate flag.
///
/// Cloning is cheap; all clones observe the same flag. Workers check it after
/// every sleep and around remote calls, and never abort an in-flight
/// transaction because of it.
#[derive(Debug, Clone, Default)]
pub struct Terminate {
    flag: Arc<AtomicBool>,
}

impl Terminate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning `true` if termination was requested
    /// by the time the sleep ends.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        tokio::time::sleep(duration).await;
        self.is_set()
    }

    /// Set the flag on Ctrl-C.
    pub fn listen_for_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let terminate = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Termination requested, finishing in-flight work");
                terminate.trigger();
            }
        })
    }
}
