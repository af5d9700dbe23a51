//! In-flight operation registry
//!
//! Tracks the long-running git operation per key (one worktree path, one
//! agent session) so a second request against a busy key is rejected up
//! front instead of queueing behind the worktree lock, and so callers can
//! cancel an operation they no longer want.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Error, Debug)]
#[error("an operation is already running for '{0}'")]
pub struct AlreadyRunning(pub String);

/// Registry of in-flight operations, keyed by caller-chosen strings.
#[derive(Default)]
pub struct InFlightRegistry {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

pub type SharedInFlightRegistry = Arc<InFlightRegistry>;

impl InFlightRegistry {
    pub fn new() -> SharedInFlightRegistry {
        Arc::new(Self::default())
    }

    /// Spawn `fut` under `key`. Fails without spawning when the key already
    /// has a live operation. Finished entries are swept on each call.
    pub async fn try_start<F>(&self, key: &str, fut: F) -> Result<(), AlreadyRunning>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, handle| !handle.is_finished());
        if tasks.contains_key(key) {
            return Err(AlreadyRunning(key.to_string()));
        }

        let owned_key = key.to_string();
        let handle = tokio::spawn(async move {
            fut.await;
            debug!(key = %owned_key, "operation finished");
        });

        tasks.insert(key.to_string(), handle);
        Ok(())
    }

    /// Abort the operation under `key`. Returns whether one was running.
    pub async fn cancel(&self, key: &str) -> bool {
        let mut tasks = self.tasks.lock().await;
        match tasks.remove(key) {
            Some(handle) => {
                let was_live = !handle.is_finished();
                handle.abort();
                if was_live {
                    info!(key, "cancelled operation");
                }
                was_live
            }
            None => false,
        }
    }

    pub async fn is_running(&self, key: &str) -> bool {
        let tasks = self.tasks.lock().await;
        tasks.get(key).is_some_and(|h| !h.is_finished())
    }

    pub async fn running_keys(&self) -> Vec<String> {
        let tasks = self.tasks.lock().await;
        tasks
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(k, _)| k.clone())
            .collect()
    }
}
