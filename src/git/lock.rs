//! Per-worktree operation serialization
//!
//! Git provides its own on-disk locking, but two overlapping mutating
//! operations against the same worktree could still interleave their
//! multi-command sequences. Mutating services take this lock first so
//! calls against one path run one at a time; distinct worktrees proceed
//! concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

static WORKTREE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, std::sync::Arc<AsyncMutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Acquire the mutation lock for a worktree path.
///
/// Keys are canonicalized so `/a/wt` and `/a/./wt` serialize together.
pub async fn lock_worktree(path: &Path) -> OwnedMutexGuard<()> {
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let lock = {
        let mut map = WORKTREE_LOCKS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.entry(key)
            .or_insert_with(|| std::sync::Arc::new(AsyncMutex::new(())))
            .clone()
    };
    lock.lock_owned().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_same_path_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let path = path.clone();
            let concurrent = concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _guard = lock_worktree(&path).await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst);
                assert_eq!(now, 0, "two operations held the same worktree lock");
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_distinct_paths_do_not_block() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let _ga = lock_worktree(a.path()).await;
        // Must not deadlock.
        let _gb = lock_worktree(b.path()).await;
    }
}
