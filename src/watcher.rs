//! Watches `<cwd>/.sf/config.json` for `target-org` changes and fires
//! coalesced `OrgChanged` events.
//!
//! `notify` delivers raw filesystem events; the 5s debounce here is hand
//! rolled rather than delegated to a debouncer crate so the "coalesce,
//! report only the last value" behavior (Open Question (d), resolved in
//! DESIGN.md) is explicit in this code.

use notify::{RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct OrgChanged {
    pub old_alias: Option<String>,
    pub new_alias: Option<String>,
}

pub struct OrgWatcherHandle {
    task: JoinHandle<()>,
    _fs_watcher: Box<dyn Watcher + Send>,
}

impl OrgWatcherHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Starts watching `config_path` (typically `<workspace>/.sf/config.json`).
/// `on_changed` is invoked with the new `target-org` value whenever it
/// differs from the last observed one, after a 5s settle period.
pub fn start<F>(config_path: PathBuf, mut last_known: Option<String>, on_changed: F) -> crate::error::Result<OrgWatcherHandle>
where
    F: Fn(OrgChanged) + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = tx.send(());
        }
    })
    .map_err(|e| crate::error::Error::internal(format!("failed to start config watcher: {e}")))?;

    if let Some(parent) = config_path.parent() {
        fs_watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .map_err(|e| crate::error::Error::internal(format!("failed to watch {}: {e}", parent.display())))?;
    }

    let path_for_task = config_path.clone();
    let last_known = Arc::new(Mutex::new(last_known.take()));

    let task = tokio::spawn(async move {
        loop {
            if rx.recv().await.is_none() {
                return;
            }
            // Debounce: reset the 5s window on every further event until
            // the stream goes quiet, so a burst of writes coalesces into a
            // single read of the settled file.
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => break,
                    more = rx.recv() => {
                        if more.is_none() {
                            return;
                        }
                    }
                }
            }

            let current = read_target_org(&path_for_task).await;
            let mut guard = last_known.lock().await;
            if current != *guard {
                let old = guard.clone();
                *guard = current.clone();
                drop(guard);
                on_changed(OrgChanged {
                    old_alias: old,
                    new_alias: current,
                });
            }
        }
    });

    Ok(OrgWatcherHandle {
        task,
        _fs_watcher: Box::new(fs_watcher),
    })
}

async fn read_target_org(path: &PathBuf) -> Option<String> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    value
        .get("target-org")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn read_target_org_parses_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"target-org": "alice@example.com"}"#)
            .await
            .unwrap();
        assert_eq!(read_target_org(&path).await, Some("alice@example.com".to_string()));
    }

    #[tokio::test]
    async fn read_target_org_missing_file_returns_none() {
        let path = PathBuf::from("/nonexistent/path/config.json");
        assert_eq!(read_target_org(&path).await, None);
    }

    #[tokio::test]
    async fn watcher_fires_on_change_after_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let sf_dir = dir.path().join(".sf");
        tokio::fs::create_dir_all(&sf_dir).await.unwrap();
        let config_path = sf_dir.join("config.json");
        tokio::fs::write(&config_path, r#"{"target-org": "first"}"#)
            .await
            .unwrap();

        let fire_count = Arc::new(AtomicUsize::new(0));
        let fire_count_clone = fire_count.clone();
        let handle = start(config_path.clone(), Some("first".to_string()), move |_event| {
            fire_count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::fs::write(&config_path, r#"{"target-org": "second"}"#)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(6)).await;
        assert!(fire_count.load(Ordering::SeqCst) >= 1);
        handle.stop();
    }
}
