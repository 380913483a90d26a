// Locally cached view of each user's file list. A background task refreshes it
// on a fixed interval and, when the store announces changes, right after a
// change. Refreshes are not coordinated with each other; whichever finishes
// last wins.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::errors::Result;
use crate::quota::usage;
use crate::records::FileRecord;
use crate::storage::RecordStore;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Snapshot {
    pub(crate) files: Vec<FileRecord>,
    pub(crate) total_storage: u64,
    pub(crate) loading: bool,
    pub(crate) refreshed_at: Option<DateTime<Utc>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            files: Vec::new(),
            total_storage: 0,
            loading: true,
            refreshed_at: None,
        }
    }
}

enum Wake {
    Tick,
    Changed,
    Ignore,
    Closed,
}

pub(crate) struct LiveFiles {
    state: Arc<RwLock<Snapshot>>,
    task: JoinHandle<()>,
}

async fn next_change(changes: &mut Option<broadcast::Receiver<String>>, user_id: &str) -> Wake {
    let rx = match changes {
        Some(rx) => rx,
        None => return std::future::pending().await,
    };
    match rx.recv().await {
        Ok(changed) if changed == user_id => Wake::Changed,
        Ok(_) => Wake::Ignore,
        Err(RecvError::Lagged(_)) => Wake::Changed,
        Err(RecvError::Closed) => Wake::Closed,
    }
}

async fn refresh(store: Arc<dyn RecordStore>, user_id: String, state: Arc<RwLock<Snapshot>>) {
    let fetch_user = user_id.clone();
    let fetched = tokio::task::spawn_blocking(move || store.list_files(&fetch_user)).await;
    let files = match fetched {
        Ok(Ok(files)) => files,
        Ok(Err(e)) => {
            tracing::error!("Refreshing files for {} failed: {}", user_id, e);
            Vec::new()
        }
        Err(e) => {
            tracing::error!("Refresh task for {} did not finish: {}", user_id, e);
            Vec::new()
        }
    };
    let total_storage = usage(&files);
    match state.write() {
        Ok(mut snapshot) => {
            *snapshot = Snapshot {
                files,
                total_storage,
                loading: false,
                refreshed_at: Some(Utc::now()),
            };
        }
        Err(_) => tracing::error!("Snapshot lock for {} is poisoned", user_id),
    }
}

impl LiveFiles {
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(
        store: Arc<dyn RecordStore>,
        user_id: String,
        every: Duration,
    ) -> LiveFiles {
        let state = Arc::new(RwLock::new(Snapshot::default()));
        let task_state = state.clone();
        let task = tokio::spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(every));
            let mut changes = store.subscribe();
            loop {
                let wake = tokio::select! {
                    _ = ticks.next() => Wake::Tick,
                    wake = next_change(&mut changes, &user_id) => wake,
                };
                match wake {
                    Wake::Tick | Wake::Changed => {
                        tokio::spawn(refresh(store.clone(), user_id.clone(), task_state.clone()));
                    }
                    Wake::Ignore => {}
                    Wake::Closed => changes = None,
                }
            }
        });
        LiveFiles { state, task }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        match self.state.read() {
            Ok(snapshot) => snapshot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Drop for LiveFiles {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// How long a user's cache survives without being read.
const IDLE_AFTER: Duration = Duration::from_secs(600);

struct Tracked {
    live: LiveFiles,
    last_access: Instant,
}

/// One `LiveFiles` per user, started the first time that user is asked for and
/// dropped (stopping its task) once nobody has read it for `idle_after`.
pub(crate) struct LiveRegistry {
    store: Arc<dyn RecordStore>,
    every: Duration,
    idle_after: Duration,
    users: Mutex<HashMap<String, Tracked>>,
}

impl LiveRegistry {
    pub(crate) fn new(store: Arc<dyn RecordStore>, every: Duration) -> LiveRegistry {
        LiveRegistry::with_idle_timeout(store, every, IDLE_AFTER)
    }

    pub(crate) fn with_idle_timeout(
        store: Arc<dyn RecordStore>,
        every: Duration,
        idle_after: Duration,
    ) -> LiveRegistry {
        LiveRegistry {
            store,
            every,
            idle_after,
            users: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn snapshot(&self, user_id: &str) -> Snapshot {
        let mut users = match self.users.lock() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let before = users.len();
        users.retain(|user, tracked| {
            user == user_id || now.duration_since(tracked.last_access) < self.idle_after
        });
        if users.len() < before {
            tracing::debug!("Stopped {} idle file caches", before - users.len());
        }
        let tracked = users.entry(user_id.to_string()).or_insert_with(|| Tracked {
            live: LiveFiles::start(self.store.clone(), user_id.to_string(), self.every),
            last_access: now,
        });
        tracked.last_access = now;
        tracked.live.snapshot()
    }

    /// The cached list, or a direct read while the first refresh is still running.
    pub(crate) fn files(&self, user_id: &str) -> Result<Vec<FileRecord>> {
        let snapshot = self.snapshot(user_id);
        if snapshot.loading {
            return self.store.list_files(user_id);
        }
        Ok(snapshot.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::record;
    use crate::storage::SledStore;

    async fn wait_for<F: Fn(&Snapshot) -> bool>(live: &LiveFiles, done: F) -> Snapshot {
        for _ in 0..200 {
            let snapshot = live.snapshot();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("snapshot never reached the expected state");
    }

    #[tokio::test]
    async fn first_tick_loads_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(&dir.path().join("db")).unwrap());
        let mut rec = record("a.txt");
        rec.size = 7;
        store.insert_file(&rec).unwrap();

        let live = LiveFiles::start(store, "tester".to_string(), Duration::from_secs(3600));
        let snapshot = wait_for(&live, |s| !s.loading).await;
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.total_storage, 7);
        assert!(snapshot.refreshed_at.is_some());
    }

    #[tokio::test]
    async fn change_notifications_refresh_before_the_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(&dir.path().join("db")).unwrap());
        let live = LiveFiles::start(store.clone(), "tester".to_string(), Duration::from_secs(3600));
        wait_for(&live, |s| !s.loading).await;

        store.insert_file(&record("late.txt")).unwrap();
        let snapshot = wait_for(&live, |s| s.files.len() == 1).await;
        assert_eq!(snapshot.files[0].name, "late.txt");
    }

    #[tokio::test]
    async fn registry_falls_back_to_the_store_while_loading() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(&dir.path().join("db")).unwrap());
        store.insert_file(&record("a.txt")).unwrap();
        let registry = LiveRegistry::new(store, Duration::from_secs(3600));
        assert_eq!(registry.files("tester").unwrap().len(), 1);
        assert!(registry.files("nobody").unwrap().is_empty());
    }

    #[tokio::test]
    async fn idle_users_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(&dir.path().join("db")).unwrap());
        let registry = LiveRegistry::with_idle_timeout(
            store,
            Duration::from_secs(3600),
            Duration::from_millis(50),
        );
        registry.snapshot("first");
        registry.snapshot("second");
        assert_eq!(registry.users.lock().unwrap().len(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.snapshot("third");
        let users = registry.users.lock().unwrap();
        assert_eq!(users.len(), 1);
        assert!(users.contains_key("third"));
    }

    #[tokio::test]
    async fn active_users_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(&dir.path().join("db")).unwrap());
        let registry = LiveRegistry::new(store, Duration::from_secs(3600));
        registry.snapshot("first");
        registry.snapshot("second");
        registry.snapshot("first");
        assert_eq!(registry.users.lock().unwrap().len(), 2);
    }
}
