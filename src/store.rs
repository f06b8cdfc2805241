//! Async handle over [`Database`] with live, re-evaluating queries.
//!
//! Every mutation that touches at least one row bumps a store-wide change
//! version. Each [`LiveQuery`] owns a task that waits for a new version, re-runs
//! its query on the blocking pool and pushes the full snapshot to its receiver
//! when it differs from the previous one.

use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::StoreError;
use crate::models::{Candidate, CandidateFilter};

type Result<T> = std::result::Result<T, StoreError>;

/// Cloneable handle to the candidate store. Dropping the last clone closes the
/// database and ends every outstanding [`LiveQuery`].
#[derive(Clone)]
pub struct CandidateStore {
    db: Arc<Mutex<Database>>,
    changes: Arc<watch::Sender<u64>>,
}

impl CandidateStore {
    pub fn new(db: Database) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            db: Arc::new(Mutex::new(db)),
            changes: Arc::new(changes),
        }
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let db = tokio::task::spawn_blocking(move || Database::open(&path)).await??;
        Ok(Self::new(db))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    // --- Mutations ---

    pub async fn insert(&self, candidate: &Candidate) -> Result<i64> {
        let candidate = candidate.clone();
        let id = self.run(move |db| db.insert_candidate(&candidate)).await?;
        debug!(id, "inserted candidate");
        self.notify();
        Ok(id)
    }

    /// Returns 0 when no row carries `candidate.id`.
    pub async fn update(&self, candidate: &Candidate) -> Result<usize> {
        let candidate = candidate.clone();
        let id = candidate.id;
        let updated = self.run(move |db| db.update_candidate(&candidate)).await?;
        debug!(id, updated, "updated candidate");
        self.notify_if(updated);
        Ok(updated)
    }

    pub async fn toggle_favorite_status(&self, id: i64, favorite: bool) -> Result<usize> {
        let updated = self.run(move |db| db.set_favorite(id, favorite)).await?;
        debug!(id, favorite, updated, "set favorite status");
        self.notify_if(updated);
        Ok(updated)
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<usize> {
        let deleted = self.run(move |db| db.delete_candidate(id)).await?;
        debug!(id, deleted, "deleted candidate");
        self.notify_if(deleted);
        Ok(deleted)
    }

    pub async fn delete_all(&self) -> Result<usize> {
        let deleted = self.run(|db| db.delete_all_candidates()).await?;
        debug!(deleted, "deleted all candidates");
        self.notify_if(deleted);
        Ok(deleted)
    }

    // --- One-shot reads ---

    pub async fn fetch_by_id(&self, id: i64) -> Result<Option<Candidate>> {
        self.run(move |db| db.get_candidate(id)).await
    }

    pub async fn fetch_filtered(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>> {
        let filter = filter.clone();
        self.run(move |db| db.list_candidates(&filter)).await
    }

    pub async fn fetch_all(&self) -> Result<Vec<Candidate>> {
        self.fetch_filtered(&CandidateFilter::all()).await
    }

    pub async fn count(&self) -> Result<i64> {
        self.run(|db| db.count_candidates()).await
    }

    // --- Live reads ---

    /// Live view of one candidate; yields `None` while no row has `id`.
    ///
    /// Fails with [`StoreError::NoRuntime`] outside a tokio runtime.
    pub fn get_by_id(&self, id: i64) -> Result<LiveQuery<Option<Candidate>>> {
        self.observe(move |db| db.get_candidate(id))
    }

    /// Live, ordered view of the candidates matching `filter`.
    ///
    /// Fails with [`StoreError::NoRuntime`] outside a tokio runtime.
    pub fn get_filtered(&self, filter: CandidateFilter) -> Result<LiveQuery<Vec<Candidate>>> {
        self.observe(move |db| db.list_candidates(&filter))
    }

    fn observe<T, F>(&self, query: F) -> Result<LiveQuery<T>>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(&Database) -> Result<T> + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()?;
        // One slot: a slow reader gets the latest state, not a backlog.
        let (tx, rx) = mpsc::channel(1);
        let mut changes = self.changes.subscribe();
        let db = Arc::clone(&self.db);
        let query = Arc::new(query);

        let task = runtime.spawn(async move {
            let mut last: Option<T> = None;
            loop {
                let Ok(permit) = tx.reserve().await else {
                    break;
                };
                // Mark the current version seen before querying so a write landing
                // mid-query triggers another round.
                let version = *changes.borrow_and_update();
                let query = Arc::clone(&query);
                let result = run_blocking(Arc::clone(&db), move |db| (*query)(db)).await;

                match result {
                    Ok(snapshot) if last.as_ref() == Some(&snapshot) => {
                        debug!(version, "live query unchanged");
                        drop(permit);
                    }
                    Ok(snapshot) => {
                        debug!(version, "live query emitting snapshot");
                        last = Some(snapshot.clone());
                        permit.send(Ok(snapshot));
                    }
                    Err(err) => {
                        warn!(version, error = %err, "live query failed");
                        // The next successful run is always delivered.
                        last = None;
                        permit.send(Err(err));
                    }
                }

                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        Ok(LiveQuery { rx, task })
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        run_blocking(Arc::clone(&self.db), f).await
    }

    fn notify_if(&self, affected: usize) {
        if affected > 0 {
            self.notify();
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}

async fn run_blocking<T, F>(db: Arc<Mutex<Database>>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let db = db.lock().map_err(|_| StoreError::Poisoned)?;
        f(&db)
    })
    .await?
}

/// A standing query. Each item is the full current result; the first item is
/// the state at subscription time. At most one snapshot waits unread. Dropping the value tears the query down.
pub struct LiveQuery<T> {
    rx: mpsc::Receiver<Result<T>>,
    task: JoinHandle<()>,
}

impl<T> LiveQuery<T> {
    /// Waits for the next snapshot. `None` once the store has been dropped.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
