//! Keeps the in-memory index in step with the remote document set.
//!
//! The engine moves through `Uninitialized -> Initializing -> Ready`. The
//! first caller of [`SearchEngine::ensure_initialized`] compares the remote
//! version marker against the cached one and either reuses the cached
//! records or refetches everything; concurrent callers wait for that same
//! run instead of starting another. Local mutations update the index and the
//! cache in place and notify subscribers.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::RwLock;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    cache_store::{CacheStore, LazyCacheStore},
    config::EngineConfig,
    error::{Error, Result},
    index::SearchIndex,
    provider::DocumentProvider,
    record::{DocumentRecord, IndexStatus, ResultItem},
    search::filter_and_shape,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Ready,
}

/// Notification sent after the index changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    Upserted { id: String, document_count: u64 },
    Removed { id: String, document_count: u64 },
    Rebuilt { document_count: u64 },
}

impl IndexEvent {
    pub fn document_count(&self) -> u64 {
        match self {
            IndexEvent::Upserted { document_count, .. }
            | IndexEvent::Removed { document_count, .. }
            | IndexEvent::Rebuilt { document_count } => *document_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncMode {
    /// Reuse the cache when its version equals the remote one.
    VersionCheck,
    /// Always refetch and rewrite the cache.
    ForceRefetch,
}

struct EngineState {
    phase: Phase,
    index: Option<Arc<SearchIndex>>,
    /// Completed initialization attempts, successful or not.
    attempts: u64,
    /// Error of the latest attempt when it failed.
    last_failure: Option<String>,
}

/// A search session over one remote document set.
///
/// Owns the derived index, the lazily opened cache store and the
/// notification channel. Share it behind an `Arc`.
pub struct SearchEngine<P> {
    provider: P,
    config: EngineConfig,
    cache: LazyCacheStore,
    state: RwLock<EngineState>,
    init_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<IndexEvent>,
    search_generation: AtomicU64,
}

impl<P: DocumentProvider> SearchEngine<P> {
    pub fn new(provider: P, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            provider,
            cache: LazyCacheStore::new(config.cache_path.clone()),
            config,
            state: RwLock::new(EngineState {
                phase: Phase::Uninitialized,
                index: None,
                attempts: 0,
                last_failure: None,
            }),
            init_gate: tokio::sync::Mutex::new(()),
            events,
            search_generation: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.read().phase
    }

    /// The cache store, opening it on first use.
    pub fn cache(&self) -> Result<&CacheStore> {
        self.cache.get()
    }

    /// Initialize the engine if it is not ready yet.
    pub async fn init(&self) -> Result<()> {
        self.ensure_initialized().await
    }

    /// Bring the engine to `Ready`, running at most one initialization at a
    /// time. Callers arriving while another initialization runs wait for it
    /// and share its outcome: they return `Ok` when it succeeded and
    /// [`Error::InitFailed`] when it failed. A later call starts a new
    /// attempt.
    pub async fn ensure_initialized(&self) -> Result<()> {
        let seen = {
            let state = self.state.read();
            if state.phase == Phase::Ready {
                return Ok(());
            }
            state.attempts
        };

        let _gate = self.init_gate.lock().await;
        {
            let state = self.state.read();
            if state.phase == Phase::Ready {
                return Ok(());
            }
            if state.attempts != seen
                && let Some(reason) = &state.last_failure
            {
                return Err(Error::InitFailed(reason.clone()));
            }
        }
        self.initialize(SyncMode::VersionCheck).await
    }

    /// Drop the index and rebuild it from a full remote fetch, regardless
    /// of version equality.
    pub async fn refresh(&self) -> Result<()> {
        let _gate = self.init_gate.lock().await;
        {
            let mut state = self.state.write();
            state.phase = Phase::Uninitialized;
            state.index = None;
        }
        info!("search index refresh requested");
        self.initialize(SyncMode::ForceRefetch).await?;

        let document_count = self.status().document_count;
        self.notify(IndexEvent::Rebuilt { document_count });
        Ok(())
    }

    pub fn status(&self) -> IndexStatus {
        let state = self.state.read();
        IndexStatus {
            initialized: state.phase == Phase::Ready,
            document_count: state
                .index
                .as_ref()
                .map(|index| index.document_count())
                .unwrap_or(0),
        }
    }

    /// Search the index. Blank queries return no results without touching
    /// the index.
    pub async fn search(&self, query: &str) -> Result<Vec<ResultItem>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let index = self.ready_index().await?;
        let hits = index.search(query)?;
        Ok(filter_and_shape(hits, query))
    }

    /// Search after the configured debounce delay.
    ///
    /// Returns `Ok(None)` when a newer debounced search was issued before
    /// this one finished, so callers can drop stale results.
    pub async fn search_debounced(
        &self,
        query: &str,
    ) -> Result<Option<Vec<ResultItem>>> {
        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.config.debounce).await;
        if self.search_generation.load(Ordering::SeqCst) != generation {
            return Ok(None);
        }

        let results = self.search(query).await?;
        if self.search_generation.load(Ordering::SeqCst) != generation {
            return Ok(None);
        }
        Ok(Some(results))
    }

    /// Insert or replace a document in the index and the cache.
    pub async fn add_or_update(&self, record: DocumentRecord) -> Result<()> {
        let index = self.ready_index().await?;
        index.upsert(&record)?;
        self.mirror(|cache| cache.put(&record));

        let document_count = index.document_count();
        debug!(id = %record.id, document_count, "indexed document");
        self.notify(IndexEvent::Upserted {
            id: record.id,
            document_count,
        });
        Ok(())
    }

    /// Remove a document from the index and the cache. Removing an id that
    /// is not indexed succeeds; the return value says whether it was.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let index = self.ready_index().await?;
        let was_present = index.discard(id)?;
        self.mirror(|cache| cache.delete(id).map(|_| ()));

        let document_count = index.document_count();
        debug!(id, was_present, document_count, "removed document");
        self.notify(IndexEvent::Removed {
            id: id.to_string(),
            document_count,
        });
        Ok(was_present)
    }

    pub async fn refresh_index(&self) -> Result<()> {
        self.refresh().await
    }

    pub fn index_status(&self) -> IndexStatus {
        self.status()
    }

    pub async fn on_document_created(&self, doc: DocumentRecord) -> Result<()> {
        self.add_or_update(doc).await
    }

    pub async fn on_document_updated(&self, doc: DocumentRecord) -> Result<()> {
        self.add_or_update(doc).await
    }

    pub async fn on_document_deleted(&self, id: &str) -> Result<()> {
        self.remove(id).await.map(|_| ())
    }

    /// Receive every future [`IndexEvent`]. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Run `callback` for every future [`IndexEvent`] until the returned
    /// handle is dropped or unsubscribed. Requires a Tokio runtime.
    pub fn on_index_update<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(IndexEvent) + Send + 'static,
    {
        let mut receiver = self.events.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "index update listener fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }

    async fn ready_index(&self) -> Result<Arc<SearchIndex>> {
        self.ensure_initialized().await?;
        self.state.read().index.clone().ok_or(Error::NotInitialized)
    }

    async fn initialize(&self, mode: SyncMode) -> Result<()> {
        self.state.write().phase = Phase::Initializing;

        match self.build_index(mode).await {
            Ok(index) => {
                let document_count = index.document_count();
                let mut state = self.state.write();
                state.index = Some(Arc::new(index));
                state.phase = Phase::Ready;
                state.attempts += 1;
                state.last_failure = None;
                info!(document_count, "search index ready");
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.write();
                state.index = None;
                state.phase = Phase::Uninitialized;
                state.attempts += 1;
                state.last_failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn build_index(&self, mode: SyncMode) -> Result<SearchIndex> {
        let records = match self.sync_records(mode).await {
            Ok(records) => records,
            Err(err) => {
                if err.is_cache_failure() {
                    warn!(
                        error = %err,
                        "search cache unavailable, indexing without persistence"
                    );
                } else {
                    warn!(
                        error = %err,
                        "version sync failed, indexing directly from remote"
                    );
                }
                self.provider.fetch_documents().await?
            }
        };

        let records = unique_by_id(records);
        let index = SearchIndex::new(self.config.index.clone())?;
        index.add_all(&records)?;
        Ok(index)
    }

    async fn sync_records(&self, mode: SyncMode) -> Result<Vec<DocumentRecord>> {
        let remote_version = self.provider.fetch_version().await?;
        let cache = self.cache.get()?;

        if mode == SyncMode::VersionCheck {
            let cached_version = cache.get_version()?;
            if cached_version == Some(remote_version) && cache.count()? > 0 {
                let records = cache.get_all()?;
                info!(
                    version = remote_version,
                    documents = records.len(),
                    "search cache is current"
                );
                return Ok(records);
            }
            info!(
                cached = ?cached_version,
                remote = remote_version,
                "search cache is stale, refetching documents"
            );
        }

        let records = self.provider.fetch_documents().await?;
        cache.clear()?;
        cache.put_all(&records)?;
        cache.set_version(remote_version)?;
        Ok(records)
    }

    /// Apply a change to the cache and bump its version marker. Failures
    /// are logged: the cache is best-effort and the in-memory index already
    /// reflects the change.
    fn mirror(&self, op: impl FnOnce(&CacheStore) -> Result<()>) {
        let result = self.cache.get().and_then(|cache| {
            op(cache)?;
            cache.set_version(next_version(cache.get_version()?))
        });
        if let Err(e) = result {
            warn!(error = %e, "failed to mirror index change into search cache");
        }
    }

    fn notify(&self, event: IndexEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl<P> std::fmt::Debug for SearchEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("phase", &self.state.read().phase)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`SearchEngine::on_index_update`].
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Version marker written after a local mutation: the current time in
/// milliseconds, moved past `previous` when the clock has not advanced.
pub fn next_version(previous: Option<u64>) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    match previous {
        Some(prev) => now.max(prev.saturating_add(1)),
        None => now,
    }
}

/// Keep the last record for every id, preserving first-seen order.
fn unique_by_id(records: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<DocumentRecord> = Vec::with_capacity(records.len());
    for record in records {
        match position.get(&record.id) {
            Some(&i) => unique[i] = record,
            None => {
                position.insert(record.id.clone(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}
