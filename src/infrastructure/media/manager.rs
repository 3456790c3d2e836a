//! Media manager: the façade UI code talks to.
//!
//! Lookups are answered synchronously from the store; misses schedule at most
//! one render job per fingerprint on the [`TaskRunner`]. Finished jobs come
//! back over a bounded channel and are applied by whoever owns the manager,
//! via [`MediaManager::dispatch_completions`] or [`MediaManager::dispatch_next`].
//! Subscribers learn about results through [`MediaEvent`]s.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    Fingerprint, MediaBitmap, MediaCategory, MediaRequest, MediaState,
};
use crate::domain::errors::{MediaError, MediaResult};
use crate::domain::ports::MediaSourcePort;
use crate::infrastructure::config::CacheConfig;

use super::memory_cache::{CacheStats, MediaStore};
use super::render::Renderer;
use super::task_runner::{Completion, RenderJob, TaskRunner};

/// Notification sent to subscribers once per finished job.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// The bitmap was rendered and is now in the cache.
    Ready {
        /// Source path of the request.
        path: PathBuf,
        /// Requested category.
        category: MediaCategory,
        /// Cache key.
        fingerprint: Fingerprint,
        /// Rendered bitmap.
        bitmap: MediaBitmap,
    },
    /// Loading or rendering failed; nothing was cached.
    Failed {
        /// Source path of the request.
        path: PathBuf,
        /// Requested category.
        category: MediaCategory,
        /// Cache key.
        fingerprint: Fingerprint,
        /// What went wrong.
        error: MediaError,
    },
}

impl MediaEvent {
    /// Source path the event refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Ready { path, .. } | Self::Failed { path, .. } => path,
        }
    }

    /// Category the event refers to.
    #[must_use]
    pub const fn category(&self) -> MediaCategory {
        match self {
            Self::Ready { category, .. } | Self::Failed { category, .. } => *category,
        }
    }

    /// Cache key the event refers to.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        match self {
            Self::Ready { fingerprint, .. } | Self::Failed { fingerprint, .. } => fingerprint,
        }
    }
}

/// Synchronous answer of [`MediaManager::get_media`].
#[derive(Debug, Clone)]
pub enum MediaLookup {
    /// Served from cache.
    Cached(MediaBitmap),
    /// A job is running; avatars get a placeholder meanwhile.
    Loading(Option<MediaBitmap>),
    /// Nothing to show and nothing scheduled.
    Empty,
}

impl MediaLookup {
    /// Bitmap to draw right now, if any.
    #[must_use]
    pub const fn bitmap(&self) -> Option<&MediaBitmap> {
        match self {
            Self::Cached(bitmap) | Self::Loading(Some(bitmap)) => Some(bitmap),
            Self::Loading(None) | Self::Empty => None,
        }
    }

    /// Returns true if the bitmap came from the cache.
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }

    /// Returns true if a job is running for the request.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }
}

/// Failed fingerprints remembered for [`MediaManager::state`].
pub const FAILED_CAPACITY: usize = 512;

/// Everything guarded by the manager lock.
#[derive(Debug)]
struct CacheState {
    store: MediaStore,
    in_flight: HashSet<Fingerprint>,
    // Oldest failures fall out first; entries also age out with the sweep.
    failed: LruCache<Fingerprint, Instant>,
}

/// Owns the cache, the in-flight set and the render pool.
pub struct MediaManager {
    state: Mutex<CacheState>,
    runner: TaskRunner,
    renderer: Arc<Renderer>,
    source: Arc<dyn MediaSourcePort>,
    completions: tokio::sync::Mutex<mpsc::Receiver<Completion>>,
    applied: AtomicU64,
    event_tx: mpsc::UnboundedSender<MediaEvent>,
}

impl std::fmt::Debug for MediaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaManager")
            .field("runner", &self.runner)
            .field("applied", &self.applied.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MediaManager {
    /// Creates a manager whose jobs run on the current tokio runtime.
    ///
    /// # Errors
    /// Returns `Runtime` if called outside a tokio runtime.
    pub fn new(
        config: &CacheConfig,
        event_tx: &mpsc::UnboundedSender<MediaEvent>,
        source: Arc<dyn MediaSourcePort>,
        renderer: Arc<Renderer>,
    ) -> MediaResult<Self> {
        let handle = Handle::try_current().map_err(|e| MediaError::Runtime(e.to_string()))?;
        let (completion_tx, completion_rx) = mpsc::channel(config.completion_capacity.max(1));
        let runner = TaskRunner::new(
            config.worker_count(),
            handle,
            renderer.clone(),
            source.clone(),
            completion_tx,
        );

        info!(
            budget_kb = config.budget_kb,
            workers = config.worker_count(),
            "Media manager ready"
        );

        Ok(Self {
            state: Mutex::new(CacheState {
                store: MediaStore::new(config.budget_kb),
                in_flight: HashSet::new(),
                failed: LruCache::new(
                    NonZeroUsize::new(FAILED_CAPACITY).unwrap_or(NonZeroUsize::MIN),
                ),
            }),
            runner,
            renderer,
            source,
            completions: tokio::sync::Mutex::new(completion_rx),
            applied: AtomicU64::new(0),
            event_tx: event_tx.clone(),
        })
    }

    /// Returns the cached bitmap or schedules it. Never waits on decode work.
    pub fn get_media(&self, request: &MediaRequest) -> MediaLookup {
        if request.is_empty() {
            trace!("Ignoring media request with empty path");
            return MediaLookup::Empty;
        }

        let fingerprint = request.fingerprint();
        {
            let mut state = self.state.lock();
            if let Some(entry) = state.store.get(&fingerprint) {
                return MediaLookup::Cached(entry.bitmap().clone());
            }
            if let Err(e) = self.schedule(&mut state, fingerprint, request) {
                debug!(path = %request.path.display(), error = %e, "Media request not scheduled");
                return MediaLookup::Empty;
            }
        }

        if request.category.has_loading_placeholder() {
            let placeholder = self
                .renderer
                .loading_placeholder(request.size, request.radius);
            MediaLookup::Loading(Some(MediaBitmap::new(placeholder)))
        } else {
            MediaLookup::Loading(None)
        }
    }

    /// Warms the cache for `request`.
    ///
    /// Returns true if a new job was scheduled. Nothing is scheduled when the
    /// file that would be rendered from is missing.
    pub fn preload_media(&self, request: &MediaRequest) -> bool {
        if request.is_empty() {
            return false;
        }
        let probe = request.probe_path();
        if !self.source.is_readable(probe) {
            debug!(path = %probe.display(), "Skipping preload of unreadable media");
            return false;
        }

        let fingerprint = request.fingerprint();
        let mut state = self.state.lock();
        if state.store.contains(&fingerprint) || state.in_flight.contains(&fingerprint) {
            return false;
        }
        self.schedule(&mut state, fingerprint, request).is_ok()
    }

    fn schedule(
        &self,
        state: &mut CacheState,
        fingerprint: Fingerprint,
        request: &MediaRequest,
    ) -> MediaResult<()> {
        if state.in_flight.contains(&fingerprint) {
            trace!(fingerprint = %fingerprint, "Job already in flight");
            return Ok(());
        }

        self.runner.submit(RenderJob {
            fingerprint: fingerprint.clone(),
            request: request.clone(),
        })?;
        debug!(
            fingerprint = %fingerprint,
            path = %request.path.display(),
            category = %request.category,
            size = %request.size,
            "Scheduled media job"
        );
        state.failed.pop(&fingerprint);
        state.in_flight.insert(fingerprint);
        Ok(())
    }

    /// Forgets that `fingerprint` is in flight so the next request schedules again.
    ///
    /// A running job is not interrupted and its result is still cached.
    pub fn cancel_loading(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.state.lock().in_flight.remove(fingerprint);
        if removed {
            debug!(fingerprint = %fingerprint, "Cancelled in-flight marker");
        }
        removed
    }

    /// Drops every cached bitmap and every remembered failure.
    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        let entries = state.store.len();
        let failed = state.failed.len();
        state.store.clear();
        state.failed.clear();
        info!(entries, failed, "Cleared media cache");
    }

    /// Changes the cache budget, returning how many entries were evicted.
    pub fn set_cache_size(&self, budget_kb: u64) -> usize {
        let evicted = self.state.lock().store.set_budget(budget_kb);
        debug!(budget_kb, evicted, "Cache budget changed");
        evicted
    }

    /// Removes entries idle for longer than `max_age`.
    ///
    /// Failures recorded longer ago than `max_age` are forgotten as well.
    pub fn cleanup_old_resources(&self, max_age: Duration) -> usize {
        let mut state = self.state.lock();
        let stale: Vec<Fingerprint> = state
            .failed
            .iter()
            .filter(|(_, at)| at.elapsed() > max_age)
            .map(|(fingerprint, _)| fingerprint.clone())
            .collect();
        for fingerprint in &stale {
            state.failed.pop(fingerprint);
        }
        if !stale.is_empty() {
            trace!(forgotten = stale.len(), "Dropped stale failure markers");
        }
        state.store.sweep_expired(max_age)
    }

    /// Lifecycle state of `fingerprint`.
    #[must_use]
    pub fn state(&self, fingerprint: &Fingerprint) -> MediaState {
        let state = self.state.lock();
        if state.in_flight.contains(fingerprint) {
            MediaState::Pending
        } else if state.store.contains(fingerprint) {
            MediaState::Cached
        } else if state.failed.contains(fingerprint) {
            MediaState::Failed
        } else {
            MediaState::Absent
        }
    }

    /// Returns true if a job for `fingerprint` is in flight.
    #[must_use]
    pub fn is_loading(&self, fingerprint: &Fingerprint) -> bool {
        self.state.lock().in_flight.contains(fingerprint)
    }

    /// Number of remembered failures.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.state.lock().failed.len()
    }

    /// Number of fingerprints in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.state.lock().store.stats()
    }

    /// Jobs scheduled since creation.
    #[must_use]
    pub fn jobs_submitted(&self) -> u64 {
        self.runner.submitted()
    }

    /// Applies every completion already delivered, without waiting.
    pub fn dispatch_completions(&self) -> usize {
        let Ok(mut rx) = self.completions.try_lock() else {
            return 0;
        };
        let mut applied = 0;
        while let Ok(completion) = rx.try_recv() {
            self.apply_completion(completion);
            applied += 1;
        }
        applied
    }

    /// Waits for the next completion and applies it.
    ///
    /// Returns false if no completion can arrive any more.
    pub async fn dispatch_next(&self) -> bool {
        let completion = self.completions.lock().await.recv().await;
        completion.is_some_and(|completion| {
            self.apply_completion(completion);
            true
        })
    }

    /// Applies completions until every job scheduled so far has been delivered.
    pub async fn settle(&self) {
        while self.applied.load(Ordering::Acquire) < self.runner.submitted() {
            if !self.dispatch_next().await {
                break;
            }
        }
    }

    fn apply_completion(&self, completion: Completion) {
        let Completion {
            fingerprint,
            path,
            category,
            result,
        } = completion;

        let event = {
            let mut state = self.state.lock();
            state.in_flight.remove(&fingerprint);
            match result {
                Ok(bitmap) => {
                    state.failed.pop(&fingerprint);
                    state
                        .store
                        .put(fingerprint.clone(), bitmap.clone(), category);
                    MediaEvent::Ready {
                        path,
                        category,
                        fingerprint,
                        bitmap,
                    }
                }
                Err(error) => {
                    state.failed.put(fingerprint.clone(), Instant::now());
                    MediaEvent::Failed {
                        path,
                        category,
                        fingerprint,
                        error,
                    }
                }
            }
        };
        self.applied.fetch_add(1, Ordering::Release);

        if self.event_tx.send(event).is_err() {
            trace!("No media event subscribers");
        }
    }

    /// Runs [`Self::cleanup_old_resources`] every `every` until the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, max_age: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let every = every.max(Duration::from_millis(1));

        self.runner.handle().spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                let removed = manager.cleanup_old_resources(max_age);
                if removed > 0 {
                    debug!(removed, "Expiry sweep finished");
                }
            }

            debug!("Expiry sweeper stopped");
        })
    }

    /// Stops scheduling and waits for every running job, applying its result.
    pub async fn shutdown(&self) {
        let mut running = self.runner.close();
        info!(running = running.len(), "Shutting down media manager");

        let mut rx = self.completions.lock().await;
        loop {
            tokio::select! {
                joined = running.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => warn!(error = %e, "Render task aborted"),
                    None => break,
                },
                Some(completion) = rx.recv() => self.apply_completion(completion),
            }
        }
        while let Ok(completion) = rx.try_recv() {
            self.apply_completion(completion);
        }

        let state = self.state.lock();
        info!(entries = state.store.len(), "Media manager stopped");
    }
}
