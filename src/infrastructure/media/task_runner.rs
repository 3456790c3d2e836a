//! Bounded background pool running decode/render jobs.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::domain::entities::{Fingerprint, MediaBitmap, MediaCategory, MediaRequest};
use crate::domain::errors::{MediaError, MediaResult};
use crate::domain::ports::MediaSourcePort;

use super::render::Renderer;

/// A unit of work for the pool.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Cache key the result is stored under.
    pub fingerprint: Fingerprint,
    /// Copy of the request inputs.
    pub request: MediaRequest,
}

impl RenderJob {
    /// Creates a job for `request`, deriving its fingerprint.
    #[must_use]
    pub fn new(request: MediaRequest) -> Self {
        Self {
            fingerprint: request.fingerprint(),
            request,
        }
    }
}

/// Result of a job, handed back to the owning manager.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Cache key of the finished job.
    pub fingerprint: Fingerprint,
    /// Source path of the original request.
    pub path: PathBuf,
    /// Requested category.
    pub category: MediaCategory,
    /// Rendered bitmap, or why there is none.
    pub result: MediaResult<MediaBitmap>,
}

impl Completion {
    /// Returns true if the job produced a bitmap.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs jobs on a tokio runtime with at most `workers` renders at once.
pub struct TaskRunner {
    handle: Handle,
    permits: Arc<Semaphore>,
    renderer: Arc<Renderer>,
    source: Arc<dyn MediaSourcePort>,
    completion_tx: mpsc::Sender<Completion>,
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
    submitted: AtomicU64,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("available_permits", &self.permits.available_permits())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("submitted", &self.submitted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    /// Creates a runner spawning onto `handle`.
    #[must_use]
    pub fn new(
        workers: usize,
        handle: Handle,
        renderer: Arc<Renderer>,
        source: Arc<dyn MediaSourcePort>,
        completion_tx: mpsc::Sender<Completion>,
    ) -> Self {
        debug!(workers, "Starting render pool");
        Self {
            handle,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            renderer,
            source,
            completion_tx,
            tasks: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
        }
    }

    /// Runtime the jobs run on.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Queues a job. Exactly one [`Completion`] is sent for every accepted job.
    ///
    /// # Errors
    /// Returns `ShutDown` once [`Self::close`] has been called.
    pub fn submit(&self, job: RenderJob) -> MediaResult<()> {
        let mut tasks = self.tasks.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(MediaError::ShutDown);
        }
        while tasks.try_join_next().is_some() {}

        trace!(
            fingerprint = %job.fingerprint,
            category = %job.request.category,
            "Submitting render job"
        );
        tasks.spawn_on(
            run_job(
                job,
                self.permits.clone(),
                self.renderer.clone(),
                self.source.clone(),
                self.completion_tx.clone(),
            ),
            &self.handle,
        );
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stops accepting jobs and hands back every job still running.
    pub fn close(&self) -> JoinSet<()> {
        let mut tasks = self.tasks.lock();
        self.closed.store(true, Ordering::Release);
        std::mem::take(&mut *tasks)
    }

    /// Returns true once [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Jobs accepted since creation.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

async fn run_job(
    job: RenderJob,
    permits: Arc<Semaphore>,
    renderer: Arc<Renderer>,
    source: Arc<dyn MediaSourcePort>,
    completion_tx: mpsc::Sender<Completion>,
) {
    // The semaphore is never closed; a missing permit only lifts the bound.
    let _permit = permits.acquire_owned().await.ok();

    let RenderJob {
        fingerprint,
        request,
    } = job;
    let path = request.path.clone();
    let category = request.category;

    let result = tokio::task::spawn_blocking(move || renderer.render_request(source.as_ref(), &request))
        .await
        .unwrap_or_else(|e| Err(MediaError::Decode(format!("render task failed: {e}"))));

    match &result {
        Ok(bitmap) => trace!(
            fingerprint = %fingerprint,
            width = bitmap.width(),
            height = bitmap.height(),
            expired = bitmap.is_expired(),
            "Render job finished"
        ),
        Err(e) if e.is_missing_source() => debug!(
            fingerprint = %fingerprint,
            path = %path.display(),
            error = %e,
            "Render job found no source"
        ),
        Err(e) => warn!(
            fingerprint = %fingerprint,
            path = %path.display(),
            category = %category,
            error = %e,
            "Render job failed"
        ),
    }

    let completion = Completion {
        fingerprint,
        path,
        category,
        result,
    };
    if completion_tx.send(completion).await.is_err() {
        debug!("Completion receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::MediaSize;
    use crate::domain::ports::mocks::MockMediaSourcePort;
    use crate::infrastructure::config::Labels;
    use image::DynamicImage;

    fn runner(source: MockMediaSourcePort) -> (TaskRunner, mpsc::Receiver<Completion>) {
        let (tx, rx) = mpsc::channel(8);
        let runner = TaskRunner::new(
            2,
            Handle::current(),
            Arc::new(Renderer::new(Labels::default())),
            Arc::new(source),
            tx,
        );
        (runner, rx)
    }

    #[tokio::test]
    async fn test_successful_job_delivers_bitmap() {
        let mut source = MockMediaSourcePort::new();
        source.expect_is_readable().returning(|_| true);
        source
            .expect_decode()
            .times(1)
            .returning(|_| Ok(DynamicImage::new_rgba8(200, 100)));
        let (runner, mut rx) = runner(source);

        let request = MediaRequest::new("a.png", MediaSize::square(50), MediaCategory::FileIcon);
        let fingerprint = request.fingerprint();
        runner.submit(RenderJob::new(request)).unwrap();

        let completion = rx.recv().await.unwrap();
        assert!(completion.is_success());
        assert_eq!(completion.fingerprint, fingerprint);
        assert_eq!(completion.category, MediaCategory::FileIcon);
        let bitmap = completion.result.unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (50, 25));
    }

    #[tokio::test]
    async fn test_failed_job_is_reported_not_raised() {
        let mut source = MockMediaSourcePort::new();
        source.expect_is_readable().returning(|_| false);
        let (runner, mut rx) = runner(source);

        runner
            .submit(RenderJob::new(MediaRequest::new(
                "gone.png",
                MediaSize::NATURAL,
                MediaCategory::OriginalImage,
            )))
            .unwrap();

        let completion = rx.recv().await.unwrap();
        assert!(!completion.is_success());
        assert_eq!(completion.path, PathBuf::from("gone.png"));
        assert!(matches!(completion.result, Err(MediaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_close_rejects_and_returns_running_jobs() {
        let mut source = MockMediaSourcePort::new();
        source.expect_is_readable().returning(|_| true);
        source
            .expect_decode()
            .returning(|_| Ok(DynamicImage::new_rgba8(4, 4)));
        let (runner, mut rx) = runner(source);

        for name in ["a.png", "b.png", "c.png"] {
            let request = MediaRequest::new(name, MediaSize::NATURAL, MediaCategory::FileIcon);
            runner.submit(RenderJob::new(request)).unwrap();
        }
        assert_eq!(runner.submitted(), 3);

        let mut running = runner.close();
        assert!(runner.is_closed());
        assert_eq!(running.len(), 3);
        let rejected = runner.submit(RenderJob::new(MediaRequest::new(
            "d.png",
            MediaSize::NATURAL,
            MediaCategory::FileIcon,
        )));
        assert_eq!(rejected, Err(MediaError::ShutDown));

        while let Some(joined) = running.join_next().await {
            joined.unwrap();
        }
        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 3);
    }
}
