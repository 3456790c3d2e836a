//! Generates thumbnail files on disk.
//!
//! Separate from the in-memory cache: one image job and one video job run at
//! a time, further tasks wait in per-kind FIFO queues.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

use crate::domain::entities::{MediaKind, ThumbnailTask};
use crate::domain::errors::{MediaError, MediaResult};
use crate::domain::ports::MediaSourcePort;

use super::render::{DEFAULT_THUMBNAIL_EDGE, Renderer, scale_to_fit};

/// Outcome of one persisted thumbnail task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailEvent {
    /// The thumbnail was written to `path`.
    Saved {
        /// Original image or video.
        source: PathBuf,
        /// Written thumbnail file.
        path: PathBuf,
    },
    /// Nothing was written.
    Failed {
        /// Original image or video.
        source: PathBuf,
        /// What went wrong.
        error: MediaError,
    },
}

#[derive(Debug, Default)]
struct Lane {
    busy: bool,
    queue: VecDeque<ThumbnailTask>,
}

#[derive(Debug, Default)]
struct Lanes {
    image: Lane,
    video: Lane,
}

impl Lanes {
    fn lane(&mut self, is_video: bool) -> &mut Lane {
        if is_video { &mut self.video } else { &mut self.image }
    }
}

struct Shared {
    dir: PathBuf,
    renderer: Arc<Renderer>,
    source: Arc<dyn MediaSourcePort>,
    lanes: Mutex<Lanes>,
    idle: Notify,
    event_tx: mpsc::UnboundedSender<ThumbnailEvent>,
    handle: Handle,
}

/// Two-lane writer for persisted thumbnails.
#[derive(Clone)]
pub struct ThumbnailWriter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ThumbnailWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailWriter")
            .field("dir", &self.shared.dir)
            .field("lanes", &*self.shared.lanes.lock())
            .finish_non_exhaustive()
    }
}

impl ThumbnailWriter {
    /// Creates a writer storing files in `dir`, creating it if needed.
    ///
    /// # Errors
    /// Returns `Persist` if the directory cannot be created and `Runtime`
    /// outside a tokio runtime.
    pub fn new(
        dir: impl Into<PathBuf>,
        renderer: Arc<Renderer>,
        source: Arc<dyn MediaSourcePort>,
        event_tx: mpsc::UnboundedSender<ThumbnailEvent>,
    ) -> MediaResult<Self> {
        let dir = dir.into();
        let handle = Handle::try_current().map_err(|e| MediaError::Runtime(e.to_string()))?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| MediaError::Persist(format!("{}: {e}", dir.display())))?;
        info!(dir = %dir.display(), "Thumbnail storage ready");

        Ok(Self {
            shared: Arc::new(Shared {
                dir,
                renderer,
                source,
                lanes: Mutex::new(Lanes::default()),
                idle: Notify::new(),
                event_tx,
                handle,
            }),
        })
    }

    /// Directory thumbnails are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// Starts `task` or queues it behind the running task of the same kind.
    pub fn submit(&self, task: ThumbnailTask) {
        let mut lanes = self.shared.lanes.lock();
        let lane = lanes.lane(task.is_video);
        if lane.busy {
            debug!(source = %task.source.display(), queued = lane.queue.len() + 1, "Thumbnail task queued");
            lane.queue.push_back(task);
            return;
        }
        lane.busy = true;
        drop(lanes);

        let shared = self.shared.clone();
        self.shared.handle.spawn(run_lane(shared, task));
    }

    /// Tasks waiting behind the running one.
    #[must_use]
    pub fn queued(&self, is_video: bool) -> usize {
        self.shared.lanes.lock().lane(is_video).queue.len()
    }

    /// Returns true while any lane has a running task.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        let lanes = self.shared.lanes.lock();
        lanes.image.busy || lanes.video.busy
    }

    /// File path `task` is written to, given the current source metadata.
    ///
    /// # Errors
    /// Returns `NotFound`/`Unreadable` if the source cannot be stat'ed and
    /// `Persist` for an explicit name that would leave the directory.
    pub fn thumbnail_path(&self, task: &ThumbnailTask) -> MediaResult<PathBuf> {
        self.shared.thumbnail_path(task)
    }

    /// Waits until both lanes have drained.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }
}

async fn run_lane(shared: Arc<Shared>, first: ThumbnailTask) {
    let is_video = first.is_video;
    let mut next = Some(first);

    while let Some(task) = next {
        let source = task.source.clone();
        let worker = shared.clone();
        let event = match tokio::task::spawn_blocking(move || worker.generate(&task)).await {
            Ok(Ok(path)) => ThumbnailEvent::Saved { source, path },
            Ok(Err(error)) => ThumbnailEvent::Failed { source, error },
            Err(e) => ThumbnailEvent::Failed {
                source,
                error: MediaError::Persist(format!("thumbnail task failed: {e}")),
            },
        };

        match &event {
            ThumbnailEvent::Saved { path, .. } => debug!(path = %path.display(), "Thumbnail saved"),
            ThumbnailEvent::Failed { source, error } => {
                warn!(source = %source.display(), error = %error, "Thumbnail generation failed");
            }
        }
        if shared.event_tx.send(event).is_err() {
            debug!("Thumbnail event receiver dropped");
        }

        next = {
            let mut lanes = shared.lanes.lock();
            let lane = lanes.lane(is_video);
            let queued = lane.queue.pop_front();
            if queued.is_none() {
                lane.busy = false;
            }
            queued
        };
    }

    shared.idle.notify_waiters();
}

impl Shared {
    fn thumbnail_path(&self, task: &ThumbnailTask) -> MediaResult<PathBuf> {
        let modified = self.source.modified(&task.source)?;
        Ok(self.dir.join(task.file_name(modified)?))
    }

    fn generate(&self, task: &ThumbnailTask) -> MediaResult<PathBuf> {
        if task.source.as_os_str().is_empty() {
            return Err(MediaError::EmptyPath);
        }
        let path = self.thumbnail_path(task)?;
        let size = task.size.or_square(DEFAULT_THUMBNAIL_EDGE);

        let image = if task.is_video {
            self.renderer.default_thumbnail(size, MediaKind::Video)
        } else {
            scale_to_fit(&self.source.decode(&task.source)?, size)
        };

        let persist = |e: &dyn std::fmt::Display| MediaError::Persist(format!("{}: {e}", path.display()));
        let mut file = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| persist(&e))?;
        image
            .write_to(&mut file, ImageFormat::Png)
            .map_err(|e| persist(&e))?;
        file.persist(&path).map_err(|e| persist(&e.error))?;
        Ok(path)
    }
}
