use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, bail};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mediacache::domain::entities::{MediaCategory, MediaRequest, MediaSize, ThumbnailTask};
use mediacache::domain::ports::MediaSourcePort;
use mediacache::infrastructure::{
    AppConfig, CliArgs, Command, FsMediaSource, MediaEvent, MediaManager, Renderer,
    StorageManager, ThumbnailEvent, ThumbnailWriter,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

async fn warm(
    config: &AppConfig,
    renderer: Arc<Renderer>,
    source: Arc<dyn MediaSourcePort>,
    requests: Vec<MediaRequest>,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let manager = Arc::new(MediaManager::new(&config.cache, &event_tx, source, renderer)?);
    let sweeper = manager.spawn_sweeper(config.cache.sweep_interval(), config.cache.max_age());

    for request in &requests {
        if !manager.preload_media(request) {
            warn!(path = %request.path.display(), "Not scheduled");
        }
    }

    manager.settle().await;
    while let Ok(event) = event_rx.try_recv() {
        match event {
            MediaEvent::Ready { path, bitmap, .. } => {
                let state = if bitmap.is_expired() { " expired" } else { "" };
                println!(
                    "ready  {} {}x{}{state}",
                    path.display(),
                    bitmap.width(),
                    bitmap.height()
                );
            }
            MediaEvent::Failed { path, error, .. } => {
                println!("failed {} {error}", path.display());
            }
        }
    }

    manager.shutdown().await;
    sweeper.abort();
    println!("{}", manager.stats());
    Ok(())
}

async fn thumbnail(
    config: &AppConfig,
    renderer: Arc<Renderer>,
    source: Arc<dyn MediaSourcePort>,
    tasks: Vec<ThumbnailTask>,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let writer = ThumbnailWriter::new(
        config.thumbnails.effective_dir(),
        renderer,
        source,
        event_tx,
    )?;

    for task in tasks {
        writer.submit(task);
    }
    writer.wait_idle().await;

    let mut failed = 0usize;
    while let Ok(event) = event_rx.try_recv() {
        match event {
            ThumbnailEvent::Saved { source, path } => {
                println!("saved  {} -> {}", source.display(), path.display());
            }
            ThumbnailEvent::Failed { source, error } => {
                failed += 1;
                println!("failed {} {error}", source.display());
            }
        }
    }

    if failed > 0 {
        bail!("{failed} thumbnail(s) could not be generated");
    }
    Ok(())
}

fn warm_requests(
    paths: Vec<PathBuf>,
    icons: &[PathBuf],
    category: MediaCategory,
    size: MediaSize,
    radius: u32,
) -> Vec<MediaRequest> {
    paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let request = MediaRequest::new(path, size, category).with_radius(radius);
            match icons.get(i) {
                Some(icon) => request.with_aux_path(icon),
                None => request,
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = mediacache::VERSION, "Starting mediacache");

    let renderer = Arc::new(Renderer::from_config(&config.render));
    let source: Arc<dyn MediaSourcePort> = Arc::new(FsMediaSource::new());

    match args.command {
        Command::Warm {
            paths,
            category,
            size,
            radius,
            icons,
        } => {
            let requests = warm_requests(paths, &icons, category, size, radius);
            warm(&config, renderer, source, requests).await
        }
        Command::Thumbnail {
            paths,
            size,
            video,
            name,
        } => {
            if name.is_some() && paths.len() > 1 {
                bail!("--name can only be used with a single source");
            }
            let size = size.unwrap_or(MediaSize::square(config.thumbnails.size));
            let tasks = paths
                .into_iter()
                .map(|path| {
                    let task = if video {
                        ThumbnailTask::video(path, size)
                    } else {
                        ThumbnailTask::image(path, size)
                    };
                    match &name {
                        Some(name) => task.with_name(name.clone()),
                        None => task,
                    }
                })
                .collect();
            thumbnail(&config, renderer, source, tasks).await
        }
    }
}
