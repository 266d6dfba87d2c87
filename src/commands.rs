use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::{Config, validate_frame_interval};
use crate::database::VectorStore;
use crate::indexer::VideoIndexer;
use crate::library::VideoLibrary;
use crate::models::OllamaClient;
use crate::video::FfmpegDecoder;

const PROGRESS_STEPS: u64 = 1000;

/// Outcome of a batch indexing run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub not_stored: usize,
}

/// Stored identity for a path given on the command line
fn video_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn progress_bar(path: &Path) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(PROGRESS_STEPS).with_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {percent:>3}% {msg}")
            .expect("style template is valid"),
    );
    bar.set_message(
        path.file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
    );
    bar
}

/// Index every video in `paths`, skipping the ones that fail
#[inline]
pub async fn index_videos(
    config: &Config,
    paths: &[PathBuf],
    interval: Option<f64>,
) -> Result<IndexReport> {
    let interval = interval.unwrap_or(config.sampling.frame_interval_secs);
    validate_frame_interval(interval)?;

    let decoder = FfmpegDecoder::new(&config.sampling);
    if !decoder.is_available() {
        bail!(
            "ffmpeg and ffprobe are required (looked for {} and {})",
            config.sampling.ffmpeg_path.display(),
            config.sampling.ffprobe_path.display()
        );
    }

    let client = OllamaClient::new(config).context("Failed to initialize Ollama client")?;
    client
        .health_check()
        .context("Ollama is not ready; run 'video-search status' for details")?;

    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;
    let library = VideoLibrary::new(VideoIndexer::new(&decoder, &client, &client), store)
        .with_preview_chars(config.store.preview_chars);

    let keys: Vec<PathBuf> = paths.iter().map(|path| video_key(path)).collect();
    index_batch(&library, &keys, interval).await
}

/// Index `paths` one after another into `library`.
///
/// A video that fails to process, or that the store refuses while still answering,
/// is reported and skipped. A store that no longer answers aborts the batch.
#[inline]
pub async fn index_batch(
    library: &VideoLibrary<'_>,
    paths: &[PathBuf],
    interval: f64,
) -> Result<IndexReport> {
    let mut report = IndexReport::default();
    info!("Indexing {} videos every {}s", paths.len(), interval);

    for path in paths {
        let bar = progress_bar(path);
        let mut on_progress = |fraction: f64| {
            bar.set_position((fraction * PROGRESS_STEPS as f64).round() as u64);
        };

        let result = library
            .process_and_index(path, interval, Some(&mut on_progress))
            .await;
        bar.finish_and_clear();

        match result {
            Ok(true) => {
                report.indexed += 1;
                println!("✅ Indexed {}", path.display());
            }
            Ok(false) => {
                // A rejected write is only fatal when the store itself is gone
                library
                    .count()
                    .await
                    .context("Vector store became unusable, aborting")?;
                report.not_stored += 1;
                println!("❌ Could not store {}", path.display());
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.skipped += 1;
                println!("⚠️  Skipped {}: {}", path.display(), e);
            }
        }
    }

    println!();
    println!(
        "Indexed: {}, skipped: {}, not stored: {}",
        report.indexed, report.skipped, report.not_stored
    );
    Ok(report)
}

/// Print the videos closest to `query`
#[inline]
pub async fn search_videos(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(config.store.default_results);

    let decoder = FfmpegDecoder::new(&config.sampling);
    let client = OllamaClient::new(config).context("Failed to initialize Ollama client")?;
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;
    let library = VideoLibrary::new(VideoIndexer::new(&decoder, &client, &client), store);

    let Some(matches) = library.search(query, limit).await? else {
        println!("No videos have been indexed yet.");
        println!("Use 'video-search index <path>' to add some.");
        return Ok(());
    };

    println!("🔍 Results for {:?}:", query);
    println!();
    for (rank, hit) in matches.iter().enumerate() {
        println!(
            "{}. {} {}",
            rank + 1,
            style(&hit.metadata.filename).bold(),
            style(format!("(distance {:.4})", hit.distance)).dim()
        );
        println!("   Path: {}", hit.path);
        println!("   Indexed: {}", hit.metadata.upload_time);
        println!("   {}", hit.summary);
        println!();
    }

    Ok(())
}

/// Print the library view from stored metadata
#[inline]
pub async fn list_videos(config: &Config) -> Result<()> {
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;
    let videos = store.list_all().await.context("Failed to list videos")?;

    if videos.is_empty() {
        println!("No videos have been indexed yet.");
        println!("Use 'video-search index <path>' to add some.");
        return Ok(());
    }

    println!("Indexed Videos ({} total):", videos.len());
    println!();

    for video in &videos {
        println!("🎞️  {}", style(&video.filename).bold());
        println!("   Path: {}", video.path);
        println!("   Indexed: {}", video.upload_time);
        println!("   Summary: {}", video.summary_preview);
        for (key, value) in &video.extra {
            println!("   {}: {}", key, value);
        }
        println!();
    }

    Ok(())
}

/// Remove one video from the library
#[inline]
pub async fn remove_video(config: &Config, path: &Path) -> Result<()> {
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;

    // Try the path as given first, then the key `index` would have stored
    let given = path.to_string_lossy();
    let removed = store.remove(&given).await?
        || store.remove(&video_key(path).to_string_lossy()).await?;

    if removed {
        println!("Removed {}", path.display());
    } else {
        println!("{} is not indexed", path.display());
    }
    Ok(())
}

/// Report store size, decoder availability and model health
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Video Search Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🔍 Vector Database Status:");
    println!("   📁 Path: {}", config.vector_database_path().display());
    match VectorStore::new(config).await {
        Ok(store) => match store.count().await {
            Ok(count) => {
                println!("   ✅ LanceDB: Connected");
                println!("   🎞️  Videos indexed: {}", count);
                println!("   🔢 Dimensions: {}", store.dimension());
            }
            Err(e) => println!("   ⚠️  LanceDB: Connected but unreadable - {}", e),
        },
        Err(e) => {
            error!("Failed to open vector store: {}", e);
            println!("   ❌ LanceDB: Failed to open - {}", e);
        }
    }

    println!();
    println!("🎬 Decoder Status:");
    if FfmpegDecoder::new(&config.sampling).is_available() {
        println!("   ✅ ffmpeg/ffprobe: Available");
    } else {
        println!(
            "   ❌ ffmpeg/ffprobe: Not found ({}, {})",
            config.sampling.ffmpeg_path.display(),
            config.sampling.ffprobe_path.display()
        );
    }
    println!(
        "   ⏱️  Frame interval: {}s",
        config.sampling.frame_interval_secs
    );

    println!();
    println!("🤖 Ollama Status:");
    match OllamaClient::new(config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   👁️  Caption model: {}", config.ollama.caption_model);
                println!("   📋 Embedding model: {}", config.ollama.embedding_model);
            }
            Err(e) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
        },
        Err(e) => println!("   ❌ Ollama: Failed to connect - {}", e),
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'video-search index <path>' to index videos");
    println!("   • Use 'video-search search <text>' to find them");

    Ok(())
}

/// Compact the vector store
#[inline]
pub async fn compact_store(config: &Config) -> Result<()> {
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;
    store.optimize().await.context("Failed to compact store")?;
    println!("Vector store compacted");
    Ok(())
}
