//! Source video loading and metadata probing.

use crate::cache::CacheVariant;
use crate::config::Config;
use encsweep_av::{ColorInfo, Engine};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// A source video with probed metadata and its derived cache variants.
#[derive(Debug, Clone)]
pub struct Video {
    pub name: String,
    pub file: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub duration: f64,
    pub color: ColorInfo,
    pub caches: BTreeMap<String, CacheVariant>,
}

/// Probe every enabled video concurrently.
///
/// A video whose file is missing or whose probe fails is logged and
/// dropped; the rest of the run proceeds without it. The returned map is
/// ordered by name, regardless of configuration order.
pub async fn load_videos(config: &Config, engine: Arc<Engine>) -> BTreeMap<String, Video> {
    let mut tasks = Vec::new();

    for (name, video_config) in &config.videos {
        if !video_config.enabled {
            tracing::debug!("{}: disabled, skipping", name);
            continue;
        }

        let name = name.clone();
        let file = config.paths.videos.join(format!("{}.mkv", name));
        let engine = engine.clone();

        tasks.push(tokio::spawn(async move {
            match tokio::fs::try_exists(&file).await {
                Ok(true) => {}
                _ => {
                    tracing::error!("{}: {} does not exist", name, file.display());
                    return None;
                }
            }

            let started = Instant::now();
            let probe_file = file.clone();
            let probed = tokio::task::spawn_blocking(move || engine.probe(&probe_file)).await;

            let info = match probed {
                Ok(Ok(info)) => info,
                Ok(Err(err)) => {
                    tracing::error!("{}: probe failed: {}", name, err);
                    return None;
                }
                Err(err) => {
                    tracing::error!("{}: probe task failed: {}", name, err);
                    return None;
                }
            };

            let Some(duration) = info.duration else {
                tracing::error!("{}: probe reported no duration", name);
                return None;
            };

            tracing::info!(
                "{}: {}x{} @ {:.2} fps, {:.1}s ({:.2?})",
                name,
                info.width,
                info.height,
                info.frame_rate,
                duration,
                started.elapsed()
            );

            Some((
                name.clone(),
                Video {
                    name,
                    file,
                    width: info.width,
                    height: info.height,
                    frame_rate: info.frame_rate,
                    duration,
                    color: info.color,
                    caches: BTreeMap::new(),
                },
            ))
        }));
    }

    // Full barrier; individual failures only drop their own video.
    let mut videos = BTreeMap::new();
    for joined in join_all(tasks).await {
        if let Ok(Some((name, video))) = joined {
            videos.insert(name, video);
        }
    }
    videos
}
