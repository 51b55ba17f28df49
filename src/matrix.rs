//! Cross-product job matrix and per-variant batch queues.
//!
//! For every video × cache variant × encoder × combination × bitrate ×
//! keyframe multiplier, this builds a command fragment and a matching
//! output/metrics path pair and feeds both into per-pool batch queues.
//! A job whose metrics file already exists is complete and is skipped, so
//! re-running the sweep only schedules the remaining work.

use crate::cache::CacheVariant;
use crate::config::Config;
use crate::encoders::Registry;
use crate::queue::PoolQueue;
use crate::video::Video;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Output and metrics paths of one job. The metrics file's existence is
/// the job's completion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFiles {
    pub output: PathBuf,
    pub metrics: PathBuf,
}

/// The finalized batch queues of one cache variant: command fragments and
/// file pairs, bin-aligned 1:1 because both queues receive identical push
/// sequences.
#[derive(Debug, Default)]
pub struct BatchQueues {
    pub commands: BTreeMap<String, Vec<Vec<String>>>,
    pub files: BTreeMap<String, Vec<Vec<JobFiles>>>,
}

impl BatchQueues {
    pub fn total_batches(&self) -> usize {
        self.commands.values().map(|bins| bins.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_batches() == 0
    }
}

/// Batch queues for every (video, cache variant) pair, keyed like the
/// video map.
#[derive(Debug, Default)]
pub struct Plan {
    pub queues: BTreeMap<String, BTreeMap<String, BatchQueues>>,
}

impl Plan {
    pub fn total_batches(&self) -> usize {
        self.queues
            .values()
            .flat_map(|variants| variants.values())
            .map(|queues| queues.total_batches())
            .sum()
    }
}

/// Build the batch queues for one cache variant.
pub async fn build_variant_queues(
    video_name: &str,
    variant: &CacheVariant,
    registry: &Registry,
    config: &Config,
) -> BatchQueues {
    let mut commands = PoolQueue::new();
    let mut files = PoolQueue::new();

    for (encoder_name, encoder) in registry.iter() {
        let pool = encoder.pool();
        let extra = encoder.extra_args();

        for combination in &encoder.combinations {
            let cost =
                encoder.scaled_cost(combination, variant.width, variant.height, variant.frame_rate);

            for &bitrate in &config.options.bitrates {
                for &multiplier in &config.options.keyframe_multipliers {
                    let gop = (variant.frame_rate * multiplier).round() as u32;
                    let dir = config
                        .paths
                        .output
                        .join(video_name)
                        .join(&variant.key)
                        .join(encoder_name)
                        .join(bitrate.to_string())
                        .join(gop.to_string());
                    let output = dir.join(format!("{}.mkv", combination.hash));
                    let metrics = dir.join(format!("{}.json", combination.hash));

                    // Completed on a previous run; only the metrics file
                    // matters.
                    if tokio::fs::try_exists(&metrics).await.unwrap_or(false) {
                        tracing::trace!("{} already completed", output.display());
                        continue;
                    }

                    let fragment =
                        job_fragment(encoder_name, gop, bitrate, combination.args(), &extra, &output);
                    commands.push(pool, fragment, cost);
                    files.push(
                        pool,
                        [JobFiles {
                            output,
                            metrics,
                        }],
                        cost,
                    );
                }
            }
        }
    }

    BatchQueues {
        commands: commands.finalize(),
        files: files.finalize(),
    }
}

fn job_fragment(
    encoder_name: &str,
    gop: u32,
    bitrate: u32,
    combination_args: Vec<String>,
    extra: &[String],
    output: &Path,
) -> Vec<String> {
    let mut fragment: Vec<String> = vec![
        "-map".to_string(),
        "0:v:0".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        encoder_name.to_string(),
        "-g".to_string(),
        gop.to_string(),
        "-b:v".to_string(),
        format!("{}k", bitrate),
        "-minrate".to_string(),
        "0".to_string(),
        "-maxrate".to_string(),
        "0".to_string(),
        "-bufsize".to_string(),
        format!("{}k", 2 * bitrate),
    ];
    fragment.extend(combination_args);
    fragment.extend(extra.iter().cloned());
    fragment.push(output.to_string_lossy().into_owned());
    fragment
}

/// Build batch queues for every (video, cache variant) pair concurrently.
///
/// Pairs are processed as independent tasks joined at a full barrier;
/// bins are only drained after every push for a variant has completed.
pub async fn build_plan(
    videos: &BTreeMap<String, Video>,
    registry: Arc<Registry>,
    config: Arc<Config>,
) -> Plan {
    let started = Instant::now();
    let mut tasks = Vec::new();

    for (video_name, video) in videos {
        for variant in video.caches.values() {
            let video_name = video_name.clone();
            let variant = variant.clone();
            let registry = registry.clone();
            let config = config.clone();

            tasks.push(tokio::spawn(async move {
                let queues =
                    build_variant_queues(&video_name, &variant, &registry, &config).await;
                (video_name, variant.key, queues)
            }));
        }
    }

    let mut plan = Plan::default();
    for joined in join_all(tasks).await {
        match joined {
            Ok((video_name, cache_key, queues)) => {
                plan.queues
                    .entry(video_name)
                    .or_default()
                    .insert(cache_key, queues);
            }
            Err(err) => tracing::error!("matrix task failed: {}", err),
        }
    }

    tracing::info!(
        "planned {} batches ({:.2?})",
        plan.total_batches(),
        started.elapsed()
    );
    plan
}
