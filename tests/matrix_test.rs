//! Job-matrix construction and idempotent skip-on-completion.

use encsweep::cache::CacheVariant;
use encsweep::config::{Config, EncoderConfig};
use encsweep::encoders::{Encoder, Registry, X264Family};
use encsweep::matrix::{self, BatchQueues};
use encsweep::video::Video;
use std::collections::BTreeMap;
use std::path::Path;

fn test_registry() -> Registry {
    let encoder_config = EncoderConfig {
        enabled: true,
        pool: "cpu".to_string(),
        presets: vec!["veryfast".to_string(), "medium".to_string()],
        tunes: vec!["none".to_string()],
        threads: 16,
        ..EncoderConfig::default()
    };
    let family = Box::new(X264Family::new(&encoder_config));

    let mut registry = Registry::new();
    registry.insert(
        "libx264".to_string(),
        Encoder::load("libx264".to_string(), family).unwrap(),
    );
    registry
}

fn test_config(output: &Path) -> Config {
    let mut config = Config::default();
    config.paths.output = output.to_path_buf();
    config.options.bitrates = vec![2000, 4000];
    config.options.keyframe_multipliers = vec![1.0];
    config
}

fn test_video() -> Video {
    Video {
        name: "clip_a".to_string(),
        file: "/videos/clip_a.mkv".into(),
        width: 2560,
        height: 1440,
        frame_rate: 60.0,
        duration: 30.0,
        color: Default::default(),
        caches: BTreeMap::new(),
    }
}

fn test_variant() -> CacheVariant {
    CacheVariant {
        key: "1920x1080x60.00".to_string(),
        width: 1920,
        height: 1080,
        frame_rate: 60.0,
        duration: 30.0,
        file: "/cache/clip_a-1920x1080x60.00.mkv".into(),
    }
}

fn all_jobs(queues: &BatchQueues) -> Vec<&matrix::JobFiles> {
    queues.files.values().flatten().flatten().collect()
}

fn job_count(queues: &BatchQueues) -> usize {
    all_jobs(queues).len()
}

#[tokio::test]
async fn matrix_covers_the_full_cross_product() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let config = test_config(dir.path());

    let queues =
        matrix::build_variant_queues("clip_a", &test_variant(), &registry, &config).await;

    // 2 presets x 1 tune x 2 bitrates x 1 multiplier = 4 jobs.
    assert_eq!(job_count(&queues), 4);
    assert!(queues.commands.contains_key("cpu"));

    // Paths follow <output>/<video>/<cacheKey>/<encoder>/<bitrate>/<gop>.
    let jobs = all_jobs(&queues);
    let expected_prefix = dir
        .path()
        .join("clip_a")
        .join("1920x1080x60.00")
        .join("libx264");
    assert!(jobs.iter().all(|j| j.output.starts_with(&expected_prefix)));
    assert!(jobs.iter().any(|j| {
        j.metrics
            .parent()
            .map(|p| p.ends_with("2000/60"))
            .unwrap_or(false)
    }));
}

#[tokio::test]
async fn command_and_file_queues_stay_in_lockstep() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let config = test_config(dir.path());

    let queues =
        matrix::build_variant_queues("clip_a", &test_variant(), &registry, &config).await;

    assert_eq!(
        queues.commands.keys().collect::<Vec<_>>(),
        queues.files.keys().collect::<Vec<_>>()
    );
    for (pool, bins) in &queues.commands {
        assert_eq!(bins.len(), queues.files[pool].len());
    }
}

#[tokio::test]
async fn existing_metrics_file_skips_that_job() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let config = test_config(dir.path());
    let variant = test_variant();

    let first = matrix::build_variant_queues("clip_a", &variant, &registry, &config).await;
    let before = job_count(&first);
    assert!(before > 0);

    // Mark one job complete: only its metrics file, no media output.
    let completed = all_jobs(&first)[0].clone();
    std::fs::create_dir_all(completed.metrics.parent().unwrap()).unwrap();
    std::fs::write(&completed.metrics, b"{}").unwrap();

    let second = matrix::build_variant_queues("clip_a", &variant, &registry, &config).await;
    assert_eq!(job_count(&second), before - 1);
    assert!(!all_jobs(&second)
        .iter()
        .any(|j| j.metrics == completed.metrics));
}

#[tokio::test]
async fn fully_completed_matrix_produces_no_batches() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let config = test_config(dir.path());
    let variant = test_variant();

    let first = matrix::build_variant_queues("clip_a", &variant, &registry, &config).await;
    for job in all_jobs(&first) {
        std::fs::create_dir_all(job.metrics.parent().unwrap()).unwrap();
        std::fs::write(&job.metrics, b"{}").unwrap();
    }

    let second = matrix::build_variant_queues("clip_a", &variant, &registry, &config).await;
    assert!(second.is_empty());
    assert_eq!(second.total_batches(), 0);
}

#[tokio::test]
async fn fragments_target_the_configured_gop_and_bitrate() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let mut config = test_config(dir.path());
    config.options.bitrates = vec![4000];
    config.options.keyframe_multipliers = vec![2.0];

    let queues =
        matrix::build_variant_queues("clip_a", &test_variant(), &registry, &config).await;
    let bins = &queues.commands["cpu"];
    let fragment: Vec<&String> = bins.iter().flatten().collect();

    // GOP = 60 fps x 2.0.
    assert!(fragment.windows(2).any(|w| *w[0] == "-g" && *w[1] == "120"));
    assert!(fragment
        .windows(2)
        .any(|w| *w[0] == "-b:v" && *w[1] == "4000k"));
    assert!(fragment
        .windows(2)
        .any(|w| *w[0] == "-bufsize" && *w[1] == "8000k"));
    assert!(fragment
        .windows(2)
        .any(|w| *w[0] == "-c:v" && *w[1] == "libx264"));
}

#[tokio::test]
async fn plan_groups_queues_per_video_and_variant() {
    let dir = tempfile::tempdir().unwrap();
    let registry = std::sync::Arc::new(test_registry());
    let config = std::sync::Arc::new(test_config(dir.path()));

    let mut video = test_video();
    let variant = test_variant();
    video.caches.insert(variant.key.clone(), variant);
    let mut videos = BTreeMap::new();
    videos.insert(video.name.clone(), video);

    let plan = matrix::build_plan(&videos, registry, config).await;
    assert_eq!(plan.queues.len(), 1);
    assert!(plan.queues["clip_a"].contains_key("1920x1080x60.00"));
    assert_eq!(plan.total_batches(), plan.queues["clip_a"]["1920x1080x60.00"].total_batches());
    assert!(plan.total_batches() > 0);
}
