//! Normalized reference renditions per (video, resolution, frame rate).
//!
//! Every job encodes from a cache variant instead of the original source,
//! so the scaling/retiming work is paid once per (video, resolution,
//! rate) instead of once per job. Variants are lossless, audio-stripped,
//! short-GOP renditions that persist across runs and are revalidated by
//! probing before reuse.

use crate::config::Config;
use crate::encoders::Registry;
use crate::video::Video;
use anyhow::{bail, Result};
use encsweep_av::{Engine, MediaInfo};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Frame-rate match tolerance when validating an existing cache file.
pub const FRAME_RATE_TOLERANCE: f64 = 0.01;
/// Duration match tolerance (seconds) against the source duration.
pub const DURATION_TOLERANCE: f64 = 0.1;

// Short fixed GOP so encoders can seek the reference cheaply.
const CACHE_GOP: &str = "15";

/// One normalized rendition target.
#[derive(Debug, Clone)]
pub struct CacheVariant {
    /// `WxHxFPS` key, frame rate with two decimals.
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Duration truncated to a frame-accurate multiple of the scaled
    /// rate.
    pub duration: f64,
    pub file: PathBuf,
}

/// Derive the cache variants for one video from the resolution ladder and
/// frame-rate scalings.
///
/// Heights preserve the source aspect ratio, rounded to the nearest even
/// integer; ladder widths above the source width are skipped.
pub fn derive_variants(
    video: &Video,
    config: &Config,
) -> BTreeMap<String, CacheVariant> {
    let aspect_ratio = video.height as f64 / video.width as f64;
    let mut variants = BTreeMap::new();

    for &width in &config.options.resolutions {
        if width > video.width {
            tracing::debug!("{}: ladder width {} exceeds source, skipped", video.name, width);
            continue;
        }
        let height = ((width as f64 * aspect_ratio / 2.0).round() as u32) * 2;

        for &scale in &config.options.framerate_scalings {
            let frame_rate = video.frame_rate * scale;
            let key = format!("{}x{}x{:.2}", width, height, frame_rate);
            let duration = (video.duration * video.frame_rate * scale).floor() / frame_rate;
            let file = config
                .paths
                .cache
                .join(format!("{}-{}.mkv", video.name, key));

            variants.insert(
                key.clone(),
                CacheVariant {
                    key,
                    width,
                    height,
                    frame_rate,
                    duration,
                    file,
                },
            );
        }
    }

    variants
}

/// Validate or regenerate every cache variant of every video.
///
/// Blocking: regeneration drives one engine invocation at a time. A
/// variant that cannot be produced is removed from its video; the run
/// continues with the rest.
pub fn ensure_all(engine: &Engine, registry: &Registry, videos: &mut BTreeMap<String, Video>) {
    let hardware = hardware_cache_path(engine, registry);

    for video in videos.values_mut() {
        let started = Instant::now();
        let mut failed: Vec<String> = Vec::new();

        for variant in video.caches.values() {
            if let Err(err) = ensure_variant(engine, video, variant, hardware) {
                tracing::error!("{}/{}: {}", video.name, variant.key, err);
                failed.push(variant.key.clone());
            }
        }
        for key in failed {
            video.caches.remove(&key);
        }

        tracing::info!(
            "{}: {} cache variants ready ({:.2?})",
            video.name,
            video.caches.len(),
            started.elapsed()
        );
    }
}

/// Whether cache regeneration may use the hardware encoder: it must be
/// registered for this run and report hardware capability.
fn hardware_cache_path(engine: &Engine, registry: &Registry) -> bool {
    registry.contains_key("h264_nvenc")
        && engine
            .capabilities("h264_nvenc")
            .map(|caps| caps.hardware)
            .unwrap_or(false)
}

/// Make sure one variant's file exists and matches its target parameters,
/// regenerating it through the engine when it does not.
pub fn ensure_variant(
    engine: &Engine,
    video: &Video,
    variant: &CacheVariant,
    hardware: bool,
) -> Result<()> {
    if variant.file.exists() {
        if let Ok(info) = engine.probe(&variant.file) {
            if variant_matches(&info, variant, video.duration) {
                tracing::debug!("{}/{}: cache already valid", video.name, variant.key);
                return Ok(());
            }
            tracing::debug!("{}/{}: stale cache, regenerating", video.name, variant.key);
        }
    }

    let started = Instant::now();
    let args = regenerate_args(video, variant, hardware);
    let output = engine.ffmpeg(&args)?;
    if !output.success() {
        bail!(
            "cache generation exited with {:?}\n{}{}",
            output.status,
            output.stdout,
            output.stderr
        );
    }

    tracing::info!(
        "{}/{}: cache created ({:.2?})",
        video.name,
        variant.key,
        started.elapsed()
    );
    Ok(())
}

/// An existing file satisfies a variant when dimensions match exactly and
/// frame rate/duration are within tolerance. Duration is compared against
/// the source duration, like the rendition it replaces.
fn variant_matches(info: &MediaInfo, variant: &CacheVariant, source_duration: f64) -> bool {
    info.width == variant.width
        && info.height == variant.height
        && (info.frame_rate - variant.frame_rate).abs() <= FRAME_RATE_TOLERANCE
        && info
            .duration
            .map(|d| (d - source_duration).abs() <= DURATION_TOLERANCE)
            .unwrap_or(false)
}

fn regenerate_args(video: &Video, variant: &CacheVariant, hardware: bool) -> Vec<String> {
    let filter = format!(
        "fps=fps={:.2},scale=flags=bicubic+full_chroma_inp+full_chroma_int:w={}:h={},colorspace=all=bt709:range=tv:format=yuv420p",
        variant.frame_rate, variant.width, variant.height
    );

    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-v",
        "error",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(video.file.to_string_lossy().into_owned());
    args.extend(["-filter_complex".to_string(), filter, "-an".to_string()]);

    if hardware {
        args.extend(
            [
                "-c:v", "h264_nvenc", "-profile:v", "high", "-preset", "p1", "-tune", "lossless",
                "-rc", "constqp", "-rc-lookahead", "0", "-multipass", "0", "-b:v", "0",
                "-minrate", "0", "-maxrate", "0", "-bufsize", "0", "-qp", "0", "-init_qpI", "0",
                "-init_qpP", "0", "-init_qpB", "0", "-bf", "0", "-g", CACHE_GOP,
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    } else {
        args.extend(
            [
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "0", "-b:v", "0", "-minrate",
                "0", "-maxrate", "0", "-bufsize", "0", "-g", CACHE_GOP,
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }

    args.push(variant.file.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use encsweep_av::ColorInfo;

    fn video(width: u32, height: u32, frame_rate: f64, duration: f64) -> Video {
        Video {
            name: "clip".to_string(),
            file: PathBuf::from("/videos/clip.mkv"),
            width,
            height,
            frame_rate,
            duration,
            color: ColorInfo::default(),
            caches: BTreeMap::new(),
        }
    }

    fn config_with(resolutions: Vec<u32>, scalings: Vec<f64>) -> Config {
        let mut config = Config::default();
        config.options.resolutions = resolutions;
        config.options.framerate_scalings = scalings;
        config.paths.cache = PathBuf::from("/cache");
        config
    }

    #[test]
    fn uhd_source_yields_full_and_half_rate_1080p() {
        let video = video(3840, 2160, 60.0, 30.0);
        let config = config_with(vec![1920], vec![1.0, 0.5]);

        let variants = derive_variants(&video, &config);
        assert_eq!(variants.len(), 2);

        let full = &variants["1920x1080x60.00"];
        assert_eq!((full.width, full.height), (1920, 1080));
        assert_eq!(full.duration, (30.0f64 * 60.0).floor() / 60.0);

        let half = &variants["1920x1080x30.00"];
        assert_eq!(half.frame_rate, 30.0);
        assert_eq!(half.duration, (30.0f64 * 60.0 * 0.5).floor() / 30.0);
    }

    #[test]
    fn ladder_widths_above_source_are_skipped() {
        let video = video(1920, 1080, 60.0, 10.0);
        let config = config_with(vec![3840, 1920, 1280], vec![1.0]);

        let variants = derive_variants(&video, &config);
        assert_eq!(variants.len(), 2);
        assert!(!variants.keys().any(|k| k.starts_with("3840x")));
    }

    #[test]
    fn heights_round_to_even() {
        // 1280 * (1080/1920) = 720; 1280 * (875/1920) = 583.33 -> 584.
        let video = video(1920, 875, 30.0, 10.0);
        let config = config_with(vec![1280], vec![1.0]);

        let variants = derive_variants(&video, &config);
        let variant = variants.values().next().unwrap();
        assert_eq!(variant.height % 2, 0);
        assert_eq!(variant.height, 584);
    }

    #[test]
    fn truncated_duration_is_frame_accurate() {
        // 10.37 s at 23.976 fps scaled by 0.5: floor(10.37*23.976*0.5)
        // frames at 11.988 fps.
        let video = video(1920, 1080, 23.976, 10.37);
        let config = config_with(vec![1920], vec![0.5]);

        let variants = derive_variants(&video, &config);
        let variant = variants.values().next().unwrap();
        let frames = (10.37f64 * 23.976 * 0.5).floor();
        assert_eq!(variant.duration, frames / variant.frame_rate);
    }

    #[test]
    fn variant_match_tolerances() {
        let variant = CacheVariant {
            key: "1920x1080x60.00".to_string(),
            width: 1920,
            height: 1080,
            frame_rate: 60.0,
            duration: 30.0,
            file: PathBuf::from("/cache/clip-1920x1080x60.00.mkv"),
        };
        let info = |fps: f64, duration: Option<f64>| MediaInfo {
            codec: "h264".to_string(),
            width: 1920,
            height: 1080,
            frame_rate: fps,
            duration,
            color: ColorInfo::default(),
        };

        assert!(variant_matches(&info(60.0, Some(30.0)), &variant, 30.0));
        assert!(variant_matches(&info(60.009, Some(30.05)), &variant, 30.0));
        assert!(!variant_matches(&info(60.02, Some(30.0)), &variant, 30.0));
        assert!(!variant_matches(&info(60.0, Some(30.2)), &variant, 30.0));
        assert!(!variant_matches(&info(60.0, None), &variant, 30.0));
    }

    #[test]
    fn software_regeneration_is_lossless_short_gop() {
        let video = video(3840, 2160, 60.0, 30.0);
        let config = config_with(vec![1920], vec![1.0]);
        let variants = derive_variants(&video, &config);
        let variant = variants.values().next().unwrap();

        let args = regenerate_args(&video, variant, false);
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-crf" && w[1] == "0"));
        assert!(args.windows(2).any(|w| w[0] == "-g" && w[1] == "15"));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), &variant.file.to_string_lossy());

        let hw_args = regenerate_args(&video, variant, true);
        assert!(hw_args.contains(&"h264_nvenc".to_string()));
        assert!(hw_args.windows(2).any(|w| w[0] == "-tune" && w[1] == "lossless"));
    }
}
