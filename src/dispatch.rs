//! Sequential batch dispatch: encode, then score.
//!
//! The dispatch loop is a single worker draining an explicit, ordered
//! queue: one cache variant at a time within one video at a time, batches
//! strictly FIFO. At most one encode and one compare subprocess run
//! system-wide, so the external engine owns the machine's CPU/GPU/disk
//! for the duration of each invocation. A failing batch is logged and
//! skipped; nothing is retried.

use crate::cache::CacheVariant;
use crate::matrix::{BatchQueues, JobFiles, Plan};
use crate::video::Video;
use anyhow::{bail, Result};
use encsweep_av::Engine;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Instant;

pub struct Dispatcher<'a> {
    engine: &'a Engine,
    vmaf_model: &'a Path,
}

impl<'a> Dispatcher<'a> {
    pub fn new(engine: &'a Engine, vmaf_model: &'a Path) -> Self {
        Self { engine, vmaf_model }
    }

    /// Drain every batch of every video, in lexical video and cache-key
    /// order.
    pub fn run(&self, videos: &BTreeMap<String, Video>, mut plan: Plan) {
        let started = Instant::now();

        for (video_name, video) in videos {
            let Some(mut variants) = plan.queues.remove(video_name) else {
                continue;
            };

            let video_started = Instant::now();
            for (cache_key, variant) in &video.caches {
                let Some(queues) = variants.remove(cache_key) else {
                    continue;
                };
                self.drain_variant(video, variant, queues);
            }
            tracing::info!("{}: finished ({:.2?})", video_name, video_started.elapsed());
        }

        tracing::info!("dispatch finished ({:.2?})", started.elapsed());
    }

    fn drain_variant(&self, video: &Video, variant: &CacheVariant, queues: BatchQueues) {
        let total = queues.total_batches();
        if total == 0 {
            tracing::info!("{}/{}: nothing to do", video.name, variant.key);
            return;
        }

        tracing::info!("{}/{}: {} batches", video.name, variant.key, total);
        let started = Instant::now();
        let mut done = 0usize;

        for ((pool, bins), (files_pool, file_bins)) in
            queues.commands.into_iter().zip(queues.files)
        {
            debug_assert_eq!(pool, files_pool);

            for (batch, batch_files) in bins.into_iter().zip(file_bins) {
                done += 1;
                let batch_started = Instant::now();

                if let Err(err) = create_output_dirs(&batch_files) {
                    tracing::error!("{}: {}", pool, err);
                    continue;
                }

                match self.encode(variant, &batch) {
                    Ok(()) => {
                        if let Err(err) = self.score(video, &batch_files) {
                            tracing::error!("{}: scoring failed: {}", pool, err);
                        }
                    }
                    Err(err) => {
                        // No retry; this batch's scoring is skipped too.
                        tracing::error!("{}: encode failed: {}", pool, err);
                    }
                }

                tracing::info!(
                    "{}/{}: {:.1}% ({} / {}) in {:.2?}",
                    video.name,
                    variant.key,
                    done as f64 / total as f64 * 100.0,
                    done,
                    total,
                    batch_started.elapsed()
                );
            }
        }

        tracing::info!(
            "{}/{}: drained {} batches ({:.2?})",
            video.name,
            variant.key,
            total,
            started.elapsed()
        );
    }

    /// One engine invocation encodes the whole batch against the cache
    /// file as sole input, emitting every sibling rendition at once.
    fn encode(&self, variant: &CacheVariant, batch: &[String]) -> Result<()> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-v", "error", "-hwaccel", "auto", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(variant.file.to_string_lossy().into_owned());
        args.extend(batch.iter().cloned());

        let output = self.engine.ffmpeg(&args)?;
        if !output.success() {
            bail!(
                "exited with {:?}\n{}{}",
                output.status,
                output.stdout,
                output.stderr
            );
        }
        Ok(())
    }

    /// One compare invocation scores the whole batch against the original
    /// source, writing one metrics file per output.
    fn score(&self, video: &Video, files: &[JobFiles]) -> Result<()> {
        let args = build_compare_args(video, files, self.vmaf_model);
        let output = self.engine.ffmpeg(&args)?;
        if !output.success() {
            bail!(
                "exited with {:?}\n{}{}",
                output.status,
                output.stdout,
                output.stderr
            );
        }
        Ok(())
    }
}

fn create_output_dirs(files: &[JobFiles]) -> Result<()> {
    for job in files {
        if let Some(parent) = job.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Build the full compare argv: the source as input 0, each encoded file
/// as a further input, the VMAF filter graph, and one null-muxed mapping
/// per scored pair.
pub(crate) fn build_compare_args(video: &Video, files: &[JobFiles], model: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-v", "warning", "-hwaccel", "auto", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(video.file.to_string_lossy().into_owned());

    for job in files {
        args.push("-i".to_string());
        args.push(job.output.to_string_lossy().into_owned());
    }

    args.push("-filter_complex".to_string());
    args.push(build_compare_filter(video, files, model));

    for idx in 0..files.len() {
        args.extend([
            "-map".to_string(),
            format!("[vmaf:{}]", idx),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ]);
    }

    args
}

/// Build the compare filter graph: fan the source out into one reference
/// stream per encoded file, rescale and color-convert each encoded stream
/// back to the source's representation, and score every pair with
/// libvmaf.
fn build_compare_filter(video: &Video, files: &[JobFiles], model: &Path) -> String {
    let mut filter = String::new();

    if files.len() > 1 {
        let _ = write!(filter, "[0:v:0]split={}", files.len());
        for idx in 0..files.len() {
            let _ = write!(filter, "[ref:{}]", idx);
        }
    }

    for (idx, job) in files.iter().enumerate() {
        if !filter.is_empty() {
            filter.push(';');
        }
        let reference = if files.len() > 1 {
            format!("[ref:{}]", idx)
        } else {
            "[0:v:0]".to_string()
        };

        // Encoded inputs start at 1; input 0 is the source.
        let _ = write!(
            filter,
            "[{input}:v:0]scale=flags=bicubic+full_chroma_inp+full_chroma_int:w={width}:h={height},colorspace=space={matrix}:trc={transfer}:primaries={primaries}:range={range},format=pix_fmts=yuv444p,fps=fps={rate:.2}[dist:{idx}];[dist:{idx}]{reference}libvmaf=model_path={model}:log_fmt=json:log_path={log}:enable_conf_interval=1:n_threads=2[vmaf:{idx}]",
            input = idx + 1,
            width = video.width,
            height = video.height,
            matrix = video.color.matrix,
            transfer = video.color.transfer,
            primaries = video.color.primaries,
            range = video.color.range,
            rate = video.frame_rate,
            idx = idx,
            reference = reference,
            model = filter_escape(model),
            log = filter_escape(&job.metrics),
        );
    }

    filter
}

/// Escape a path for use inside a filter-graph option value: lavfi treats
/// `:` as an option separator and backslashes as escapes.
fn filter_escape(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").replace(':', "\\:")
}
