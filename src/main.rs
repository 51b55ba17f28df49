mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use encsweep::{cache, config, dispatch, encoders, matrix, video};
use encsweep_av::Engine;
use std::sync::Arc;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "encsweep=trace,encsweep_av=debug".to_string()
        } else {
            "encsweep=info,encsweep_av=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Run { dry_run } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_sweep(config, dry_run))
        }
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::Combinations { encoder } => {
            list_combinations(&encoder, cli.config.as_deref())
        }
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("encsweep {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_sweep(config: config::Config, dry_run: bool) -> Result<()> {
    let sweep_started = Instant::now();
    let engine = Arc::new(Engine::new(config.paths.engine.as_deref())?);

    // Smoke-test and load encoders; generate and export combinations.
    let registry = Arc::new(encoders::load_registry(&config, &engine)?);
    if registry.is_empty() {
        anyhow::bail!("No usable encoders; nothing to sweep");
    }

    // Probe every enabled video concurrently; failed probes drop only
    // their own video.
    let mut videos = video::load_videos(&config, engine.clone()).await;
    if videos.is_empty() {
        anyhow::bail!("No usable videos; nothing to sweep");
    }

    // Derive the cache variants per video.
    for video in videos.values_mut() {
        video.caches = cache::derive_variants(video, &config);
    }

    // Validate or regenerate the reference renditions. Regeneration
    // encodes, so it runs one invocation at a time off the async runtime.
    if !dry_run {
        let engine_ref = engine.clone();
        let registry_ref = registry.clone();
        videos = tokio::task::spawn_blocking(move || {
            let mut videos = videos;
            cache::ensure_all(&engine_ref, &registry_ref, &mut videos);
            videos
        })
        .await?;
    }

    // Build the job matrix into per-pool batch queues.
    let config = Arc::new(config);
    let plan = matrix::build_plan(&videos, registry.clone(), config.clone()).await;

    if dry_run {
        print_plan(&videos, &plan);
        return Ok(());
    }

    // Sequential dispatch: encode then score, one batch at a time.
    tokio::task::spawn_blocking(move || {
        let dispatcher = dispatch::Dispatcher::new(&engine, &config.options.vmaf.model);
        dispatcher.run(&videos, plan);
    })
    .await?;

    tracing::info!("sweep finished ({:.2?})", sweep_started.elapsed());
    Ok(())
}

fn print_plan(
    videos: &std::collections::BTreeMap<String, video::Video>,
    plan: &matrix::Plan,
) {
    println!("Planned batches:");
    for (video_name, variants) in &plan.queues {
        let video_batches: usize = variants.values().map(|q| q.total_batches()).sum();
        println!("  {}: {} batches", video_name, video_batches);
        for (cache_key, queues) in variants {
            for (pool, bins) in &queues.commands {
                println!("    {} [{}]: {} batches", cache_key, pool, bins.len());
            }
        }
    }
    println!(
        "{} batches total across {} videos",
        plan.total_batches(),
        videos.len()
    );
}

fn probe_file(
    file: &std::path::Path,
    json: bool,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    // A config is optional here; it only contributes the engine path.
    let engine_dir = config_path
        .and_then(|path| config::load_config(path).ok())
        .and_then(|config| config.paths.engine);
    let engine = Engine::new(engine_dir.as_deref())?;

    let info = engine.probe(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("File: {}", file.display());
        println!("Video: {} {}x{}", info.codec, info.width, info.height);
        println!("Frame rate: {:.3} fps", info.frame_rate);
        match info.duration {
            Some(duration) => println!("Duration: {:.3}s", duration),
            None => println!("Duration: unknown"),
        }
        println!(
            "Color: range={} transfer={} primaries={} matrix={}",
            info.color.range, info.color.transfer, info.color.primaries, info.color.matrix
        );
    }

    Ok(())
}

fn list_combinations(encoder_name: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let Some(encoder_config) = config.encoders.get(encoder_name) else {
        anyhow::bail!("Encoder '{}' is not configured", encoder_name);
    };
    let Some(family) = encoders::build_family(encoder_name, encoder_config) else {
        anyhow::bail!("Encoder '{}' has no implementation", encoder_name);
    };

    let combinations = family.generate()?;
    encoders::write_index(&config.paths.output, encoder_name, &combinations)?;

    println!(
        "{}: {} combinations (pool '{}')",
        encoder_name,
        combinations.len(),
        family.pool()
    );
    println!(
        "Index written to {}",
        config
            .paths
            .output
            .join(format!("{}.json", encoder_name))
            .display()
    );

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = encsweep_av::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing; the sweep cannot run without them.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(path) => {
            println!("Validating config: {:?}", path);
            let config = config::load_config(path)?;
            println!("✓ Configuration is valid");
            println!("  Videos dir: {}", config.paths.videos.display());
            println!("  Output dir: {}", config.paths.output.display());
            println!(
                "  Encoders: {} ({} enabled)",
                config.encoders.len(),
                config.encoders.values().filter(|e| e.enabled).count()
            );
            println!(
                "  Videos: {} ({} enabled)",
                config.videos.len(),
                config.videos.values().filter(|v| v.enabled).count()
            );
            println!(
                "  Ladder: {} resolutions x {} rate scalings x {} bitrates x {} GOP multipliers",
                config.options.resolutions.len(),
                config.options.framerate_scalings.len(),
                config.options.bitrates.len(),
                config.options.keyframe_multipliers.len()
            );
        }
        None => {
            println!("No config file specified or found in default locations");
        }
    }

    Ok(())
}
