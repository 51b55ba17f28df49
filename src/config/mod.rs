mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a TOML file.
///
/// Paths are resolved to absolute form and the data directories are
/// created, so later phases can assume they exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    resolve_paths(&mut config)?;

    Ok(config)
}

/// Load config from default locations.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./encsweep.toml",
        "./config.toml",
        "~/.config/encsweep/config.toml",
        "/etc/encsweep/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    anyhow::bail!("no configuration file found; pass one with --config")
}

/// Validate configuration.
fn validate_config(config: &Config) -> Result<()> {
    if config.options.resolutions.is_empty() {
        anyhow::bail!("Resolution ladder is empty");
    }
    if config.options.bitrates.is_empty() {
        anyhow::bail!("Bitrate ladder is empty");
    }
    if config.options.keyframe_multipliers.is_empty() {
        anyhow::bail!("Keyframe-interval multiplier list is empty");
    }
    for &scale in &config.options.framerate_scalings {
        if scale <= 0.0 {
            anyhow::bail!("Frame-rate scaling must be positive, got {}", scale);
        }
    }
    for &multiplier in &config.options.keyframe_multipliers {
        if multiplier <= 0.0 {
            anyhow::bail!(
                "Keyframe-interval multiplier must be positive, got {}",
                multiplier
            );
        }
    }

    for (name, encoder) in &config.encoders {
        if !encoder.enabled {
            continue;
        }
        if encoder.presets.is_empty() {
            anyhow::bail!("Encoder '{}' is enabled but has no presets", name);
        }
        if encoder.pool.is_empty() {
            anyhow::bail!("Encoder '{}' has an empty pool name", name);
        }
        if encoder.threads == 0 {
            anyhow::bail!("Encoder '{}' has zero threads", name);
        }
        if encoder.parallelism == 0 {
            anyhow::bail!("Encoder '{}' has zero parallelism", name);
        }
        if encoder.cost_scale <= 0.0 {
            anyhow::bail!(
                "Encoder '{}' has non-positive cost_scale {}",
                name,
                encoder.cost_scale
            );
        }
    }

    if !config.videos.values().any(|v| v.enabled) {
        tracing::warn!("No videos are enabled");
    }

    Ok(())
}

/// Resolve the data directories to absolute paths, creating them if
/// missing, and anchor a relative VMAF model path under the engine
/// install.
fn resolve_paths(config: &mut Config) -> Result<()> {
    for dir in [
        &mut config.paths.videos,
        &mut config.paths.cache,
        &mut config.paths.output,
    ] {
        std::fs::create_dir_all(&*dir)
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
        *dir = dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve directory {:?}", dir))?;
    }

    if config.options.vmaf.model.is_relative() {
        let model = &config.options.vmaf.model;
        config.options.vmaf.model = match &config.paths.engine {
            Some(engine) => engine.join("vmaf").join(model),
            None => absolute(model),
        };
    }

    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
