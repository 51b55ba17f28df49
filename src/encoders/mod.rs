//! Encoder families: combination generation, costing, and the registry.
//!
//! Each supported encoder family enumerates every legal parameter
//! assignment from its configured domains, canonicalizes it into a stable
//! name, and hashes that name. The hash addresses the job's output files,
//! so generation must be deterministic: the same domains always produce
//! the same set of hashes, across runs and processes.

pub mod nvenc;
pub mod x264;

pub use nvenc::NvencFamily;
pub use x264::X264Family;

use crate::config::{Config, EncoderConfig};
use anyhow::{Context, Result};
use encsweep_av::Engine;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Instant;

/// Version tag folded into every canonical combination name. Bump this
/// whenever the canonicalization or option layout changes, so hashes from
/// older runs are recognized as stale instead of silently reused.
pub const COMBINATION_SCHEMA_VERSION: u32 = 1;

/// One canonicalized, hashed parameter assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    /// Canonical `flag=value;…;version=N` name.
    pub name: String,
    /// Lowercase hex SHA-256 of the canonical name.
    pub hash: String,
    /// Flag/value option pairs in enumeration order.
    pub options: Vec<(String, String)>,
    /// Relative processing cost against one capacity unit.
    pub cost: f64,
}

impl Combination {
    pub fn from_options(options: Vec<(String, String)>, cost: f64) -> Self {
        let name = canonical_name(&options);
        let hash = hex::encode(Sha256::digest(name.as_bytes()));
        Self {
            name,
            hash,
            options,
            cost,
        }
    }

    /// Flatten the option pairs into argv form.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.options.len() * 2);
        for (flag, value) in &self.options {
            args.push(flag.clone());
            args.push(value.clone());
        }
        args
    }
}

fn canonical_name(options: &[(String, String)]) -> String {
    let mut name = String::new();
    for (flag, value) in options {
        if !name.is_empty() {
            name.push(';');
        }
        let _ = write!(name, "{}={}", flag.trim_start_matches('-'), value);
    }
    let _ = write!(name, ";version={}", COMBINATION_SCHEMA_VERSION);
    name
}

/// A family of encoder configurations sharing one codec.
///
/// One implementation per supported codec; instances are built from
/// declared configuration by [`load_registry`].
pub trait EncoderFamily: Send + Sync {
    /// FFmpeg codec name, as passed to `-c:v`.
    fn codec(&self) -> &str;

    /// Name of the resource pool this family's jobs are batched into.
    fn pool(&self) -> &str;

    /// Enumerate every legal combination of the configured domains.
    fn generate(&self) -> Result<Vec<Combination>>;

    /// Cost of a combination materialized against a concrete frame size
    /// and rate.
    fn scaled_cost(&self, combination: &Combination, width: u32, height: u32, frame_rate: f64)
        -> f64;

    /// Encoder-specific flags appended after the combination options.
    fn extra_args(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A loaded encoder: its family plus the immutable generated combination
/// list and a hash lookup built once after generation.
pub struct Encoder {
    pub name: String,
    pub combinations: Vec<Combination>,
    index: HashMap<String, usize>,
    family: Box<dyn EncoderFamily>,
}

impl Encoder {
    /// Generate a family's combinations and wrap them into a loaded
    /// encoder.
    pub fn load(name: String, family: Box<dyn EncoderFamily>) -> Result<Self> {
        let combinations = family
            .generate()
            .with_context(|| format!("Failed to generate combinations for '{}'", name))?;
        Ok(Self::new(name, family, combinations))
    }

    fn new(name: String, family: Box<dyn EncoderFamily>, combinations: Vec<Combination>) -> Self {
        let index = combinations
            .iter()
            .enumerate()
            .map(|(pos, combo)| (combo.hash.clone(), pos))
            .collect();
        Self {
            name,
            combinations,
            index,
            family,
        }
    }

    pub fn pool(&self) -> &str {
        self.family.pool()
    }

    pub fn extra_args(&self) -> Vec<String> {
        self.family.extra_args()
    }

    pub fn scaled_cost(
        &self,
        combination: &Combination,
        width: u32,
        height: u32,
        frame_rate: f64,
    ) -> f64 {
        self.family.scaled_cost(combination, width, height, frame_rate)
    }

    /// Position of a combination by hash.
    pub fn position(&self, hash: &str) -> Option<usize> {
        self.index.get(hash).copied()
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("name", &self.name)
            .field("combinations", &self.combinations.len())
            .finish()
    }
}

/// Loaded encoders in deterministic name order.
pub type Registry = BTreeMap<String, Encoder>;

/// Build a family instance for a configured encoder name.
///
/// Returns `None` for names with no implementation.
pub fn build_family(name: &str, config: &EncoderConfig) -> Option<Box<dyn EncoderFamily>> {
    match name {
        "libx264" => Some(Box::new(X264Family::new(config))),
        "h264_nvenc" => Some(Box::new(NvencFamily::new(config))),
        _ => None,
    }
}

/// Load every enabled encoder: capability smoke test, combination
/// generation, and index export.
///
/// An encoder that fails its smoke test is excluded and the rest proceed;
/// an invalid parameter domain (unknown preset, unknown tune) is a fatal
/// configuration error.
pub fn load_registry(config: &Config, engine: &Engine) -> Result<Registry> {
    let mut registry = Registry::new();

    for (name, encoder_config) in &config.encoders {
        if !encoder_config.enabled {
            tracing::debug!("{}: disabled, skipping", name);
            continue;
        }

        let Some(family) = build_family(name, encoder_config) else {
            tracing::error!("{}: no such encoder family", name);
            continue;
        };

        let started = Instant::now();
        if !engine.smoke_test(family.codec()) {
            tracing::warn!(
                "{}: capability check failed ({:.2?}), excluded from this run",
                name,
                started.elapsed()
            );
            continue;
        }

        let encoder = Encoder::load(name.clone(), family)?;
        write_index(&config.paths.output, name, &encoder.combinations)?;

        tracing::info!(
            "{}: {} combinations in pool '{}' ({:.2?})",
            name,
            encoder.combinations.len(),
            encoder.pool(),
            started.elapsed()
        );

        registry.insert(name.clone(), encoder);
    }

    Ok(registry)
}

/// Write the hash → options index for one encoder, for external auditing
/// and reproduction.
pub fn write_index(output_dir: &Path, name: &str, combinations: &[Combination]) -> Result<()> {
    let index: BTreeMap<&str, Vec<String>> = combinations
        .iter()
        .map(|combo| (combo.hash.as_str(), combo.args()))
        .collect();

    let path = output_dir.join(format!("{}.json", name));
    let json = serde_json::to_string(&index)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write index {:?}", path))?;

    Ok(())
}
