use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(default)]
    pub encoders: BTreeMap<String, EncoderConfig>,

    #[serde(default)]
    pub videos: BTreeMap<String, VideoConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory containing the source videos (`<name>.mkv`).
    #[serde(default = "default_videos_dir")]
    pub videos: PathBuf,

    /// Directory for normalized reference renditions.
    #[serde(default = "default_cache_dir")]
    pub cache: PathBuf,

    /// Directory for encoded outputs, metrics files, and combination
    /// indexes.
    #[serde(default = "default_output_dir")]
    pub output: PathBuf,

    /// FFmpeg install directory (`bin/ffmpeg`, `bin/ffprobe`). Falls back
    /// to PATH lookup when unset.
    #[serde(default)]
    pub engine: Option<PathBuf>,
}

fn default_videos_dir() -> PathBuf {
    PathBuf::from("videos")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            videos: default_videos_dir(),
            cache: default_cache_dir(),
            output: default_output_dir(),
            engine: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptionsConfig {
    /// Resolution ladder, as target widths. Heights follow the source
    /// aspect ratio.
    #[serde(default = "default_resolutions")]
    pub resolutions: Vec<u32>,

    /// Frame-rate scaling factors applied to the source rate.
    #[serde(default = "default_framerate_scalings")]
    pub framerate_scalings: Vec<f64>,

    /// Bitrate ladder in kbit/s.
    #[serde(default = "default_bitrates")]
    pub bitrates: Vec<u32>,

    /// Keyframe-interval multipliers; GOP size is the cache frame rate
    /// times the multiplier.
    #[serde(default = "default_keyframe_multipliers")]
    pub keyframe_multipliers: Vec<f64>,

    #[serde(default)]
    pub vmaf: VmafConfig,
}

fn default_resolutions() -> Vec<u32> {
    vec![2560, 1920, 1280]
}
fn default_framerate_scalings() -> Vec<f64> {
    vec![1.0, 0.5]
}
fn default_bitrates() -> Vec<u32> {
    vec![2000, 4000, 8000]
}
fn default_keyframe_multipliers() -> Vec<f64> {
    vec![1.0, 2.0]
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            resolutions: default_resolutions(),
            framerate_scalings: default_framerate_scalings(),
            bitrates: default_bitrates(),
            keyframe_multipliers: default_keyframe_multipliers(),
            vmaf: VmafConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VmafConfig {
    /// Quality-scorer model. A relative path resolves under
    /// `<engine>/vmaf/`.
    #[serde(default = "default_vmaf_model")]
    pub model: PathBuf,
}

fn default_vmaf_model() -> PathBuf {
    PathBuf::from("vmaf_v0.6.1.json")
}

impl Default for VmafConfig {
    fn default() -> Self {
        Self {
            model: default_vmaf_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Resource pool this encoder's batches are scheduled into.
    #[serde(default = "default_pool")]
    pub pool: String,

    #[serde(default)]
    pub presets: Vec<String>,

    /// Tune domain; the literal `"none"` means untuned.
    #[serde(default = "default_tunes")]
    pub tunes: Vec<String>,

    /// Rate-control lookahead depths (hardware families).
    #[serde(default)]
    pub lookaheads: Vec<u32>,

    /// B-frame counts (hardware families).
    #[serde(default)]
    pub bframes: Vec<u32>,

    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Scale applied on top of the measured cost factors.
    #[serde(default = "default_cost_scale")]
    pub cost_scale: f64,

    /// Concurrent-session capacity, for flat-cost families.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_pool() -> String {
    "default".to_string()
}
fn default_tunes() -> Vec<String> {
    vec!["none".to_string()]
}
fn default_threads() -> u32 {
    1
}
fn default_cost_scale() -> f64 {
    1.0
}
fn default_parallelism() -> u32 {
    1
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pool: default_pool(),
            presets: Vec::new(),
            tunes: default_tunes(),
            lookaheads: Vec::new(),
            bframes: Vec::new(),
            threads: default_threads(),
            cost_scale: default_cost_scale(),
            parallelism: default_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VideoConfig {
    #[serde(default)]
    pub enabled: bool,
}
