//! libx264: preset × tune enumeration with measured multiplicative costs.

use super::{Combination, EncoderFamily};
use crate::config::EncoderConfig;
use anyhow::{bail, Result};

// Relative speed multipliers, measured at 2560x1440 @ 60 fps.
const PRESET_FACTORS: &[(&str, f64)] = &[
    ("ultrafast", 0.603),
    ("superfast", 0.686),
    ("veryfast", 0.737),
    ("faster", 0.854),
    ("fast", 0.972),
    ("medium", 1.000),
    ("slow", 1.321),
    ("slower", 2.414),
    ("veryslow", 4.667),
    ("placebo", 18.42),
];

// Measured at 2560x1440 @ 60 fps, preset medium. Untuned is the 1.0
// baseline.
const TUNE_FACTORS: &[(&str, f64)] = &[("film", 1.029), ("animation", 1.077), ("grain", 1.061)];

// Thread count the preset factors were measured with.
const CALIBRATION_THREADS: f64 = 32.0;
const CALIBRATION_PIXELS: f64 = 2560.0 * 1440.0;
const CALIBRATION_FRAME_RATE: f64 = 60.0;

/// The libx264 software encoder family.
pub struct X264Family {
    pool: String,
    presets: Vec<String>,
    /// `None` is the untuned member of the tune domain.
    tunes: Vec<Option<String>>,
    threads: u32,
    cost_scale: f64,
}

impl X264Family {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            pool: config.pool.clone(),
            presets: config.presets.clone(),
            tunes: config
                .tunes
                .iter()
                .map(|tune| match tune.as_str() {
                    "none" => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            threads: config.threads,
            cost_scale: config.cost_scale,
        }
    }

    fn preset_factor(preset: &str) -> Result<f64> {
        match PRESET_FACTORS.iter().find(|(name, _)| *name == preset) {
            Some((_, factor)) => Ok(*factor),
            None => bail!("unknown libx264 preset: {}", preset),
        }
    }

    fn tune_factor(tune: Option<&str>) -> Result<f64> {
        let Some(tune) = tune else {
            return Ok(1.0);
        };
        match TUNE_FACTORS.iter().find(|(name, _)| *name == tune) {
            Some((_, factor)) => Ok(*factor),
            None => bail!("unknown libx264 tune: {}", tune),
        }
    }
}

impl EncoderFamily for X264Family {
    fn codec(&self) -> &str {
        "libx264"
    }

    fn pool(&self) -> &str {
        &self.pool
    }

    fn generate(&self) -> Result<Vec<Combination>> {
        let thread_factor = CALIBRATION_THREADS / self.threads as f64;
        let mut combinations = Vec::with_capacity(self.presets.len() * self.tunes.len());

        for preset in &self.presets {
            for tune in &self.tunes {
                let mut options = vec![
                    ("-profile:v".to_string(), "high".to_string()),
                    ("-preset".to_string(), preset.clone()),
                    (
                        "-x264-params".to_string(),
                        "nal-hrd=cbr:force-cfr=1".to_string(),
                    ),
                    ("-ssim".to_string(), "0".to_string()),
                    ("-threads".to_string(), self.threads.to_string()),
                ];
                if let Some(tune) = tune {
                    options.push(("-tune".to_string(), tune.clone()));
                }

                let cost = self.cost_scale
                    * Self::preset_factor(preset)?
                    * Self::tune_factor(tune.as_deref())?
                    * thread_factor;

                combinations.push(Combination::from_options(options, cost));
            }
        }

        Ok(combinations)
    }

    fn scaled_cost(
        &self,
        combination: &Combination,
        width: u32,
        height: u32,
        frame_rate: f64,
    ) -> f64 {
        combination.cost
            * (frame_rate / CALIBRATION_FRAME_RATE)
            * ((width as f64 * height as f64) / CALIBRATION_PIXELS)
    }
}
