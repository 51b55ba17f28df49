//! h264_nvenc: nested-domain enumeration with cross-parameter constraints
//! and a flat session-bound cost.

use super::{Combination, EncoderFamily};
use crate::config::EncoderConfig;
use anyhow::Result;

const B_REF_MODES: &[&str] = &["disabled", "middle"];
const MULTIPASS_LEVELS: &[u32] = &[0, 1, 2];
const TEMPORAL_AQ: &[u32] = &[0, 1];
// Strength 0 means spatial AQ off.
const SPATIAL_AQ_STRENGTHS: &[u32] = &[0, 7, 15];

// Headroom over the ideal 1/parallelism share, so a full bin stays just
// under one session's worth of real time.
const SAFETY_MARGIN: f64 = 1.01;

/// The NVIDIA NVENC H.264 hardware encoder family.
pub struct NvencFamily {
    pool: String,
    presets: Vec<String>,
    tunes: Vec<Option<String>>,
    lookaheads: Vec<u32>,
    bframes: Vec<u32>,
    parallelism: u32,
}

impl NvencFamily {
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
            lookaheads: config.lookaheads.clone(),
            bframes: config.bframes.clone(),
            parallelism: config.parallelism,
        }
    }
}

impl EncoderFamily for NvencFamily {
    fn codec(&self) -> &str {
        "h264_nvenc"
    }

    fn pool(&self) -> &str {
        &self.pool
    }

    fn generate(&self) -> Result<Vec<Combination>> {
        let cost = SAFETY_MARGIN / self.parallelism as f64;
        let mut combinations = Vec::new();

        for preset in &self.presets {
            for tune in &self.tunes {
                for &lookahead in &self.lookaheads {
                    for adaptive_i in [0u32, 1] {
                        // Adaptive I-frame insertion requires lookahead.
                        if lookahead == 0 && adaptive_i != 0 {
                            continue;
                        }
                        for &bframes in &self.bframes {
                            for &b_ref_mode in B_REF_MODES {
                                // Referencing B-frames requires B-frames.
                                if bframes == 0 && b_ref_mode != "disabled" {
                                    continue;
                                }
                                for &multipass in MULTIPASS_LEVELS {
                                    for &temporal_aq in TEMPORAL_AQ {
                                        for &strength in SPATIAL_AQ_STRENGTHS {
                                            let mut options = vec![
                                                (
                                                    "-profile:v".to_string(),
                                                    "high".to_string(),
                                                ),
                                                ("-preset".to_string(), preset.clone()),
                                            ];
                                            if let Some(tune) = tune {
                                                options.push((
                                                    "-tune".to_string(),
                                                    tune.clone(),
                                                ));
                                            }
                                            options.extend([
                                                ("-rc".to_string(), "cbr".to_string()),
                                                ("-cbr".to_string(), "1".to_string()),
                                                (
                                                    "-rc-lookahead".to_string(),
                                                    lookahead.to_string(),
                                                ),
                                                (
                                                    "-no-scenecut".to_string(),
                                                    (1 - adaptive_i).to_string(),
                                                ),
                                                ("-bf".to_string(), bframes.to_string()),
                                                (
                                                    "-b_ref_mode".to_string(),
                                                    b_ref_mode.to_string(),
                                                ),
                                                ("-b_adapt".to_string(), "1".to_string()),
                                                (
                                                    "-multipass".to_string(),
                                                    multipass.to_string(),
                                                ),
                                                (
                                                    "-temporal_aq".to_string(),
                                                    temporal_aq.to_string(),
                                                ),
                                            ]);
                                            if strength == 0 {
                                                options.push((
                                                    "-spatial-aq".to_string(),
                                                    "0".to_string(),
                                                ));
                                            } else {
                                                options.extend([
                                                    (
                                                        "-spatial-aq".to_string(),
                                                        "1".to_string(),
                                                    ),
                                                    (
                                                        "-aq-strength".to_string(),
                                                        strength.to_string(),
                                                    ),
                                                ]);
                                            }

                                            combinations.push(Combination::from_options(
                                                options, cost,
                                            ));
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(combinations)
    }

    // Session-bound: hardware throughput is capped by concurrent session
    // count, not frame size.
    fn scaled_cost(
        &self,
        combination: &Combination,
        _width: u32,
        _height: u32,
        _frame_rate: f64,
    ) -> f64 {
        combination.cost
    }
}
