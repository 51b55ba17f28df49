//! Combination generation properties across encoder families.

use encsweep::config::EncoderConfig;
use encsweep::encoders::{EncoderFamily, NvencFamily, X264Family};
use std::collections::HashSet;

fn x264_config(presets: &[&str], tunes: &[&str]) -> EncoderConfig {
    EncoderConfig {
        enabled: true,
        pool: "cpu".to_string(),
        presets: presets.iter().map(|s| s.to_string()).collect(),
        tunes: tunes.iter().map(|s| s.to_string()).collect(),
        threads: 16,
        ..EncoderConfig::default()
    }
}

fn nvenc_config() -> EncoderConfig {
    EncoderConfig {
        enabled: true,
        pool: "nvenc".to_string(),
        presets: vec!["p4".to_string(), "p7".to_string()],
        tunes: vec!["hq".to_string()],
        lookaheads: vec![0, 20],
        bframes: vec![0, 3],
        parallelism: 3,
        ..EncoderConfig::default()
    }
}

#[test]
fn fast_and_slow_presets_yield_two_distinct_combinations() {
    // presets=[fast, slow], tunes untuned only, no lookahead/B-frame
    // domains.
    let family = X264Family::new(&x264_config(&["fast", "slow"], &["none"]));
    let combos = family.generate().unwrap();

    assert_eq!(combos.len(), 2);
    assert_ne!(combos[0].hash, combos[1].hash);
    assert_ne!(combos[0].cost, combos[1].cost);
    // slow costs more than fast.
    assert!(combos[1].cost > combos[0].cost);
}

#[test]
fn generation_is_deterministic_across_runs() {
    let config = x264_config(&["veryfast", "medium", "slow"], &["none", "film", "grain"]);

    let first = X264Family::new(&config).generate().unwrap();
    let second = X264Family::new(&config).generate().unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.name, b.name);
        assert_eq!(a.options, b.options);
        assert_eq!(a.cost, b.cost);
    }

    let nvenc_first = NvencFamily::new(&nvenc_config()).generate().unwrap();
    let nvenc_second = NvencFamily::new(&nvenc_config()).generate().unwrap();
    assert_eq!(
        nvenc_first.iter().map(|c| &c.hash).collect::<Vec<_>>(),
        nvenc_second.iter().map(|c| &c.hash).collect::<Vec<_>>()
    );
}

#[test]
fn no_two_combinations_share_a_hash() {
    let combos = X264Family::new(&x264_config(
        &["ultrafast", "veryfast", "medium", "slow", "veryslow"],
        &["none", "film", "animation", "grain"],
    ))
    .generate()
    .unwrap();
    let hashes: HashSet<&str> = combos.iter().map(|c| c.hash.as_str()).collect();
    assert_eq!(hashes.len(), combos.len());

    let nvenc = NvencFamily::new(&nvenc_config()).generate().unwrap();
    let hashes: HashSet<&str> = nvenc.iter().map(|c| c.hash.as_str()).collect();
    assert_eq!(hashes.len(), nvenc.len());
}

#[test]
fn every_cost_is_strictly_positive() {
    let x264 = X264Family::new(&x264_config(
        &["ultrafast", "placebo"],
        &["none", "animation"],
    ));
    for combo in x264.generate().unwrap() {
        assert!(combo.cost > 0.0, "{} has cost {}", combo.name, combo.cost);
        assert!(x264.scaled_cost(&combo, 640, 360, 10.0) > 0.0);
    }

    let nvenc = NvencFamily::new(&nvenc_config());
    for combo in nvenc.generate().unwrap() {
        assert!(combo.cost > 0.0);
    }
}

#[test]
fn canonical_names_embed_the_schema_version() {
    let combos = X264Family::new(&x264_config(&["medium"], &["none"]))
        .generate()
        .unwrap();
    let suffix = format!(";version={}", encsweep::encoders::COMBINATION_SCHEMA_VERSION);
    assert!(combos[0].name.ends_with(&suffix));
}
