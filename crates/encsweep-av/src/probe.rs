//! FFprobe output parsing.
//!
//! The engine shells out to ffprobe with JSON output (`-print_format json
//! -show_format -show_streams`); this module turns that JSON into
//! [`MediaInfo`]. Matroska files frequently report the duration only as a
//! `DURATION` stream tag in `HH:MM:SS.fraction` form, which is normalized
//! to seconds here.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Color metadata of the primary video stream.
///
/// Missing fields default to the broadcast standard: `tv` range, `bt709`
/// transfer/primaries/matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorInfo {
    pub range: String,
    pub transfer: String,
    pub primaries: String,
    pub matrix: String,
}

impl Default for ColorInfo {
    fn default() -> Self {
        Self {
            range: "tv".to_string(),
            transfer: "bt709".to_string(),
            primaries: "bt709".to_string(),
            matrix: "bt709".to_string(),
        }
    }
}

/// Metadata of a probed media file, reduced to the primary video stream.
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate in frames per second, from the stream's rational rate.
    pub frame_rate: f64,
    /// Duration in seconds, if the file reports one.
    pub duration: Option<f64>,
    pub color: ColorInfo,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    color_range: Option<String>,
    color_transfer: Option<String>,
    color_primaries: Option<String>,
    color_space: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    #[serde(rename = "DURATION")]
    duration: Option<String>,
}

/// Parse raw ffprobe JSON into [`MediaInfo`].
pub(crate) fn parse_probe_output(path: &Path, json: &str) -> Result<MediaInfo> {
    let output: ProbeOutput = serde_json::from_str(json)?;

    let stream = output
        .streams
        .into_iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| Error::NoVideoStream {
            path: path.to_path_buf(),
        })?;

    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .ok_or_else(|| Error::parse_error("ffprobe", "missing or invalid r_frame_rate"))?;

    // Stream duration first, then the Matroska DURATION tag, then the
    // container-level duration.
    let duration = stream
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| stream.tags.duration.as_deref().and_then(parse_duration_tag))
        .or_else(|| {
            output
                .format
                .and_then(|f| f.duration)
                .and_then(|s| s.parse().ok())
        });

    let defaults = ColorInfo::default();
    let color = ColorInfo {
        range: stream.color_range.unwrap_or(defaults.range),
        transfer: stream.color_transfer.unwrap_or(defaults.transfer),
        primaries: stream.color_primaries.unwrap_or(defaults.primaries),
        matrix: stream.color_space.unwrap_or(defaults.matrix),
    };

    Ok(MediaInfo {
        codec: stream.codec_name.unwrap_or_default(),
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        frame_rate,
        duration,
        color,
    })
}

fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    let parts: Vec<&str> = rate_str.split('/').collect();
    if parts.len() == 2 {
        let num: f64 = parts[0].parse().ok()?;
        let den: f64 = parts[1].parse().ok()?;
        if den != 0.0 {
            return Some(num / den);
        }
    }
    rate_str.parse().ok()
}

/// Normalize a `HH:MM:SS.fraction` duration tag to seconds.
fn parse_duration_tag(tag: &str) -> Option<f64> {
    let mut parts = tag.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((hours * 60.0 + minutes) * 60.0 + seconds)
}
