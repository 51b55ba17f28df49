//! Blocking ffmpeg/ffprobe invocation.

use crate::probe::{parse_probe_output, MediaInfo};
use crate::{tools, Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(windows)]
const FFMPEG_BIN: &str = "ffmpeg.exe";
#[cfg(windows)]
const FFPROBE_BIN: &str = "ffprobe.exe";
#[cfg(not(windows))]
const FFMPEG_BIN: &str = "ffmpeg";
#[cfg(not(windows))]
const FFPROBE_BIN: &str = "ffprobe";

/// Captured result of one engine invocation.
#[derive(Debug)]
pub struct EngineOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Capabilities of one encoder, as reported by `ffmpeg -h encoder=<name>`.
#[derive(Debug, Clone, Default)]
pub struct EncoderCaps {
    /// Whether the encoder is hardware accelerated.
    pub hardware: bool,
    /// Supported pixel formats.
    pub pixel_formats: Vec<String>,
    /// Supported hardware devices.
    pub devices: Vec<String>,
}

/// Handle to an ffmpeg installation.
///
/// When an install directory is configured its `bin/` executables are
/// preferred; otherwise (or when they are missing) the tools are looked up
/// on PATH.
#[derive(Debug, Clone)]
pub struct Engine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Engine {
    pub fn new(install_dir: Option<&Path>) -> Result<Self> {
        Ok(Self {
            ffmpeg: resolve_binary(install_dir, FFMPEG_BIN, "ffmpeg")?,
            ffprobe: resolve_binary(install_dir, FFPROBE_BIN, "ffprobe")?,
        })
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Run ffmpeg with the given arguments, blocking until it exits.
    ///
    /// A non-zero exit is not an error at this level; callers inspect the
    /// returned [`EngineOutput`].
    pub fn ffmpeg<S: AsRef<std::ffi::OsStr>>(&self, args: &[S]) -> Result<EngineOutput> {
        #[cfg(feature = "tracing")]
        tracing::trace!("ffmpeg {:?}", args.iter().map(|a| a.as_ref()).collect::<Vec<_>>());

        let output = Command::new(&self.ffmpeg).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffmpeg")
            } else {
                Error::Io(e)
            }
        })?;

        Ok(EngineOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Probe a media file and return the primary video stream's metadata.
    pub fn probe(&self, file: &Path) -> Result<MediaInfo> {
        if !file.exists() {
            return Err(Error::file_not_found(file));
        }

        let output = Command::new(&self.ffprobe)
            .args([
                "-hide_banner",
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-i",
            ])
            .arg(file)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found("ffprobe")
                } else {
                    Error::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::tool_failed("ffprobe", stderr.to_string()));
        }

        let json = String::from_utf8(output.stdout)
            .map_err(|e| Error::parse_error("ffprobe", format!("invalid UTF-8: {}", e)))?;

        parse_probe_output(file, &json)
    }

    /// Query an encoder's capabilities.
    pub fn capabilities(&self, codec: &str) -> Result<EncoderCaps> {
        let help_topic = format!("encoder={}", codec);
        let output = self.ffmpeg(&[
            "-hide_banner",
            "-v",
            "quiet",
            "-h",
            help_topic.as_str(),
        ])?;

        if !output.success() {
            return Err(Error::tool_failed("ffmpeg", output.stderr));
        }

        Ok(parse_capabilities(&output.stdout))
    }

    /// Smoke-test an encoder by encoding one second of a synthetic source
    /// to null output.
    pub fn smoke_test(&self, codec: &str) -> bool {
        let result = self.ffmpeg(&[
            "-hide_banner",
            "-v",
            "error",
            "-f",
            "lavfi",
            "-i",
            "color=size=256x256:duration=1:rate=30:color=black",
            "-c:v",
            codec,
            "-f",
            "null",
            "-",
        ]);

        match result {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }
}

fn resolve_binary(install_dir: Option<&Path>, bin_name: &str, tool: &str) -> Result<PathBuf> {
    if let Some(dir) = install_dir {
        let candidate = dir.join("bin").join(bin_name);
        if candidate.exists() {
            return Ok(candidate);
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(
            "{} not found under {}, falling back to PATH",
            tool,
            dir.display()
        );
    }

    tools::require_tool(tool)
}

/// Parse the capability lines of `ffmpeg -h encoder=<name>` output.
pub(crate) fn parse_capabilities(text: &str) -> EncoderCaps {
    let mut caps = EncoderCaps::default();

    for line in text.lines() {
        if line.contains("General capabilities:") {
            caps.hardware = line.contains("hardware");
        } else if let Some(rest) = value_after(line, "Supported hardware devices:") {
            caps.devices = split_words(rest);
        } else if let Some(rest) = value_after(line, "Supported pixel formats:") {
            caps.pixel_formats = split_words(rest);
        }
    }

    caps
}

fn value_after<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.find(label).map(|at| &line[at + label.len()..])
}

fn split_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(|w| w.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NVENC_HELP: &str = "\
Encoder h264_nvenc [NVIDIA NVENC H.264 encoder]:
    General capabilities: dr1 delay hardware
    Threading capabilities: none
    Supported hardware devices: cuda cuda d3d11va
    Supported pixel formats: yuv420p nv12 p010le yuv444p
";

    const X264_HELP: &str = "\
Encoder libx264 [libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10]:
    General capabilities: dr1 delay threads
    Threading capabilities: other
    Supported pixel formats: yuv420p yuvj420p yuv422p
";

    #[test]
    fn parse_hardware_encoder_capabilities() {
        let caps = parse_capabilities(NVENC_HELP);
        assert!(caps.hardware);
        assert_eq!(caps.devices, ["cuda", "cuda", "d3d11va"]);
        assert_eq!(
            caps.pixel_formats,
            ["yuv420p", "nv12", "p010le", "yuv444p"]
        );
    }

    #[test]
    fn parse_software_encoder_capabilities() {
        let caps = parse_capabilities(X264_HELP);
        assert!(!caps.hardware);
        assert!(caps.devices.is_empty());
        assert_eq!(caps.pixel_formats.len(), 3);
    }

    #[test]
    fn configured_install_dir_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(FFMPEG_BIN), b"").unwrap();
        std::fs::write(bin.join(FFPROBE_BIN), b"").unwrap();

        let engine = Engine::new(Some(dir.path())).unwrap();
        assert_eq!(engine.ffmpeg_path(), bin.join(FFMPEG_BIN));
    }
}
