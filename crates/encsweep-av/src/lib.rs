//! # encsweep-av
//!
//! Subprocess plumbing for the encsweep benchmark harness.
//!
//! This crate is the boundary to the external media engine (ffmpeg and
//! ffprobe). It provides:
//! - Probing media files via ffprobe's JSON output, normalizing Matroska
//!   `DURATION` tags and defaulting missing color metadata
//! - Blocking ffmpeg invocation with captured output
//! - Encoder capability queries and smoke tests
//! - External tool detection
//!
//! ## Example
//!
//! ```no_run
//! use encsweep_av::Engine;
//!
//! let engine = Engine::new(None)?;
//! let info = engine.probe(std::path::Path::new("/path/to/video.mkv"))?;
//! println!("{}x{} @ {:.2} fps", info.width, info.height, info.frame_rate);
//! # Ok::<(), encsweep_av::Error>(())
//! ```

mod engine;
mod error;
pub mod probe;
pub mod tools;

// Re-exports
pub use engine::{EncoderCaps, Engine, EngineOutput};
pub use error::{Error, Result};
pub use probe::{ColorInfo, MediaInfo};
pub use tools::{check_tool_with_arg, check_tools, require_tool, ToolInfo};
