// Transcoding engine boundary
//
// The rest of the crate talks to the engine only through `MediaEngine`:
// - Probe: stream layout of a source file
// - Commands: argument sets for each pipeline step
// - Processor: ffmpeg/ffprobe-backed implementation

pub mod commands;
pub mod probe;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

pub use commands::*;
pub use probe::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Opaque transcoding capability: probe a file, or run an argument set
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Read the stream layout of a source file
    async fn probe(&self, path: &Path) -> Result<StreamProbe>;

    /// Run one engine invocation; success means every output was written
    async fn run(&self, command: MediaCommand) -> Result<()>;

    /// Check if the engine binaries can be executed
    fn check_availability(&self) -> Result<()>;

    /// Get engine version information
    async fn version_info(&self) -> Result<String>;
}

/// Factory for creating engine instances
pub struct MediaEngineFactory;

impl MediaEngineFactory {
    /// Create the default engine implementation (FFmpeg-based)
    pub fn create_engine(config: MediaConfig) -> Arc<dyn MediaEngine> {
        Arc::new(processor::FfmpegEngine::new(config))
    }
}
