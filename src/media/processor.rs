use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{Result, PackagerError};
use super::{MediaCommand, MediaCommandBuilder, MediaEngine, StreamProbe, parse_ffprobe_json};

/// Concrete engine implementation (ffmpeg + ffprobe binaries)
pub struct FfmpegEngine {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegEngine {
    /// Create a new engine
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(config.clone());

        Self {
            config,
            command_builder,
        }
    }

    fn check_binary(&self, binary: &str) -> Result<()> {
        let output = Command::new(binary)
            .arg("-version")
            .output()
            .map_err(|e| PackagerError::Engine(format!("{} not found: {}", binary, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PackagerError::Engine(format!("{} version check failed", binary)))
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, path: &Path) -> Result<StreamProbe> {
        info!("Probing streams of {}", path.display());

        let output = self
            .command_builder
            .probe(path)
            .execute()
            .await
            .map_err(|e| PackagerError::ProbeFailed(e.to_string()))?;

        let probe = parse_ffprobe_json(&output.stdout)?;
        debug!(
            "Probe of {}: {} streams, {} audio",
            path.display(),
            probe.streams.len(),
            probe.audio_count()
        );
        Ok(probe)
    }

    async fn run(&self, command: MediaCommand) -> Result<()> {
        info!("Running {}", command.description);
        command.execute().await?;
        Ok(())
    }

    fn check_availability(&self) -> Result<()> {
        self.check_binary(&self.config.ffmpeg_path)?;
        self.check_binary(&self.config.ffprobe_path)?;
        info!("Transcoding engine is available");
        Ok(())
    }

    async fn version_info(&self) -> Result<String> {
        debug!("Getting engine version information");

        let output = self.command_builder.version_check().execute().await?;
        // The first line carries the version
        let first_line = output.stdout.lines().next().unwrap_or("Unknown version");
        Ok(first_line.to_string())
    }
}
