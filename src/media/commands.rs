use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::MediaConfig;
use crate::error::{Result, PackagerError};
use crate::layout::PackageLayout;

/// Default upper bound for a single engine run
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Abstract media processing command representation
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    /// Files this command is expected to write
    pub outputs: Vec<PathBuf>,
    pub timeout: Duration,
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            outputs: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.outputs.push(path.as_ref().to_path_buf());
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Select input streams, e.g. `0:v:0`
    pub fn map<S: Into<String>>(self, specifier: S) -> Self {
        self.arg("-map").arg(specifier)
    }

    /// Set codec for all selected streams
    pub fn codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Copy all selected streams
    pub fn copy_streams(self) -> Self {
        self.codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Disable audio
    pub fn no_audio(self) -> Self {
        self.arg("-an")
    }

    /// Disable subtitle and data streams
    pub fn no_subtitles_or_data(self) -> Self {
        self.arg("-sn").arg("-dn")
    }

    /// On-demand HLS muxing: fixed segment length, every segment kept in the playlist
    pub fn hls_vod<P: AsRef<Path>>(self, segment_duration_secs: u32, segment_pattern: P) -> Self {
        self.arg("-start_number").arg("0")
            .arg("-hls_time").arg(segment_duration_secs.to_string())
            .arg("-hls_list_size").arg("0")
            .arg("-hls_playlist_type").arg("vod")
            .arg("-hls_segment_filename").arg(segment_pattern.as_ref().to_string_lossy().to_string())
            .arg("-f").arg("hls")
    }

    /// Bound the execution time
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// Spawn failures, non-zero exit and timeout expiry all surface as
    /// [`PackagerError::Engine`] carrying the engine's message.
    pub async fn execute(&self) -> Result<CommandOutput> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()
            .map_err(|e| PackagerError::Engine(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(PackagerError::Engine(format!(
                    "{} failed: I/O error waiting for process: {}",
                    self.description, e
                )));
            }
            // Dropping the wait future kills the child.
            Err(_) => {
                return Err(PackagerError::Engine(format!(
                    "{} timed out after {:?}",
                    self.description, self.timeout
                )));
            }
        };

        let captured = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            return Err(PackagerError::Engine(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                captured.stderr.trim()
            )));
        }

        Ok(captured)
    }
}

/// Builder for the argument sets each pipeline step hands to the engine
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    config: MediaConfig,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Build stream probe command
    pub fn probe<P: AsRef<Path>>(&self, path: P) -> MediaCommand {
        MediaCommand::new(&self.config.ffprobe_path, "Stream probe")
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path.as_ref().to_string_lossy().to_string())
            .with_timeout(self.config.probe_timeout())
    }

    /// Primary segmentation with every audio/video stream copied through
    pub fn segment_copy_through<P: AsRef<Path>>(
        &self,
        source: P,
        layout: &PackageLayout,
    ) -> MediaCommand {
        MediaCommand::new(&self.config.ffmpeg_path, "Primary segmentation (copy-through)")
            .overwrite()
            .input(source)
            .map("0:v")
            .map("0:a?")
            .copy_streams()
            .no_subtitles_or_data()
            .hls_vod(self.config.segment_duration_secs, layout.segment_pattern())
            .output(layout.staged_playlist())
            .with_timeout(self.config.transcode_timeout())
    }

    /// Primary segmentation with video alone in the playlist, plus one lossy
    /// intermediate file per audio stream, in audio stream order
    pub fn segment_track_split<P: AsRef<Path>>(
        &self,
        source: P,
        layout: &PackageLayout,
        intermediates: &[PathBuf],
    ) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.config.ffmpeg_path, "Primary segmentation (track-split)")
            .overwrite()
            .input(source)
            .map("0:v:0")
            .copy_streams()
            .no_audio()
            .no_subtitles_or_data()
            .hls_vod(self.config.segment_duration_secs, layout.segment_pattern())
            .output(layout.staged_playlist());

        for (position, intermediate) in intermediates.iter().enumerate() {
            cmd = cmd
                .map(format!("0:a:{}", position))
                .no_video()
                .arg("-q:a").arg("0")
                .output(intermediate);
        }

        cmd.with_timeout(self.config.transcode_timeout())
    }

    /// Transcode one intermediate audio file into its own on-demand playlist
    pub fn repackage_audio<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        intermediate: P,
        track_dir: Q,
    ) -> MediaCommand {
        let track_dir = track_dir.as_ref();

        MediaCommand::new(&self.config.ffmpeg_path, "Audio re-packaging")
            .overwrite()
            .input(intermediate)
            .audio_codec(&self.config.audio_codec)
            .audio_bitrate(&self.config.audio_bitrate)
            .hls_vod(
                self.config.segment_duration_secs,
                track_dir.join(crate::layout::SEGMENT_PATTERN),
            )
            .output(track_dir.join(crate::layout::STAGED_PLAYLIST_FILE))
            .with_timeout(self.config.transcode_timeout())
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.config.ffmpeg_path, "Version check")
            .arg("-version")
            .with_timeout(self.config.probe_timeout())
    }
}
