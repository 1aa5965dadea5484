use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, PackagerError};

// Default values for optional configuration keys
fn default_public_prefix() -> String {
    "/hls".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    60
}

fn default_transcode_timeout_secs() -> u64 {
    6 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub media: MediaConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per package
    pub content_root: PathBuf,
    /// Directory for temporary upload holding files (system temp dir when unset)
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
    /// Accepted source container extensions, without the leading dot
    pub allowed_extensions: Vec<String>,
    /// Largest accepted upload payload in bytes
    pub max_upload_bytes: u64,
    /// URL prefix under which package files are exposed to clients
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// HLS segment duration in seconds
    pub segment_duration_secs: u32,
    /// Codec used when re-packaging extracted audio tracks
    pub audio_codec: String,
    /// Target bitrate for re-packaged audio tracks (ffmpeg notation, e.g. "128k")
    pub audio_bitrate: String,
    /// Upper bound for a single ffprobe run
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Upper bound for a single ffmpeg run
    #[serde(default = "default_transcode_timeout_secs")]
    pub transcode_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP surface binds to
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                content_root: PathBuf::from("hls"),
                upload_dir: None,
                allowed_extensions: vec![
                    "mpeg".to_string(),
                    "mp4".to_string(),
                    "mkv".to_string(),
                ],
                max_upload_bytes: 2 * 1024 * 1024 * 1024,
                public_prefix: default_public_prefix(),
            },
            media: MediaConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                ffprobe_path: "ffprobe".to_string(),
                segment_duration_secs: 10,
                audio_codec: "aac".to_string(),
                audio_bitrate: "128k".to_string(),
                probe_timeout_secs: default_probe_timeout_secs(),
                transcode_timeout_secs: default_transcode_timeout_secs(),
            },
            server: ServerConfig {
                bind: "127.0.0.1:8080".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PackagerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PackagerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| PackagerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.allowed_extensions.is_empty() {
            return Err(PackagerError::Config("allowed_extensions must not be empty".to_string()));
        }
        if self.media.segment_duration_secs == 0 {
            return Err(PackagerError::Config("segment_duration_secs must be positive".to_string()));
        }
        if self.media.probe_timeout_secs == 0 || self.media.transcode_timeout_secs == 0 {
            return Err(PackagerError::Config("engine timeouts must be positive".to_string()));
        }
        if !self.storage.public_prefix.starts_with('/') {
            return Err(PackagerError::Config("public_prefix must start with '/'".to_string()));
        }
        Ok(())
    }

    /// Whether `extension` (with or without leading dot) is on the allow-list
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.storage
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.storage
            .upload_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl MediaConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allow_list() {
        let config = Config::default();
        assert!(config.is_allowed_extension("mp4"));
        assert!(config.is_allowed_extension(".MKV"));
        assert!(config.is_allowed_extension("mpeg"));
        assert!(!config.is_allowed_extension("mov"));
        assert!(!config.is_allowed_extension(""));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hlspack.toml");

        let mut config = Config::default();
        config.storage.content_root = PathBuf::from("/srv/hls");
        config.media.audio_bitrate = "192k".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.storage.content_root, PathBuf::from("/srv/hls"));
        assert_eq!(loaded.media.audio_bitrate, "192k");
        assert_eq!(loaded.media.segment_duration_secs, 10);
    }

    #[test]
    fn test_optional_keys_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hlspack.toml");
        std::fs::write(
            &path,
            r#"
[storage]
content_root = "out"
allowed_extensions = ["mp4"]
max_upload_bytes = 1024

[media]
ffmpeg_path = "ffmpeg"
ffprobe_path = "ffprobe"
segment_duration_secs = 6
audio_codec = "aac"
audio_bitrate = "96k"

[server]
bind = "0.0.0.0:9000"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.storage.public_prefix, "/hls");
        assert_eq!(config.media.probe_timeout_secs, 60);
        assert!(config.storage.upload_dir.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_allow_list() {
        let mut config = Config::default();
        config.storage.allowed_extensions.clear();
        assert!(matches!(config.validate(), Err(PackagerError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_segment_duration() {
        let mut config = Config::default();
        config.media.segment_duration_secs = 0;
        assert!(config.validate().is_err());
    }
}
