//! Package naming and on-disk layout.
//!
//! A package lives at `<content-root>/<sanitized-name>/` and contains the
//! primary `playlist.m3u8`, its segments, optional `audio_track_{n}/`
//! directories and subtitle files. Everything here is pure path arithmetic;
//! no I/O happens in this module.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{PackagerError, Result};

/// File name of every finished playlist (primary and per-track)
pub const PLAYLIST_FILE: &str = "playlist.m3u8";

/// Name a playlist carries while its pipeline is still running
pub const STAGED_PLAYLIST_FILE: &str = "playlist.m3u8.partial";

/// Segment file pattern handed to the HLS muxer
pub const SEGMENT_PATTERN: &str = "playlist%d.ts";

/// Prefix of nested audio track directories
pub const AUDIO_TRACK_PREFIX: &str = "audio_track_";

/// Extension of the lossy intermediate produced for each extracted audio track
pub const INTERMEDIATE_AUDIO_EXTENSION: &str = "mp3";

/// Extension of subtitle ("legend") files
pub const SUBTITLE_EXTENSION: &str = "srt";

const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Strip every character that is not allowed in a single path component.
pub fn sanitize_package_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| !c.is_control() && !INVALID_PATH_CHARS.contains(c))
        .collect();

    kept.trim_start()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// An input file for one ingest or process call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMedia {
    /// Where the bytes currently are
    pub path: PathBuf,
    /// Base name used to derive the package name
    pub base_name: String,
    /// Lowercased container extension, without the dot
    pub extension: String,
}

impl SourceMedia {
    /// Describe a file that already exists at `path`.
    pub fn from_path(path: &Path, config: &Config) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackagerError::Validation(format!("Invalid file name: {}", path.display())))?;

        Self::named(path.to_path_buf(), file_name, config)
    }

    /// Describe bytes held at `holding_path` that were submitted as `file_name`.
    pub fn from_upload(holding_path: &Path, file_name: &str, config: &Config) -> Result<Self> {
        Self::named(holding_path.to_path_buf(), file_name, config)
    }

    /// Validate `file_name` against the allow-list and split it.
    pub fn split_file_name(file_name: &str, config: &Config) -> Result<(String, String)> {
        let file_name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackagerError::Validation("No file name received".to_string()))?;

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if !config.is_allowed_extension(&extension) {
            return Err(PackagerError::Validation(format!(
                "Invalid file type: '{}' (accepted: {})",
                file_name,
                config.storage.allowed_extensions.join(", ")
            )));
        }

        let base_name = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        Ok((base_name, extension))
    }

    fn named(path: PathBuf, file_name: &str, config: &Config) -> Result<Self> {
        let (base_name, extension) = Self::split_file_name(file_name, config)?;
        Ok(Self { path, base_name, extension })
    }
}

/// On-disk identity of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    pub name: String,
    pub root: PathBuf,
}

impl PackageLayout {
    pub fn playlist(&self) -> PathBuf {
        self.root.join(PLAYLIST_FILE)
    }

    pub fn staged_playlist(&self) -> PathBuf {
        self.root.join(STAGED_PLAYLIST_FILE)
    }

    pub fn segment_pattern(&self) -> PathBuf {
        self.root.join(SEGMENT_PATTERN)
    }

    /// `audio_track_{n}` directory, numbered from 1
    pub fn track_dir(&self, track: usize) -> PathBuf {
        self.root.join(track_dir_name(track))
    }

    /// Intermediate audio file for track `n`, placed in the package root
    pub fn intermediate_audio(&self, track: usize) -> PathBuf {
        self.root
            .join(format!("{}.{}", track_dir_name(track), INTERMEDIATE_AUDIO_EXTENSION))
    }
}

pub fn track_dir_name(track: usize) -> String {
    format!("{}{}", AUDIO_TRACK_PREFIX, track)
}

/// Parse `audio_track_{n}` back into `n`.
pub fn parse_track_dir_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(AUDIO_TRACK_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|n| *n > 0)
}

/// Derive the package layout for a source base name.
pub fn resolve_layout(content_root: &Path, source_base_name: &str) -> Result<PackageLayout> {
    let name = sanitize_package_name(source_base_name);
    if name.is_empty() || name == "." || name == ".." {
        return Err(PackagerError::Validation(format!(
            "'{}' does not yield a usable package name",
            source_base_name
        )));
    }

    Ok(PackageLayout {
        root: content_root.join(&name),
        name,
    })
}
