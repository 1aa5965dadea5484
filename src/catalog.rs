//! Read path over the package tree: listing and single-file serving.
//!
//! There is no index; every call scans the filesystem. A directory counts as
//! a package only once its primary playlist exists.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{PackagerError, Result};
use crate::layout::{parse_track_dir_name, PLAYLIST_FILE, SUBTITLE_EXTENSION};

/// Catalog entry for one complete package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: String,
    pub playlist: String,
    pub tracks: Vec<String>,
    pub legends: Vec<String>,
}

/// An opened package file ready to be streamed
#[derive(Debug)]
pub struct ServedFile {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub len: u64,
    pub file: fs::File,
}

/// Bytes escaped in a URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Fallback extension table used when no fixed override applies
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("aac", "audio/aac"),
    ("css", "text/css"),
    ("html", "text/html"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("json", "application/json"),
    ("key", "application/octet-stream"),
    ("m4a", "audio/mp4"),
    ("m4s", "video/iso.segment"),
    ("m4v", "video/mp4"),
    ("mkv", "video/x-matroska"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("mpeg", "video/mpeg"),
    ("png", "image/png"),
    ("txt", "text/plain"),
    ("vtt", "text/vtt"),
    ("webm", "video/webm"),
    ("webp", "image/webp"),
    ("xml", "application/xml"),
];

/// Resolve the content type of a package file from its extension.
pub fn content_type_for(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "m3u8" => Ok("application/x-mpegURL"),
        "ts" => Ok("application/x-typescript"),
        "srt" => Ok("application/x-subrip"),
        other => CONTENT_TYPES
            .iter()
            .find(|(ext, _)| *ext == other)
            .map(|(_, content_type)| *content_type)
            .ok_or_else(|| PackagerError::UnrecognizedContentType(path.display().to_string())),
    }
}

pub struct Catalog {
    content_root: PathBuf,
    public_prefix: String,
}

impl Catalog {
    pub fn new<P: AsRef<Path>>(content_root: P, public_prefix: &str) -> Self {
        Self {
            content_root: content_root.as_ref().to_path_buf(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Scan the content root for complete packages, ordered by name.
    pub async fn list_packages(&self) -> Result<Vec<Package>> {
        let content_root = self.content_root.clone();
        let prefix = self.public_prefix.clone();

        tokio::task::spawn_blocking(move || scan_packages(&content_root, &prefix))
            .await
            .map_err(|e| PackagerError::Io(std::io::Error::other(e)))?
    }

    /// Open `segments` (one or two levels) beneath package `package`.
    pub async fn serve_file(&self, package: &str, segments: &[&str]) -> Result<ServedFile> {
        if segments.is_empty() || segments.len() > 2 {
            return Err(PackagerError::Validation(format!(
                "Expected one or two path segments, got {}",
                segments.len()
            )));
        }
        validate_segment(package)?;
        for segment in segments {
            validate_segment(segment)?;
        }

        let package_dir = self.content_root.join(package);
        if !fs::try_exists(package_dir.join(PLAYLIST_FILE)).await? {
            return Err(PackagerError::NotFound(format!("Package '{}'", package)));
        }

        let requested = segments
            .iter()
            .fold(package_dir.clone(), |path, segment| path.join(segment));
        let not_found = || PackagerError::NotFound(format!("{}/{}", package, segments.join("/")));

        let resolved = match fs::canonicalize(&requested).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        // Symlinks must not lead out of the package.
        let package_dir = fs::canonicalize(&package_dir).await?;
        if !resolved.starts_with(&package_dir) {
            return Err(PackagerError::Validation(format!(
                "'{}' resolves outside package '{}'",
                segments.join("/"),
                package
            )));
        }

        let meta = fs::metadata(&resolved).await?;
        if !meta.is_file() {
            return Err(not_found());
        }

        let content_type = content_type_for(&resolved)?;
        let file = fs::File::open(&resolved).await?;
        debug!("Serving {} as {}", resolved.display(), content_type);

        Ok(ServedFile {
            path: resolved,
            content_type,
            len: meta.len(),
            file,
        })
    }
}

/// Reject anything but a single plain path component.
fn validate_segment(segment: &str) -> Result<()> {
    let invalid = || PackagerError::Validation(format!("Invalid path segment '{}'", segment));

    if segment.is_empty() || segment.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }

    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

fn scan_packages(content_root: &Path, prefix: &str) -> Result<Vec<Package>> {
    if !content_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut packages = Vec::new();
    for entry in WalkDir::new(content_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        let dir = entry.path();
        if !dir.join(PLAYLIST_FILE).is_file() {
            continue;
        }

        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        packages.push(Package {
            name: name.to_string(),
            playlist: public_url(prefix, content_root, &dir.join(PLAYLIST_FILE)),
            tracks: discover_tracks(dir)
                .iter()
                .map(|p| public_url(prefix, content_root, p))
                .collect(),
            legends: discover_legends(dir)
                .iter()
                .map(|p| public_url(prefix, content_root, p))
                .collect(),
        });
    }

    Ok(packages)
}

/// Finished audio track playlists, ordered by track number
fn discover_tracks(package_dir: &Path) -> Vec<PathBuf> {
    let mut tracks: Vec<(usize, PathBuf)> = WalkDir::new(package_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let track = parse_track_dir_name(e.file_name().to_str()?)?;
            let playlist = e.path().join(PLAYLIST_FILE);
            playlist.is_file().then_some((track, playlist))
        })
        .collect();

    tracks.sort_by_key(|(track, _)| *track);
    tracks.into_iter().map(|(_, playlist)| playlist).collect()
}

fn discover_legends(package_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(package_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(SUBTITLE_EXTENSION))
        })
        .map(|e| e.into_path())
        .collect()
}

/// Client-relative URL for a file under the content root, one escaped
/// segment per path component
fn public_url(prefix: &str, content_root: &Path, file: &Path) -> String {
    let relative = pathdiff::diff_paths(file, content_root).unwrap_or_else(|| file.to_path_buf());
    let parts: Vec<String> = relative
        .components()
        .map(|c| utf8_percent_encode(&c.as_os_str().to_string_lossy(), PATH_SEGMENT).to_string())
        .collect();
    format!("{}/{}", prefix, parts.join("/"))
}
