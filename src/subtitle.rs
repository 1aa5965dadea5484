use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::{Result, PackagerError};
use crate::layout::{sanitize_package_name, PackageLayout, PLAYLIST_FILE, SUBTITLE_EXTENSION};

/// Copy an SRT subtitle file into the root of a finished package
pub async fn attach_subtitle<P: AsRef<Path>>(
    layout: &PackageLayout,
    subtitle_path: P,
) -> Result<PathBuf> {
    let subtitle_path = subtitle_path.as_ref();
    info!("Attaching subtitle {} to {}", subtitle_path.display(), layout.name);

    let is_srt = subtitle_path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SUBTITLE_EXTENSION));
    if !is_srt {
        return Err(PackagerError::Validation(format!(
            "Subtitle must be an .{} file: {}",
            SUBTITLE_EXTENSION,
            subtitle_path.display()
        )));
    }

    let content = match fs::read(subtitle_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PackagerError::Validation(format!(
                "Subtitle file does not exist: {}",
                subtitle_path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    if !looks_like_srt(&content) {
        return Err(PackagerError::Validation(format!(
            "Not a SubRip subtitle: {}",
            subtitle_path.display()
        )));
    }

    if !fs::try_exists(layout.root.join(PLAYLIST_FILE)).await? {
        return Err(PackagerError::NotFound(format!("Package '{}'", layout.name)));
    }

    let stem = subtitle_path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_package_name)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PackagerError::Validation(format!(
            "Subtitle file name is not usable: {}",
            subtitle_path.display()
        )))?;

    let destination = layout.root.join(format!("{}.{}", stem, SUBTITLE_EXTENSION));
    fs::write(&destination, content).await?;

    info!("Subtitle attached as {}", destination.display());
    Ok(destination)
}

/// First cue must start with a sequence number followed by a timing line
fn looks_like_srt(content: &[u8]) -> bool {
    let text = String::from_utf8_lossy(content);
    let mut lines = text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .skip_while(|l| l.is_empty());

    let numbered = lines.next().is_some_and(|l| l.parse::<u64>().is_ok());
    let timed = lines.next().is_some_and(|l| l.contains("-->"));
    numbered && timed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::resolve_layout;

    const CUE: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n";

    fn package(dir: &Path) -> PackageLayout {
        let layout = resolve_layout(dir, "movie").unwrap();
        std::fs::create_dir_all(&layout.root).unwrap();
        std::fs::write(layout.playlist(), "#EXTM3U\n").unwrap();
        layout
    }

    #[test]
    fn test_looks_like_srt() {
        assert!(looks_like_srt(CUE.as_bytes()));
        assert!(looks_like_srt("\u{feff}\n\n1\r\n00:00:01,000 --> 00:00:02,000\r\nHi".as_bytes()));
        assert!(!looks_like_srt(b""));
        assert!(!looks_like_srt(b"WEBVTT\n\n00:00.000 --> 00:01.000\nHi"));
    }

    #[tokio::test]
    async fn test_attach_subtitle() {
        let dir = tempfile::tempdir().unwrap();
        let layout = package(dir.path());
        let source = dir.path().join("English CC .SRT");
        std::fs::write(&source, CUE).unwrap();

        let attached = attach_subtitle(&layout, &source).await.unwrap();
        assert_eq!(attached, layout.root.join("English CC.srt"));
        assert_eq!(std::fs::read_to_string(attached).unwrap(), CUE);
    }

    #[tokio::test]
    async fn test_attach_requires_complete_package() {
        let dir = tempfile::tempdir().unwrap();
        let layout = resolve_layout(dir.path(), "missing").unwrap();
        let source = dir.path().join("en.srt");
        std::fs::write(&source, CUE).unwrap();

        let result = attach_subtitle(&layout, &source).await;
        assert!(matches!(result, Err(PackagerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_attach_rejects_other_formats() {
        let dir = tempfile::tempdir().unwrap();
        let layout = package(dir.path());

        let vtt = dir.path().join("en.vtt");
        std::fs::write(&vtt, "WEBVTT\n").unwrap();
        assert!(matches!(attach_subtitle(&layout, &vtt).await, Err(PackagerError::Validation(_))));

        let empty = dir.path().join("empty.srt");
        std::fs::write(&empty, "").unwrap();
        assert!(matches!(attach_subtitle(&layout, &empty).await, Err(PackagerError::Validation(_))));

        let missing = dir.path().join("missing.srt");
        assert!(matches!(attach_subtitle(&layout, &missing).await, Err(PackagerError::Validation(_))));
    }
}
