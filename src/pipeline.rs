//! Transcode orchestrator.
//!
//! Drives one source file through primary segmentation, optional audio
//! track re-packaging and optional source cleanup, writing into a package
//! directory the repository has already prepared. Playlists are staged
//! under a temporary name and only renamed into place once every step has
//! succeeded, so a package with a `playlist.m3u8` is always complete.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::config::MediaConfig;
use crate::error::{PackagerError, Result};
use crate::layout::{PackageLayout, SourceMedia, PLAYLIST_FILE, STAGED_PLAYLIST_FILE};
use crate::media::{MediaCommandBuilder, MediaEngine, StreamProbe};

/// How the primary segmentation treats audio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PackagingMode {
    /// All streams copied into the primary playlist
    #[default]
    CopyThrough,
    /// Video alone in the primary playlist, one playlist per audio stream
    TrackSplit,
}

impl PackagingMode {
    pub fn from_flag(extract_audio_tracks: bool) -> Self {
        if extract_audio_tracks {
            PackagingMode::TrackSplit
        } else {
            PackagingMode::CopyThrough
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub mode: PackagingMode,
    pub delete_source: bool,
}

/// What a finished run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageOutcome {
    pub name: String,
    pub root: PathBuf,
    pub mode: PackagingMode,
    pub audio_tracks: usize,
    pub source_deleted: bool,
}

/// Temporary file owned by one pipeline run.
///
/// Completed steps release it with [`IntermediateFile::remove`]; a guard that
/// is dropped while still armed (a step failed or the run was cancelled)
/// removes the file synchronously.
#[derive(Debug)]
struct IntermediateFile {
    path: PathBuf,
    armed: bool,
}

impl IntermediateFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        self.armed = false;
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove intermediate file {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for IntermediateFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Single small file per track; a blocking unlink is acceptable here.
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove intermediate file {}: {}", self.path.display(), e),
        }
    }
}

pub struct TranscodePipeline {
    engine: Arc<dyn MediaEngine>,
    commands: MediaCommandBuilder,
}

impl TranscodePipeline {
    pub fn new(engine: Arc<dyn MediaEngine>, config: MediaConfig) -> Self {
        Self {
            engine,
            commands: MediaCommandBuilder::new(config),
        }
    }

    /// Run every step for one source into an already prepared package directory.
    pub async fn run(
        &self,
        source: &SourceMedia,
        probe: &StreamProbe,
        layout: &PackageLayout,
        options: PipelineOptions,
    ) -> Result<PackageOutcome> {
        info!(
            "Packaging {} into {} ({:?})",
            source.path.display(),
            layout.root.display(),
            options.mode
        );

        let track_dirs = match options.mode {
            PackagingMode::CopyThrough => {
                let command = self.commands.segment_copy_through(&source.path, layout);
                self.engine.run(command).await?;
                Vec::new()
            }
            PackagingMode::TrackSplit => self.split_tracks(source, probe, layout).await?,
        };

        // Tracks first, primary last: the primary playlist marks completion.
        for track_dir in &track_dirs {
            promote_staged_playlist(track_dir).await?;
        }
        promote_staged_playlist(&layout.root).await?;

        let source_deleted = options.delete_source && delete_source(&source.path).await;

        info!("Package {} complete ({} audio tracks)", layout.name, track_dirs.len());
        Ok(PackageOutcome {
            name: layout.name.clone(),
            root: layout.root.clone(),
            mode: options.mode,
            audio_tracks: track_dirs.len(),
            source_deleted,
        })
    }

    async fn split_tracks(
        &self,
        source: &SourceMedia,
        probe: &StreamProbe,
        layout: &PackageLayout,
    ) -> Result<Vec<PathBuf>> {
        let intermediates: Vec<IntermediateFile> = (1..=probe.audio_count())
            .map(|track| IntermediateFile::new(layout.intermediate_audio(track)))
            .collect();
        let intermediate_paths: Vec<PathBuf> =
            intermediates.iter().map(|i| i.path().to_path_buf()).collect();

        let command = self
            .commands
            .segment_track_split(&source.path, layout, &intermediate_paths);
        self.engine.run(command).await?;

        let mut track_dirs = Vec::with_capacity(intermediates.len());
        for (position, intermediate) in intermediates.into_iter().enumerate() {
            let track = position + 1;
            let track_dir = layout.track_dir(track);
            fs::create_dir_all(&track_dir).await?;

            info!("Re-packaging audio track {} of {}", track, probe.audio_count());
            let command = self.commands.repackage_audio(intermediate.path(), &track_dir);
            self.engine.run(command).await?;

            intermediate.remove().await;
            track_dirs.push(track_dir);
        }

        Ok(track_dirs)
    }
}

async fn promote_staged_playlist(dir: &Path) -> Result<()> {
    let staged = dir.join(STAGED_PLAYLIST_FILE);
    if !fs::try_exists(&staged).await? {
        return Err(PackagerError::Engine(format!(
            "Engine reported success but wrote no playlist in {}",
            dir.display()
        )));
    }
    fs::rename(&staged, dir.join(PLAYLIST_FILE)).await?;
    Ok(())
}

async fn delete_source(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => {
            info!("Deleted source {}", path.display());
            true
        }
        Err(e) => {
            warn!("Package is complete but source {} could not be deleted: {}", path.display(), e);
            false
        }
    }
}
