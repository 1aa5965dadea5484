//! Package directories as the unit of state.
//!
//! This is the only place a package directory is created or destroyed.
//! Writers serialize on a per-package lock keyed by the sanitized name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::error::{PackagerError, Result};
use crate::layout::PackageLayout;

/// How `prepare` treats a directory that already has content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareMode {
    /// First-time ingest: existing content is a conflict
    CreateNew,
    /// Reprocessing: existing content is deleted first
    Replace,
}

pub struct PackageRepository {
    content_root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PackageRepository {
    pub fn new<P: AsRef<Path>>(content_root: P) -> Self {
        Self {
            content_root: content_root.as_ref().to_path_buf(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Layouts from another content root are never touched.
    fn check_owned(&self, layout: &PackageLayout) -> Result<()> {
        if layout.root.parent() != Some(self.content_root.as_path()) {
            return Err(PackagerError::Validation(format!(
                "'{}' is not a package directory under {}",
                layout.root.display(),
                self.content_root.display()
            )));
        }
        Ok(())
    }

    /// Acquire the write lock for one package name.
    pub async fn lock(&self, layout: &PackageLayout) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Held or awaited locks keep an extra reference.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(layout.name.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Fail with a conflict if the package directory already has content.
    pub async fn ensure_absent(&self, layout: &PackageLayout) -> Result<()> {
        if has_content(&layout.root).await? {
            return Err(PackagerError::Conflict(format!(
                "Package '{}' was already uploaded",
                layout.name
            )));
        }
        Ok(())
    }

    /// Make the package directory ready for writing.
    pub async fn prepare(&self, layout: &PackageLayout, mode: PrepareMode) -> Result<()> {
        self.check_owned(layout)?;
        match fs::metadata(&layout.root).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(PackagerError::Conflict(format!(
                    "'{}' exists and is not a directory",
                    layout.root.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if has_content(&layout.root).await? {
            match mode {
                PrepareMode::CreateNew => {
                    return Err(PackagerError::Conflict(format!(
                        "Package '{}' was already uploaded",
                        layout.name
                    )));
                }
                PrepareMode::Replace => {
                    info!("Replacing existing package {}", layout.name);
                    fs::remove_dir_all(&layout.root).await?;
                }
            }
        }

        fs::create_dir_all(&layout.root).await?;
        debug!("Package directory ready: {}", layout.root.display());
        Ok(())
    }

    /// Remove a package directory and everything in it. Missing is fine.
    pub async fn discard(&self, layout: &PackageLayout) -> Result<()> {
        self.check_owned(layout)?;
        match fs::remove_dir_all(&layout.root).await {
            Ok(()) => {
                info!("Discarded package {}", layout.name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn has_content(dir: &Path) -> Result<bool> {
    match fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        // A plain file at the package path counts as content.
        Err(_) if dir.exists() => Ok(true),
        Err(e) => Err(e.into()),
    }
}
