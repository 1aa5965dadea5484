use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

use crate::catalog::{Catalog, Package, ServedFile};
use crate::config::Config;
use crate::error::{PackagerError, Result};
use crate::layout::{resolve_layout, PackageLayout, SourceMedia};
use crate::media::{MediaEngine, MediaEngineFactory};
use crate::pipeline::{PackageOutcome, PackagingMode, PipelineOptions, TranscodePipeline};
use crate::repository::{PackageRepository, PrepareMode};
use crate::subtitle;

/// Reprocess a file that already exists on disk
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub file_path: PathBuf,
    #[serde(default)]
    pub extract_audio_tracks: bool,
    #[serde(default)]
    pub delete_source_after_process: bool,
}

pub struct Workflow {
    config: Config,
    engine: Arc<dyn MediaEngine>,
    repository: PackageRepository,
    catalog: Catalog,
    pipeline: TranscodePipeline,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let engine = MediaEngineFactory::create_engine(config.media.clone());
        Ok(Self::with_engine(config, engine))
    }

    /// Build a workflow around any engine implementation
    pub fn with_engine(config: Config, engine: Arc<dyn MediaEngine>) -> Self {
        let repository = PackageRepository::new(&config.storage.content_root);
        let catalog = Catalog::new(&config.storage.content_root, &config.storage.public_prefix);
        let pipeline = TranscodePipeline::new(engine.clone(), config.media.clone());

        Self {
            config,
            engine,
            repository,
            catalog,
            pipeline,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    /// Package an uploaded payload. An existing package with the same name is
    /// a conflict; the temporary holding file never outlives this call.
    /// Body read errors of kind `InvalidData` are reported as validation failures.
    pub async fn ingest_upload<R>(
        &self,
        file_name: &str,
        body: R,
        mode: PackagingMode,
    ) -> Result<PackageOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        info!("Ingesting upload: {}", file_name);

        let (base_name, extension) = SourceMedia::split_file_name(file_name, &self.config)?;
        let layout = resolve_layout(&self.config.storage.content_root, &base_name)?;
        self.repository.ensure_absent(&layout).await?;

        let holding = self.hold_upload(body, &extension).await?;
        let source = SourceMedia::from_upload(holding.path(), file_name, &self.config)?;

        let probe = self.engine.probe(&source.path).await?;

        let _guard = self.repository.lock(&layout).await;
        self.repository.prepare(&layout, PrepareMode::CreateNew).await?;

        let options = PipelineOptions { mode, delete_source: false };
        let outcome = self.pipeline.run(&source, &probe, &layout, options).await;
        self.settle(&layout, outcome).await
    }

    /// Reprocess an existing file; any previous package of the same name is replaced.
    pub async fn process_existing(&self, request: &ProcessRequest) -> Result<PackageOutcome> {
        let path = &request.file_path;
        info!("Processing existing file: {}", path.display());

        if !path.is_absolute() {
            return Err(PackagerError::Validation(format!(
                "File path must be absolute: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(PackagerError::Validation(format!(
                "File does not exist: {}",
                path.display()
            )));
        }

        let source = SourceMedia::from_path(path, &self.config)?;
        self.ensure_outside_content_root(&source.path).await?;
        let layout = resolve_layout(&self.config.storage.content_root, &source.base_name)?;

        // Probe strictly before anything destructive.
        let probe = self.engine.probe(&source.path).await?;

        let _guard = self.repository.lock(&layout).await;
        self.repository.prepare(&layout, PrepareMode::Replace).await?;

        let options = PipelineOptions {
            mode: PackagingMode::from_flag(request.extract_audio_tracks),
            delete_source: request.delete_source_after_process,
        };
        let outcome = self.pipeline.run(&source, &probe, &layout, options).await;
        self.settle(&layout, outcome).await
    }

    pub async fn list_packages(&self) -> Result<Vec<Package>> {
        self.catalog.list_packages().await
    }

    /// Open a package file given its package-relative path (`a` or `a/b`)
    pub async fn fetch(&self, package: &str, relative_path: &str) -> Result<ServedFile> {
        let segments: Vec<&str> = relative_path.split('/').collect();
        self.catalog.serve_file(package, &segments).await
    }

    pub async fn attach_subtitle<P: AsRef<Path>>(&self, package: &str, subtitle_path: P) -> Result<PathBuf> {
        let layout = resolve_layout(&self.config.storage.content_root, package)?;
        if layout.name != package {
            return Err(PackagerError::NotFound(format!("Package '{}'", package)));
        }

        let _guard = self.repository.lock(&layout).await;
        subtitle::attach_subtitle(&layout, subtitle_path).await
    }

    /// Package directories get replaced wholesale, so a source stored inside
    /// the content root could be removed before it is read.
    async fn ensure_outside_content_root(&self, source: &Path) -> Result<()> {
        let content_root = match tokio::fs::canonicalize(&self.config.storage.content_root).await {
            Ok(root) => root,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if tokio::fs::canonicalize(source).await?.starts_with(&content_root) {
            return Err(PackagerError::Validation(format!(
                "Source must not be stored under the content root: {}",
                source.display()
            )));
        }
        Ok(())
    }

    /// A failed run leaves no package behind.
    async fn settle(
        &self,
        layout: &PackageLayout,
        outcome: Result<PackageOutcome>,
    ) -> Result<PackageOutcome> {
        if let Err(e) = &outcome {
            warn!("Packaging {} failed: {}", layout.name, e);
            if let Err(cleanup) = self.repository.discard(layout).await {
                warn!("Failed to discard partial package {}: {}", layout.name, cleanup);
            }
        }
        outcome
    }

    /// Copy an upload body into a temporary file, enforcing the size limit
    async fn hold_upload<R>(&self, body: R, extension: &str) -> Result<tempfile::NamedTempFile>
    where
        R: AsyncRead + Unpin + Send,
    {
        let upload_dir = self.config.upload_dir();
        tokio::fs::create_dir_all(&upload_dir).await?;

        let holding = tempfile::Builder::new()
            .prefix("hlspack-upload-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(&upload_dir)?;

        let max = self.config.storage.max_upload_bytes;
        let mut file = tokio::fs::File::from_std(holding.reopen()?);
        let mut limited = body.take(max + 1);
        let written = tokio::io::copy(&mut limited, &mut file)
            .await
            .map_err(|e| match e.kind() {
                // Raised by the body reader for malformed or truncated payloads.
                std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                    PackagerError::Validation(format!("Upload could not be read: {}", e))
                }
                _ => PackagerError::Io(e),
            })?;
        file.flush().await?;

        if written == 0 {
            return Err(PackagerError::Validation("No file received".to_string()));
        }
        if written > max {
            return Err(PackagerError::Validation(format!(
                "Upload exceeds the {} byte limit",
                max
            )));
        }

        Ok(holding)
    }
}
