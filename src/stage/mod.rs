//! Project staging
//!
//! Materializes a working copy of the source project at the destination the
//! build will run in. Archive sources are extracted into a per-run temp
//! directory namespaced by the run token, so concurrent runs never collide
//! even on identical archive names. When no destination is given, one is
//! derived under the per-user build cache, numbered so earlier builds of the
//! same project and platform are never overwritten.
//!
//! Source resolving to the same canonical path as the destination is
//! hard-fatal: continuing would clear the source before copying it.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::prompt::Confirmer;
use crate::request::Platform;

/// Fixed project version segment in the default destination layout
pub const DEFAULT_PROJECT_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum StageError {
    #[error("source does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("source and destination folders are the same: {0}; choose a different destination")]
    SameSourceAndDest(PathBuf),

    #[error("destination {0} is not empty and was not cleared")]
    DestinationNotCleared(PathBuf),

    #[error("failed to extract archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StageResult<T> = Result<T, StageError>;

/// Resolved source and destination for one pipeline run
#[derive(Debug, Clone)]
pub struct StagingResult {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Canonical source path for one run. `temp_dir` is set when the source was
/// extracted from an archive; the orchestrator removes it once the run ends
/// so the cache stays bounded.
#[derive(Debug, Clone)]
pub struct MaterializedSource {
    pub path: PathBuf,
    pub temp_dir: Option<PathBuf>,
}

/// Stages a project into its build destination
pub struct Stager<'a> {
    confirmer: &'a dyn Confirmer,
    cache_root: PathBuf,
}

impl<'a> Stager<'a> {
    pub fn new(confirmer: &'a dyn Confirmer, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            confirmer,
            cache_root: cache_root.into(),
        }
    }

    /// Resolve the source to a canonical directory, extracting zip archives
    /// into `<cache>/temp/<archive-stem>/<run-id>/src` first.
    pub fn materialize_source(&self, source: &Path, run_id: &str) -> StageResult<MaterializedSource> {
        if !source.exists() {
            return Err(StageError::SourceMissing(source.to_path_buf()));
        }

        if source.extension().is_some_and(|e| e == "zip") {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string());
            let run_dir = self.cache_root.join("temp").join(stem).join(run_id);
            let target = run_dir.join("src");
            fs::create_dir_all(&target)?;
            extract_archive(source, &target)?;
            Ok(MaterializedSource {
                path: target.canonicalize()?,
                temp_dir: Some(run_dir),
            })
        } else {
            Ok(MaterializedSource {
                path: source.canonicalize()?,
                temp_dir: None,
            })
        }
    }

    /// Stage the source tree into the destination. Clears a non-empty
    /// destination only after confirmation; a decline aborts with the
    /// destination untouched.
    pub fn stage(
        &self,
        source: &Path,
        dest: Option<&Path>,
        project_id: &str,
        platform: Platform,
    ) -> StageResult<StagingResult> {
        let source = source.canonicalize()?;

        let dest = match dest {
            Some(d) => d.to_path_buf(),
            None => self.default_destination(project_id, platform)?,
        };

        // Collision check must come before any clearing
        if dest.exists() {
            let resolved_dest = dest.canonicalize()?;
            if resolved_dest == source {
                log::error!(
                    "source and destination folders are the same: {}",
                    source.display()
                );
                return Err(StageError::SameSourceAndDest(source));
            }
        }

        if dest.is_file() || (dest.is_dir() && fs::read_dir(&dest)?.next().is_some()) {
            let message = format!(
                "Destination folder {} is not empty. Empty it and continue?",
                dest.display()
            );
            if !self.confirmer.confirm(&message) {
                log::error!("destination {} was not cleared, aborting", dest.display());
                return Err(StageError::DestinationNotCleared(dest));
            }
            if dest.is_dir() {
                fs::remove_dir_all(&dest)?;
            } else {
                fs::remove_file(&dest)?;
            }
        }
        fs::create_dir_all(&dest)?;

        copy_tree(&source, &dest)?;

        let dest = dest.canonicalize()?;
        log::info!("staged project at {}", dest.display());

        Ok(StagingResult { source, dest })
    }

    /// `<cache>/build/<project-id>/1.0.0/<platform>/<n>` with `n` one past
    /// the highest existing numeric entry.
    fn default_destination(&self, project_id: &str, platform: Platform) -> StageResult<PathBuf> {
        let base = self
            .cache_root
            .join("build")
            .join(project_id)
            .join(DEFAULT_PROJECT_VERSION)
            .join(platform.dir_name());
        fs::create_dir_all(&base)?;
        let dest = base.join(next_build_number(&base).to_string());
        fs::create_dir_all(&dest)?;
        Ok(dest)
    }
}

/// Next numeric build directory under `base`: max of existing numeric entry
/// names plus one. Non-numeric entries are ignored, not errors.
pub fn next_build_number(base: &Path) -> u32 {
    let mut next = 1;
    if let Ok(entries) = fs::read_dir(base) {
        for entry in entries.flatten() {
            if let Ok(n) = entry.file_name().to_string_lossy().parse::<u32>() {
                if n >= next {
                    next = n + 1;
                }
            }
        }
    }
    next
}

fn extract_archive(archive: &Path, target: &Path) -> StageResult<()> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|source| StageError::Archive {
        path: archive.to_path_buf(),
        source,
    })?;
    zip.extract(target).map_err(|source| StageError::Archive {
        path: archive.to_path_buf(),
        source,
    })?;
    log::info!(
        "extracted {} to {}",
        archive.display(),
        target.display()
    );
    Ok(())
}

/// Recursive copy of a directory tree
pub(crate) fn copy_tree(src: &Path, dest: &Path) -> StageResult<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| StageError::Io(e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths under its root");
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
