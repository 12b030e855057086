//! Build pipeline orchestrator
//!
//! Drives one build request through the full sequence: materialize the
//! source, load project metadata, stage into the destination, run the
//! one-time eject transformation if the project still needs it, prune the
//! other platform's theme assets, then hand off to the platform builder.
//! Every failure is folded into a [`BuildResult`]; the process-level exit
//! code is the caller's concern.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use ulid::Ulid;

use crate::android::{self, AndroidBuildError};
use crate::eject::{self, EjectError, EjectOptions};
use crate::exec::{SystemRunner, ToolRunner};
use crate::ios::{self, IosBuildError};
use crate::metadata::{self, MetadataError};
use crate::prompt::{Confirmer, StdinConfirmer};
use crate::request::{BuildRequest, Platform};
use crate::stage::{StageError, Stager};
use crate::theme;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("staging failed: {0}")]
    Stage(#[from] StageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("eject failed: {0}")]
    Eject(#[from] EjectError),

    #[error("project must be ejected before it can be built; eject was declined")]
    EjectDeclined,

    #[error("{0}")]
    Android(#[from] AndroidBuildError),

    #[error("{0}")]
    Ios(#[from] IosBuildError),

    #[error("pipeline I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Entries for the terminal result. Variants carrying several collected
    /// violations expand into one entry each so callers see every reason,
    /// not a single joined string.
    fn into_messages(self) -> Vec<String> {
        match self {
            PipelineError::Ios(IosBuildError::Invalid(errors))
            | PipelineError::Android(AndroidBuildError::Invalid(errors))
            | PipelineError::Android(AndroidBuildError::Environment(errors)) => errors,
            PipelineError::Ios(IosBuildError::Prerequisites(tools))
            | PipelineError::Android(AndroidBuildError::Prerequisites(tools))
            | PipelineError::Eject(EjectError::Prerequisites(tools)) => tools
                .into_iter()
                .map(|tool| format!("prerequisite not met: {tool}"))
                .collect(),
            other => vec![other.to_string()],
        }
    }
}

/// Outcome of one pipeline run, uniform across success and failure
#[derive(Debug, Serialize)]
pub struct BuildResult {
    pub success: bool,
    /// Path of the built artifact on success
    pub output: Option<PathBuf>,
    pub errors: Vec<String>,
    /// Hex digest of the artifact contents on success
    pub artifact_sha256: Option<String>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl BuildResult {
    fn success(artifact: PathBuf, sha256: String, started: Instant) -> Self {
        Self {
            success: true,
            output: Some(artifact),
            errors: Vec::new(),
            artifact_sha256: Some(sha256),
            duration_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        }
    }

    fn failure(error: PipelineError, started: Instant) -> Self {
        Self {
            success: false,
            output: None,
            errors: error.into_messages(),
            artifact_sha256: None,
            duration_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        }
    }
}

/// The pipeline with its injected collaborators. Defaults run real tools and
/// prompt on stdin; tests swap both seams.
pub struct Pipeline {
    runner: Box<dyn ToolRunner>,
    confirmer: Box<dyn Confirmer>,
    cache_root: PathBuf,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        let cache_root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rnbuild");
        Self {
            runner: Box::new(SystemRunner),
            confirmer: Box::new(StdinConfirmer),
            cache_root,
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_confirmer(mut self, confirmer: Box<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = cache_root.into();
        self
    }

    /// Run the request to completion, folding any error into the result.
    pub fn run(&self, request: &BuildRequest) -> BuildResult {
        let started = Instant::now();
        match self.execute(request) {
            Ok(artifact) => match digest_artifact(&artifact) {
                Ok(sha256) => {
                    log::info!("build succeeded: {}", artifact.display());
                    BuildResult::success(artifact, sha256, started)
                }
                Err(e) => BuildResult::failure(PipelineError::Io(e), started),
            },
            Err(e) => {
                log::error!("build failed: {e}");
                BuildResult::failure(e, started)
            }
        }
    }

    fn execute(&self, request: &BuildRequest) -> PipelineResult<PathBuf> {
        let run_id = Ulid::new().to_string().to_lowercase();
        log::info!("starting {} build (run {run_id})", request.platform);

        let stager = Stager::new(self.confirmer.as_ref(), &self.cache_root);
        let source = stager.materialize_source(&request.source, &run_id)?;

        let mut meta = metadata::read(&source.path)?;
        meta.normalize_asset_paths();

        if !meta.ejected && !request.auto_eject {
            let message = format!(
                "Project {} has not been ejected yet. Eject it now? This is a one-time, irreversible transformation.",
                meta.name
            );
            if !self.confirmer.confirm(&message) {
                return Err(PipelineError::EjectDeclined);
            }
        }

        let staged = stager.stage(
            &source.path,
            request.dest.as_deref(),
            &meta.id,
            request.platform,
        )?;

        if !meta.ejected {
            eject::eject(
                self.runner.as_ref(),
                &EjectOptions {
                    dest: &staged.dest,
                    metadata: &meta,
                    platform: request.platform,
                    local_runtime: request.local_runtime.as_deref(),
                },
            )?;
        } else {
            log::info!("project already ejected, skipping transformation");
        }

        fs::create_dir_all(staged.dest.join("output").join("logs"))?;

        theme::prune_platform_assets(&staged.dest, request.platform)?;

        let artifact = match request.platform {
            Platform::Android => android::build(
                self.runner.as_ref(),
                &staged.dest,
                &request.android,
                request.build_type,
            )?,
            Platform::Ios => ios::build(self.runner.as_ref(), &staged.dest, &request.ios)?,
        };

        let size = fs::metadata(&artifact)?.len();
        log::info!(
            "artifact {} ({:.2} MB)",
            artifact.display(),
            size as f64 / (1024.0 * 1024.0)
        );

        // Best-effort: the extracted archive copy is no longer needed
        if let Some(temp_dir) = &source.temp_dir {
            if let Err(e) = fs::remove_dir_all(temp_dir) {
                log::debug!(
                    "could not remove extraction dir {}: {}",
                    temp_dir.display(),
                    e
                );
            }
        }

        Ok(artifact)
    }
}

fn digest_artifact(path: &std::path::Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedRunner;
    use crate::prompt::FixedConfirmer;

    fn project_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("rn_config.json"),
            r#"{"id": "com.example.app1", "name": "App One", "ejected": false}"#,
        )
        .unwrap();
        fs::write(dir.path().join("app.json"), r#"{"expo": {}}"#).unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name": "app1"}"#).unwrap();
        dir
    }

    #[test]
    fn declined_eject_aborts_with_uniform_result() {
        let cache = tempfile::tempdir().unwrap();
        let src = project_fixture();

        let pipeline = Pipeline::new()
            .with_runner(Box::new(ScriptedRunner::new()))
            .with_confirmer(Box::new(FixedConfirmer(false)))
            .with_cache_root(cache.path());

        let request = BuildRequest::new(Platform::Android, src.path());
        let result = pipeline.run(&request);

        assert!(!result.success);
        assert!(result.output.is_none());
        assert!(result.artifact_sha256.is_none());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("declined"));
    }

    #[test]
    fn missing_metadata_is_reported_not_panicked() {
        let cache = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("index.js"), "export {};").unwrap();

        let pipeline = Pipeline::new()
            .with_runner(Box::new(ScriptedRunner::new()))
            .with_confirmer(Box::new(FixedConfirmer(true)))
            .with_cache_root(cache.path());

        let request = BuildRequest::new(Platform::Android, src.path());
        let result = pipeline.run(&request);

        assert!(!result.success);
        assert!(result.errors[0].contains("metadata"));
    }

    #[test]
    fn collected_violations_expand_into_distinct_entries() {
        let error = PipelineError::Ios(IosBuildError::Invalid(vec![
            "p12 certificate is required".to_string(),
            "password to unlock the certificate is required".to_string(),
            "provisioning file is required".to_string(),
            "package type is required".to_string(),
        ]));
        let result = BuildResult::failure(error, Instant::now());
        assert_eq!(result.errors.len(), 4);
        assert_eq!(result.errors[0], "p12 certificate is required");
    }

    #[test]
    fn prerequisite_failures_expand_per_tool() {
        let error = PipelineError::Android(AndroidBuildError::Prerequisites(vec![
            "java".to_string(),
            "node".to_string(),
        ]));
        let result = BuildResult::failure(error, Instant::now());
        assert_eq!(
            result.errors,
            vec![
                "prerequisite not met: java".to_string(),
                "prerequisite not met: node".to_string()
            ]
        );
    }

    #[test]
    fn digest_is_hex_of_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.apk");
        fs::write(&path, b"artifact bytes").unwrap();

        let digest = digest_artifact(&path).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
