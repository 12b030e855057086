//! Android platform builder
//!
//! Runs the Gradle wrapper inside the staged project and locates the
//! resulting `.apk` or `.aab`. Release and bundle builds need complete
//! signing inputs; debug builds sign with the SDK debug key and skip that
//! validation entirely. Environment checks mirror what Gradle itself will
//! fail on, surfaced up front with actionable messages instead of deep in
//! the native build log.

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::exec::{ExecError, ToolRunner};
use crate::prereq::{self, Requirements};
use crate::request::{AndroidSigning, BuildType};

#[derive(Debug, Error)]
pub enum AndroidBuildError {
    #[error("invalid Android build inputs: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Android environment not ready: {}", .0.join("; "))]
    Environment(Vec<String>),

    #[error("Android build prerequisites not met: {}", .0.join(", "))]
    Prerequisites(Vec<String>),

    #[error("gradle build failed: {0}")]
    Exec(#[from] ExecError),

    #[error("no .apk or .aab produced under {0}")]
    ArtifactMissing(PathBuf),
}

pub type AndroidResult<T> = Result<T, AndroidBuildError>;

/// Validate signing inputs for a release or bundle build, collecting every
/// violation. Debug builds always pass.
pub fn validate_inputs(signing: &AndroidSigning, build_type: BuildType) -> Vec<String> {
    if build_type == BuildType::Debug {
        return Vec::new();
    }

    let mut errors = Vec::new();
    match &signing.keystore {
        Some(path) if path.is_file() => {}
        Some(path) => errors.push(format!("keystore is not a valid file: {}", path.display())),
        None => errors.push("keystore file is required for signed builds".to_string()),
    }
    if signing.store_password.as_deref().map_or(true, str::is_empty) {
        errors.push("keystore password is required".to_string());
    }
    if signing.key_alias.as_deref().map_or(true, str::is_empty) {
        errors.push("key alias is required".to_string());
    }
    if signing.key_password.as_deref().map_or(true, str::is_empty) {
        errors.push("key password is required".to_string());
    }
    errors
}

/// Run the Gradle build and return the produced artifact path.
pub fn build(
    runner: &dyn ToolRunner,
    dest: &Path,
    signing: &AndroidSigning,
    build_type: BuildType,
) -> AndroidResult<PathBuf> {
    let errors = validate_inputs(signing, build_type);
    if !errors.is_empty() {
        return Err(AndroidBuildError::Invalid(errors));
    }

    let env_errors = prereq::check_android_env();
    if !env_errors.is_empty() {
        return Err(AndroidBuildError::Environment(env_errors));
    }

    let report = Requirements::for_android().check(runner);
    if !report.all_satisfied() {
        return Err(AndroidBuildError::Prerequisites(
            report.failures().iter().map(|s| s.to_string()).collect(),
        ));
    }

    let android_dir = dest.join("android");
    let task = build_type.gradle_task();

    let mut args: Vec<String> = vec![task.to_string()];
    if build_type != BuildType::Debug {
        // Validation guarantees the signing fields are present here
        if let (Some(keystore), Some(store_pw), Some(alias), Some(key_pw)) = (
            &signing.keystore,
            &signing.store_password,
            &signing.key_alias,
            &signing.key_password,
        ) {
            args.push(format!("-PRELEASE_STORE_FILE={}", keystore.display()));
            args.push(format!("-PRELEASE_STORE_PASSWORD={store_pw}"));
            args.push(format!("-PRELEASE_KEY_ALIAS={alias}"));
            args.push(format!("-PRELEASE_KEY_PASSWORD={key_pw}"));
        }
    }
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    log::info!("running gradle task {task}");
    runner.run_checked("./gradlew", &arg_refs, Some(&android_dir))?;

    find_artifact(&android_dir)
}

/// Scan the Gradle output tree for the built package. Bundle builds emit
/// `.aab`, everything else `.apk`; either counts.
fn find_artifact(android_dir: &Path) -> AndroidResult<PathBuf> {
    let outputs = android_dir.join("app").join("build").join("outputs");
    for entry in WalkDir::new(&outputs).into_iter().flatten() {
        let path = entry.path();
        if path
            .extension()
            .is_some_and(|e| e == "apk" || e == "aab")
        {
            return Ok(path.to_path_buf());
        }
    }
    Err(AndroidBuildError::ArtifactMissing(outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn release_validation_collects_every_violation() {
        let errors = validate_inputs(&AndroidSigning::default(), BuildType::Release);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("keystore file")));
        assert!(errors.iter().any(|e| e.contains("keystore password")));
        assert!(errors.iter().any(|e| e.contains("key alias")));
        assert!(errors.iter().any(|e| e.contains("key password")));
    }

    #[test]
    fn debug_builds_skip_signing_validation() {
        assert!(validate_inputs(&AndroidSigning::default(), BuildType::Debug).is_empty());
    }

    #[test]
    fn keystore_must_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let signing = AndroidSigning {
            keystore: Some(dir.path().to_path_buf()),
            store_password: Some("store".to_string()),
            key_alias: Some("key0".to_string()),
            key_password: Some("key".to_string()),
        };
        let errors = validate_inputs(&signing, BuildType::Bundle);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not a valid file"));
    }

    #[test]
    fn complete_release_inputs_pass() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = dir.path().join("release.keystore");
        fs::write(&keystore, b"jks").unwrap();

        let signing = AndroidSigning {
            keystore: Some(keystore),
            store_password: Some("store".to_string()),
            key_alias: Some("key0".to_string()),
            key_password: Some("key".to_string()),
        };
        assert!(validate_inputs(&signing, BuildType::Release).is_empty());
    }

    #[test]
    fn artifact_scan_finds_nested_apk() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir
            .path()
            .join("app/build/outputs/apk/release");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("app-release.apk"), b"pk").unwrap();

        let found = find_artifact(dir.path()).unwrap();
        assert!(found.ends_with("app-release.apk"));
    }

    #[test]
    fn missing_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_artifact(dir.path()),
            Err(AndroidBuildError::ArtifactMissing(_))
        ));
    }
}
