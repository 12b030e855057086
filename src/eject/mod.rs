//! Eject transformation
//!
//! The one-time, irreversible conversion of a templated project into a
//! platform-buildable native project: inject the app identity into the
//! manifest, pin the package entry point, install dependencies, initialize a
//! git repository (the scaffolding tool refuses to eject outside one) and run
//! the scaffolding eject itself. The persisted `ejected` flag is only set
//! after every step succeeded, so a failed eject is retried from scratch on
//! the next pipeline run.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;

use crate::exec::{ExecError, ToolRunner};
use crate::metadata::{self, MetadataError, ProjectMetadata};
use crate::prereq::Requirements;
use crate::request::Platform;
use crate::stage;

/// Installed location of the app runtime dependency replaced by a local
/// override
pub const RUNTIME_DEP_DIR: &str = "node_modules/@rnbuild/app-runtime";

#[derive(Debug, Error)]
pub enum EjectError {
    #[error("eject prerequisites not met: {}", .0.join(", "))]
    Prerequisites(Vec<String>),

    #[error("project manifest missing at {0}")]
    ManifestMissing(PathBuf),

    #[error("project manifest at {path} is malformed: {source}")]
    ManifestMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("tool invocation failed: {0}")]
    Exec(#[from] ExecError),

    #[error("manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("eject I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("staging error during runtime override: {0}")]
    RuntimeOverride(#[from] stage::StageError),
}

pub type EjectResult<T> = Result<T, EjectError>;

/// Inputs for one eject run
pub struct EjectOptions<'a> {
    pub dest: &'a Path,
    /// Metadata with asset paths already normalized
    pub metadata: &'a ProjectMetadata,
    pub platform: Platform,
    pub local_runtime: Option<&'a Path>,
}

/// Run the full eject sequence against the staged destination. Any step's
/// failure aborts the whole eject; the `ejected` flag stays false so the
/// next pipeline run re-attempts from the top.
pub fn eject(runner: &dyn ToolRunner, opts: &EjectOptions<'_>) -> EjectResult<()> {
    let report = Requirements::for_eject(opts.platform).check(runner);
    if !report.all_satisfied() {
        return Err(EjectError::Prerequisites(
            report.failures().iter().map(|s| s.to_string()).collect(),
        ));
    }

    update_app_manifest(opts.dest, opts.metadata)?;
    update_package_descriptor(opts.dest)?;

    runner.run_checked("yarn", &["install"], Some(opts.dest))?;
    log::info!("installed project dependencies");

    if let Some(local_runtime) = opts.local_runtime {
        replace_runtime_dependency(opts.dest, local_runtime)?;
    }

    // The scaffolding eject checks that the destination is a git repository
    runner.run_checked("git", &["init"], Some(opts.dest))?;

    log::info!("invoking expo eject");
    runner.run_checked("expo", &["eject"], Some(opts.dest))?;
    log::info!("expo eject succeeded");

    metadata::write_patch(opts.dest, json!({"ejected": true}))?;
    Ok(())
}

/// Inject the app identity into `app.json`: display name, slug, per-platform
/// bundle identifiers, JS engine selection, and normalized asset references.
fn update_app_manifest(dest: &Path, meta: &ProjectMetadata) -> EjectResult<()> {
    let path = dest.join("app.json");
    if !path.exists() {
        return Err(EjectError::ManifestMissing(path));
    }
    let data = fs::read_to_string(&path)?;
    let mut doc: Value =
        serde_json::from_str(&data).map_err(|source| EjectError::ManifestMalformed {
            path: path.clone(),
            source,
        })?;

    {
        let expo = ensure_object(&mut doc, "expo");
        expo.insert("name".to_string(), json!(meta.name));
        expo.insert("slug".to_string(), json!(meta.name));
        expo.insert("jsEngine".to_string(), json!(meta.js_engine()));
        expo.insert("icon".to_string(), json!(meta.icon.src));
    }
    {
        let expo = ensure_object(&mut doc, "expo");
        let splash = ensure_object_in(expo, "splash");
        splash.insert("image".to_string(), json!(meta.splash.src));
    }
    {
        let expo = ensure_object(&mut doc, "expo");
        let android = ensure_object_in(expo, "android");
        android.insert("package".to_string(), json!(meta.id));
        let adaptive = ensure_object_in(android, "adaptiveIcon");
        adaptive.insert("foregroundImage".to_string(), json!(meta.icon.src));
    }
    {
        let expo = ensure_object(&mut doc, "expo");
        let ios = ensure_object_in(expo, "ios");
        ios.insert("bundleIdentifier".to_string(), json!(meta.id));
    }

    fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    log::info!("updated app.json");
    Ok(())
}

/// Pin the package descriptor's entry point so the ejected project resolves
/// the generated `index` module.
fn update_package_descriptor(dest: &Path) -> EjectResult<()> {
    let path = dest.join("package.json");
    if !path.exists() {
        return Err(EjectError::ManifestMissing(path));
    }
    let data = fs::read_to_string(&path)?;
    let mut doc: Value =
        serde_json::from_str(&data).map_err(|source| EjectError::ManifestMalformed {
            path: path.clone(),
            source,
        })?;

    if let Value::Object(map) = &mut doc {
        map.insert("main".to_string(), json!("index"));
    }

    fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    log::info!("updated package.json");
    Ok(())
}

/// Replace the installed runtime dependency with a full copy of the local
/// override: remove the existing tree first, then copy.
fn replace_runtime_dependency(dest: &Path, local_runtime: &Path) -> EjectResult<()> {
    let target = dest.join(RUNTIME_DEP_DIR);
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    fs::create_dir_all(&target)?;
    stage::copy_tree(local_runtime, &target)?;
    log::info!("copied local app runtime into {}", RUNTIME_DEP_DIR);
    Ok(())
}

fn ensure_object<'v>(doc: &'v mut Value, key: &str) -> &'v mut serde_json::Map<String, Value> {
    if !doc.is_object() {
        *doc = Value::Object(Default::default());
    }
    let map = doc.as_object_mut().expect("just ensured object");
    ensure_object_in(map, key)
}

fn ensure_object_in<'v>(
    map: &'v mut serde_json::Map<String, Value>,
    key: &str,
) -> &'v mut serde_json::Map<String, Value> {
    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Default::default()));
    if !entry.is_object() {
        *entry = Value::Object(Default::default());
    }
    entry.as_object_mut().expect("just ensured object")
}
