//! Project metadata store
//!
//! A generated project carries a fixed-name `rn_config.json` at its root
//! describing the app identity and whether the one-time eject transformation
//! has already run. The file is the single durable signal gating eject, so
//! writes go through a shallow merge and a temp-file rename: a crash mid-write
//! never leaves malformed JSON behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Fixed name of the metadata file at the project root
pub const METADATA_FILE: &str = "rn_config.json";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("project metadata not found at {0}")]
    NotFound(PathBuf),

    #[error("project metadata at {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project metadata at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to persist project metadata: {0}")]
    Write(#[from] std::io::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Reference to an asset file inside the project tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetRef {
    #[serde(default)]
    pub src: String,
}

/// Per-project preference flags written by the generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    /// JS engine selection: hermes when true, jsc otherwise
    #[serde(default)]
    pub enable_hermes: bool,
}

/// Persisted record describing project identity and eject state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: AssetRef,
    #[serde(default)]
    pub splash: AssetRef,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub ejected: bool,
}

impl ProjectMetadata {
    pub fn js_engine(&self) -> &'static str {
        if self.preferences.enable_hermes {
            "hermes"
        } else {
            "jsc"
        }
    }

    /// Rewrite icon and splash references under the `assets/` root. Run once
    /// per pipeline, before the manifest rewrite.
    pub fn normalize_asset_paths(&mut self) {
        self.icon.src = normalize_asset_path(&self.icon.src);
        self.splash.src = normalize_asset_path(&self.splash.src);
    }
}

/// Asset references rooted at a bare `resources` prefix are re-rooted under
/// `assets`; everything else passes through unchanged.
pub fn normalize_asset_path(src: &str) -> String {
    if src.starts_with("resources/") || src == "resources" {
        format!("assets/{src}")
    } else {
        src.to_string()
    }
}

fn metadata_path(project_root: &Path) -> PathBuf {
    project_root.join(METADATA_FILE)
}

/// Read and parse the metadata file. Absent or malformed metadata is fatal
/// to the pipeline run.
pub fn read(project_root: &Path) -> MetadataResult<ProjectMetadata> {
    let path = metadata_path(project_root);
    if !path.exists() {
        return Err(MetadataError::NotFound(path));
    }
    let data = fs::read_to_string(&path).map_err(|source| MetadataError::Unreadable {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| MetadataError::Malformed { path, source })
}

/// Merge the given top-level fields into the existing metadata document and
/// persist it. Provided keys overwrite, everything else is preserved,
/// including fields this tool does not model.
pub fn write_patch(project_root: &Path, patch: Value) -> MetadataResult<()> {
    let path = metadata_path(project_root);
    if !path.exists() {
        return Err(MetadataError::NotFound(path));
    }
    let data = fs::read_to_string(&path).map_err(|source| MetadataError::Unreadable {
        path: path.clone(),
        source,
    })?;
    let mut doc: Value =
        serde_json::from_str(&data).map_err(|source| MetadataError::Malformed {
            path: path.clone(),
            source,
        })?;

    if let (Value::Object(base), Value::Object(overlay)) = (&mut doc, patch) {
        for (key, value) in overlay {
            base.insert(key, value);
        }
    }

    write_json_atomic(&path, &doc)?;
    log::info!("updated {}", path.display());
    Ok(())
}

/// Serialize to a sibling temp file, then rename over the target.
fn write_json_atomic(path: &Path, doc: &Value) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(doc)?)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_metadata() -> Value {
        json!({
            "id": "com.example.app1",
            "name": "App One",
            "icon": {"src": "resources/icon.png"},
            "splash": {"src": "assets/splash.png"},
            "preferences": {"enable_hermes": true},
            "ejected": false,
            "generator_version": "11.2.0"
        })
    }

    #[test]
    fn normalize_reroots_bare_resources() {
        assert_eq!(
            normalize_asset_path("resources/icon.png"),
            "assets/resources/icon.png"
        );
        assert_eq!(normalize_asset_path("assets/icon.png"), "assets/icon.png");
        assert_eq!(normalize_asset_path("other/icon.png"), "other/icon.png");
    }

    #[test]
    fn normalize_asset_paths_touches_both_refs() {
        let mut meta = ProjectMetadata {
            icon: AssetRef {
                src: "resources/icon.png".to_string(),
            },
            splash: AssetRef {
                src: "assets/splash.png".to_string(),
            },
            ..Default::default()
        };
        meta.normalize_asset_paths();
        assert_eq!(meta.icon.src, "assets/resources/icon.png");
        assert_eq!(meta.splash.src, "assets/splash.png");
    }

    #[test]
    fn read_parses_fixed_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(METADATA_FILE),
            sample_metadata().to_string(),
        )
        .unwrap();

        let meta = read(dir.path()).unwrap();
        assert_eq!(meta.id, "com.example.app1");
        assert_eq!(meta.name, "App One");
        assert_eq!(meta.js_engine(), "hermes");
        assert!(!meta.ejected);
    }

    #[test]
    fn read_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read(dir.path()), Err(MetadataError::NotFound(_))));
    }

    #[test]
    fn read_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(METADATA_FILE), "{not json").unwrap();
        assert!(matches!(
            read(dir.path()),
            Err(MetadataError::Malformed { .. })
        ));
    }

    #[test]
    fn write_patch_preserves_unmodeled_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(METADATA_FILE),
            sample_metadata().to_string(),
        )
        .unwrap();

        write_patch(dir.path(), json!({"ejected": true})).unwrap();

        let doc: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap())
                .unwrap();
        assert_eq!(doc["ejected"], true);
        assert_eq!(doc["id"], "com.example.app1");
        // Field unknown to ProjectMetadata survives the merge
        assert_eq!(doc["generator_version"], "11.2.0");
    }

    #[test]
    fn write_patch_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(METADATA_FILE),
            sample_metadata().to_string(),
        )
        .unwrap();

        write_patch(dir.path(), json!({"ejected": true})).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![METADATA_FILE.to_string()]);
    }
}
