//! Provisioning profile inspection
//!
//! A `.mobileprovision` file is a CMS-wrapped plist; the fields the pipeline
//! needs (profile UUID, team identifier, distribution scope) sit in the
//! embedded XML and are pulled out by pattern extraction rather than full
//! CMS parsing, the same way the signing tools themselves grep for them.

use std::fs;
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("provisioning profile unreadable at {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no UUID found in provisioning profile {0}")]
    UuidNotFound(PathBuf),

    #[error("no team identifier found in provisioning profile {0}")]
    TeamIdNotFound(PathBuf),

    #[error("unable to determine the distribution type of provisioning profile {0}")]
    UnrecognizedType(PathBuf),
}

pub type ProfileResult<T> = Result<T, ProfileError>;

/// Distribution scope embedded in a provisioning profile. Decides the export
/// method label used when packaging the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    AppStore,
    /// In-house distribution: provisions all devices of the team
    Enterprise,
    /// Explicit device list without development entitlements
    AdHoc,
}

impl ProfileKind {
    pub fn export_method(&self) -> &'static str {
        match self {
            ProfileKind::AppStore => "app-store",
            ProfileKind::Enterprise => "enterprise",
            ProfileKind::AdHoc => "ad-hoc",
        }
    }
}

fn read_lossy(path: &Path) -> ProfileResult<String> {
    let bytes = fs::read(path).map_err(|source| ProfileError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Extract the profile's unique identifier: the 36-character UUID-shaped
/// token following the `UUID` key.
pub fn extract_uuid(path: &Path) -> ProfileResult<String> {
    let content = read_lossy(path)?;
    let after_label = content
        .find("<key>UUID</key>")
        .map(|i| &content[i..])
        .ok_or_else(|| ProfileError::UuidNotFound(path.to_path_buf()))?;

    let re = Regex::new(r"[0-9A-Fa-f-]{36}").expect("static pattern");
    re.find(after_label)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ProfileError::UuidNotFound(path.to_path_buf()))
}

/// Extract the team identifier: the capitalized alphanumeric token following
/// the `TeamIdentifier` key.
pub fn extract_team_id(path: &Path) -> ProfileResult<String> {
    let content = read_lossy(path)?;
    let after_label = content
        .find("<key>TeamIdentifier</key>")
        .map(|i| &content[i..])
        .ok_or_else(|| ProfileError::TeamIdNotFound(path.to_path_buf()))?;

    let re = Regex::new(r"<string>([A-Z0-9]+)</string>").expect("static pattern");
    re.captures(after_label)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ProfileError::TeamIdNotFound(path.to_path_buf()))
}

/// Classify the profile's distribution scope. An unrecognized payload is a
/// fatal classification error, not a silent default.
pub fn classify(path: &Path) -> ProfileResult<ProfileKind> {
    let content = read_lossy(path)?;

    if content.contains("<key>ProvisionsAllDevices</key>") {
        return Ok(ProfileKind::Enterprise);
    }
    if content.contains("<key>ProvisionedDevices</key>") {
        return Ok(ProfileKind::AdHoc);
    }
    if content.contains("<key>UUID</key>") {
        return Ok(ProfileKind::AppStore);
    }
    Err(ProfileError::UnrecognizedType(path.to_path_buf()))
}
