//! Build request model
//!
//! A [`BuildRequest`] is assembled once by the CLI (or a test) and treated as
//! immutable for the rest of the run. Platform-specific signing material is
//! carried in dedicated structs so the validators can report every missing
//! field at once.

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Target platform for a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Directory name of the native project inside an ejected tree
    pub fn dir_name(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    pub fn other(&self) -> Platform {
        match self {
            Platform::Android => Platform::Ios,
            Platform::Ios => Platform::Android,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Requested build flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Debug,
    #[default]
    Release,
    /// Android app bundle (.aab) release
    Bundle,
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildType::Debug => "debug",
            BuildType::Release => "release",
            BuildType::Bundle => "bundle",
        })
    }
}

impl BuildType {
    pub fn gradle_task(&self) -> &'static str {
        match self {
            BuildType::Debug => "assembleDebug",
            BuildType::Release => "assembleRelease",
            BuildType::Bundle => "bundleRelease",
        }
    }
}

/// Distribution category requested for an iOS build. The provisioning
/// profile's own embedded type decides the export method; this only selects
/// the code-signing identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Production,
    Development,
}

impl PackageType {
    /// Default signing identity for this package type
    pub fn default_identity(&self) -> &'static str {
        match self {
            PackageType::Production => "iPhone Distribution",
            PackageType::Development => "iPhone Developer",
        }
    }
}

/// Android signing material
#[derive(Debug, Clone, Default)]
pub struct AndroidSigning {
    pub keystore: Option<PathBuf>,
    pub store_password: Option<String>,
    pub key_alias: Option<String>,
    pub key_password: Option<String>,
}

/// iOS signing material
#[derive(Debug, Clone, Default)]
pub struct IosSigning {
    pub certificate: Option<PathBuf>,
    pub certificate_password: Option<String>,
    pub provisioning_file: Option<PathBuf>,
    pub package_type: Option<PackageType>,
    /// Explicit override for the code-signing identity string
    pub codesign_identity: Option<String>,
}

/// Validated input for one pipeline run
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub platform: Platform,
    /// Project source: a directory or a .zip archive
    pub source: PathBuf,
    /// Destination directory; derived from the build cache when unset
    pub dest: Option<PathBuf>,
    pub build_type: BuildType,
    /// Skip the interactive eject confirmation
    pub auto_eject: bool,
    pub android: AndroidSigning,
    pub ios: IosSigning,
    /// Replace the installed app runtime dependency with this local copy
    pub local_runtime: Option<PathBuf>,
}

impl BuildRequest {
    pub fn new(platform: Platform, source: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            source: source.into(),
            dest: None,
            build_type: BuildType::Release,
            auto_eject: false,
            android: AndroidSigning::default(),
            ios: IosSigning::default(),
            local_runtime: None,
        }
    }
}
