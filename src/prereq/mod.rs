//! Prerequisite validation
//!
//! Checks that the external toolchain is present and recent enough before a
//! pipeline run commits to staging or ejecting anything. Each declared tool
//! is queried for its version through the [`ToolRunner`] seam, a version
//! token is extracted from the output, coerced into `major.minor.patch`
//! (missing segments are zero) and compared against the declared minimum.
//!
//! A failed check is fatal to the pipeline run but never to the process; the
//! orchestrator reports "prerequisites not met" and returns a result.

use std::collections::BTreeMap;
use std::path::Path;

use regex_lite::Regex;
use semver::Version;

use crate::exec::ToolRunner;
use crate::request::Platform;

/// Minimum node version for any build or eject
pub const NODE_MIN: &str = "12.0.0";
/// Minimum CocoaPods version for iOS builds
pub const POD_MIN: &str = "1.9.0";
/// Minimum Java for Android toolchains (gradle runs on 1.8)
pub const JAVA_MIN_ANDROID: &str = "1.8.0";
/// Minimum Java for iOS builds; the dependency install step pulls in
/// tooling that needs a modern JDK there
pub const JAVA_MIN_IOS: &str = "11.0.0";

/// One declared tool requirement
#[derive(Debug, Clone)]
pub struct ToolCheck {
    /// Key in the report, lower-case tool name
    pub name: String,
    pub program: String,
    pub version_args: Vec<String>,
    /// Minimum acceptable version; `None` means presence is enough
    pub min: Option<Version>,
}

impl ToolCheck {
    fn new(name: &str, min: Option<&str>) -> Self {
        Self::with_args(name, name, &["--version"], min)
    }

    fn with_args(name: &str, program: &str, args: &[&str], min: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            version_args: args.iter().map(|a| a.to_string()).collect(),
            min: min.map(|m| coerce_version(m).expect("valid built-in minimum")),
        }
    }
}

/// Detected state of one tool
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub detected: Option<Version>,
    pub satisfied: bool,
}

/// Per-tool outcome of a prerequisite run. Computed fresh for every pipeline
/// run; the environment may change between builds.
#[derive(Debug, Default)]
pub struct PrerequisiteReport {
    tools: BTreeMap<String, ToolStatus>,
}

impl PrerequisiteReport {
    pub fn all_satisfied(&self) -> bool {
        !self.tools.is_empty() && self.tools.values().all(|s| s.satisfied)
    }

    pub fn status(&self, name: &str) -> Option<&ToolStatus> {
        self.tools.get(name)
    }

    /// Names of tools that failed the check
    pub fn failures(&self) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|(_, s)| !s.satisfied)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// Declared tool set with minimum versions for one pipeline stage
#[derive(Debug, Clone)]
pub struct Requirements {
    checks: Vec<ToolCheck>,
}

impl Requirements {
    /// Tools needed before the eject transformation may run. Stricter than
    /// the per-platform build set: the scaffolding tool's eject step requires
    /// the destination to be a git repository, so git must be present.
    pub fn for_eject(platform: Platform) -> Self {
        let java_min = match platform {
            Platform::Android => JAVA_MIN_ANDROID,
            Platform::Ios => JAVA_MIN_IOS,
        };
        Self {
            checks: vec![
                ToolCheck::new("node", Some(NODE_MIN)),
                ToolCheck::with_args("java", "java", &["-version"], Some(java_min)),
                ToolCheck::new("yarn", None),
                ToolCheck::new("gradle", None),
                ToolCheck::new("git", None),
                ToolCheck::new("expo", None),
            ],
        }
    }

    /// Tools needed by the Android native build
    pub fn for_android() -> Self {
        Self {
            checks: vec![
                ToolCheck::new("node", Some(NODE_MIN)),
                ToolCheck::with_args("java", "java", &["-version"], Some(JAVA_MIN_ANDROID)),
                ToolCheck::new("gradle", None),
            ],
        }
    }

    /// Tools needed by the iOS native build
    pub fn for_ios() -> Self {
        Self {
            checks: vec![
                ToolCheck::new("node", Some(NODE_MIN)),
                ToolCheck::new("git", None),
                ToolCheck::new("pod", Some(POD_MIN)),
            ],
        }
    }

    /// Override the minimum version for one tool in this table
    pub fn with_min(mut self, name: &str, min: &str) -> Self {
        if let Some(check) = self.checks.iter_mut().find(|c| c.name == name) {
            check.min = coerce_version(min);
        }
        self
    }

    /// Run every declared check through the runner
    pub fn check(&self, runner: &dyn ToolRunner) -> PrerequisiteReport {
        let mut report = PrerequisiteReport::default();
        for check in &self.checks {
            let status = check_tool(runner, check);
            report.tools.insert(check.name.clone(), status);
        }
        report
    }
}

fn check_tool(runner: &dyn ToolRunner, check: &ToolCheck) -> ToolStatus {
    let args: Vec<&str> = check.version_args.iter().map(String::as_str).collect();
    let output = match runner.run(&check.program, &args, None) {
        Ok(out) => out,
        Err(e) => {
            log::error!("{} is not available: {}", check.name, e);
            return ToolStatus {
                detected: None,
                satisfied: false,
            };
        }
    };

    let Some(version) = extract_version(&output.combined()) else {
        log::error!(
            "could not determine {} version from its output",
            check.name
        );
        return ToolStatus {
            detected: None,
            satisfied: false,
        };
    };

    log::info!("{} version available is {}", check.name, version);

    let satisfied = match &check.min {
        Some(min) if version < *min => {
            log::error!(
                "minimum {} version required is {}, found {}",
                check.name,
                min,
                version
            );
            false
        }
        _ => true,
    };

    ToolStatus {
        detected: Some(version),
        satisfied,
    }
}

/// Pull the first `x.y[.z...]` token out of a tool's version banner and
/// coerce it. Handles banners like `v16.14.0`, `Gradle 7.4`, and
/// `java version "1.8.0_292"`.
pub fn extract_version(output: &str) -> Option<Version> {
    let re = Regex::new(r"[0-9]+\.[0-9][0-9.]*").expect("static pattern");
    let token = re.find(output)?.as_str();
    coerce_version(token)
}

/// Coerce a loose version token into a full semver triple. Missing segments
/// are treated as zero; extra segments are dropped.
pub fn coerce_version(token: &str) -> Option<Version> {
    let mut parts = token
        .split('.')
        .map(|p| {
            p.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
        })
        .take(3)
        .collect::<Vec<_>>();
    if parts.is_empty() || parts[0].is_empty() {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0".to_string());
    }
    let nums: Vec<u64> = parts.iter().filter_map(|p| p.parse().ok()).collect();
    if nums.len() != 3 {
        return None;
    }
    Some(Version::new(nums[0], nums[1], nums[2]))
}

/// Validate the Android SDK environment. Returns every violation found.
///
/// `ANDROID_SDK_ROOT` is preferred; a bare `ANDROID_HOME` still works but
/// gets a deprecation warning. The variable must point at an existing path.
pub fn check_android_env() -> Vec<String> {
    let mut errors = Vec::new();

    let sdk_root = std::env::var("ANDROID_SDK_ROOT").ok();
    let android_home = std::env::var("ANDROID_HOME").ok();

    if android_home.is_some() && sdk_root.is_none() {
        log::warn!("ANDROID_HOME is deprecated; set ANDROID_SDK_ROOT instead");
    }

    match sdk_root.or(android_home) {
        None => {
            errors.push(
                "ANDROID_SDK_ROOT environment variable is not set; point it at a valid SDK directory"
                    .to_string(),
            );
        }
        Some(path) if !Path::new(&path).exists() => {
            errors.push(format!(
                "Android SDK environment variable points at a non-existent path: {path}"
            ));
        }
        Some(_) => {}
    }

    match std::env::var("JAVA_HOME").ok() {
        None => errors.push("JAVA_HOME environment variable is not set".to_string()),
        Some(path) if !Path::new(&path).exists() => {
            errors.push(format!(
                "JAVA_HOME points at a non-existent path: {path}"
            ));
        }
        Some(_) => {}
    }

    errors
}
