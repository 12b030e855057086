//! iOS platform builder
//!
//! Drives xcodebuild from a staged, ejected project through to an exported
//! `.ipa`: input validation (all violations collected at once), provisioning
//! profile inspection, a plain release build followed by an archive build in
//! manual code-signing mode, an export-options patch of the archive's
//! `Info.plist`, and the final export. The whole native sequence runs inside
//! the ephemeral keychain scope; cleanup happens on every exit path.

mod keychain;
mod profile;

pub use keychain::{EphemeralKeychain, KeychainError};
pub use profile::{classify, extract_team_id, extract_uuid, ProfileError, ProfileKind};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::exec::{ExecError, ToolRunner};
use crate::prereq::Requirements;
use crate::request::IosSigning;

#[derive(Debug, Error)]
pub enum IosBuildError {
    #[error("invalid iOS build inputs: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("iOS build prerequisites not met: {}", .0.join(", "))]
    Prerequisites(Vec<String>),

    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("keychain error: {0}")]
    Keychain(#[from] KeychainError),

    #[error("xcodebuild failed: {0}")]
    Exec(#[from] ExecError),

    #[error("no Xcode workspace or project found under {0}")]
    ProjectNotFound(PathBuf),

    #[error("app manifest at {path} is missing {field}")]
    ManifestField { path: PathBuf, field: &'static str },

    #[error("archive properties file at {0} has no ApplicationProperties block")]
    ArchivePlistMarker(PathBuf),

    #[error("no .ipa produced under {0}")]
    ArtifactMissing(PathBuf),

    #[error("iOS build I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("app manifest unparsable: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IosResult<T> = Result<T, IosBuildError>;

/// Validate signing inputs, collecting every violation rather than stopping
/// at the first.
pub fn validate_inputs(signing: &IosSigning) -> Vec<String> {
    let mut errors = Vec::new();

    match &signing.certificate {
        Some(path) if path.exists() => {}
        Some(path) => errors.push(format!(
            "p12 certificate does not exist: {}",
            path.display()
        )),
        None => errors.push("p12 certificate is required".to_string()),
    }
    if signing
        .certificate_password
        .as_deref()
        .map_or(true, str::is_empty)
    {
        errors.push("password to unlock the certificate is required".to_string());
    }
    match &signing.provisioning_file {
        Some(path) if path.exists() => {}
        Some(path) => errors.push(format!(
            "provisioning file does not exist: {}",
            path.display()
        )),
        None => errors.push("provisioning file is required".to_string()),
    }
    if signing.package_type.is_none() {
        errors.push("package type is required".to_string());
    }

    errors
}

/// Signing inputs with presence already established
struct ValidatedSigning<'a> {
    certificate: &'a Path,
    password: &'a str,
    profile: &'a Path,
    package_type: crate::request::PackageType,
}

fn validate(signing: &IosSigning) -> IosResult<ValidatedSigning<'_>> {
    let errors = validate_inputs(signing);
    match (
        signing.certificate.as_deref(),
        signing.certificate_password.as_deref(),
        signing.provisioning_file.as_deref(),
        signing.package_type,
    ) {
        (Some(certificate), Some(password), Some(profile), Some(package_type))
            if errors.is_empty() =>
        {
            Ok(ValidatedSigning {
                certificate,
                password,
                profile,
                package_type,
            })
        }
        _ => Err(IosBuildError::Invalid(errors)),
    }
}

/// Build and export the signed app package. Returns the `.ipa` path.
pub fn build(runner: &dyn ToolRunner, dest: &Path, signing: &IosSigning) -> IosResult<PathBuf> {
    let ValidatedSigning {
        certificate,
        password,
        profile: profile_path,
        package_type,
    } = validate(signing)?;

    let report = Requirements::for_ios().check(runner);
    if !report.all_satisfied() {
        return Err(IosBuildError::Prerequisites(
            report.failures().iter().map(|s| s.to_string()).collect(),
        ));
    }

    let (app_name, bundle_id) = read_app_identity(dest)?;
    let ios_dir = dest.join("ios");

    patch_expo_plist(&ios_dir)?;
    runner.run_checked("pod", &["install"], Some(&ios_dir))?;

    let uuid = extract_uuid(profile_path)?;
    let team_id = extract_team_id(profile_path)?;
    let kind = classify(profile_path)?;
    log::info!("provisioning profile UUID: {uuid}");
    log::info!("development team: {team_id}");
    log::info!("export method: {}", kind.export_method());

    let identity = signing
        .codesign_identity
        .clone()
        .unwrap_or_else(|| package_type.default_identity().to_string());

    let keychain = EphemeralKeychain::import(runner, certificate, password)?;
    let outcome = run_native_build(runner, &ios_dir, &app_name, &bundle_id, &identity, &uuid, &team_id);
    let cleanup = keychain.release();

    let artifact = outcome?;
    cleanup?;
    Ok(artifact)
}

/// Release build, archive build, archive plist patch, export.
fn run_native_build(
    runner: &dyn ToolRunner,
    ios_dir: &Path,
    app_name: &str,
    bundle_id: &str,
    identity: &str,
    uuid: &str,
    team_id: &str,
) -> IosResult<PathBuf> {
    let workspace = format!("{app_name}.xcworkspace");
    let archive_path = format!("build/{app_name}.xcarchive");
    let identity_arg = format!("CODE_SIGN_IDENTITY={identity}");
    let profile_arg = format!("PROVISIONING_PROFILE={uuid}");
    let team_arg = format!("DEVELOPMENT_TEAM={team_id}");

    runner.run_checked(
        "xcodebuild",
        &[
            "-workspace",
            &workspace,
            "-scheme",
            app_name,
            "-configuration",
            "Release",
            &identity_arg,
            &profile_arg,
            &team_arg,
            "CODE_SIGN_STYLE=Manual",
        ],
        Some(ios_dir),
    )?;

    runner.run_checked(
        "xcodebuild",
        &[
            "-workspace",
            &workspace,
            "-scheme",
            app_name,
            "-configuration",
            "Release",
            "-archivePath",
            &archive_path,
            &identity_arg,
            &profile_arg,
            &team_arg,
            "archive",
            "CODE_SIGN_STYLE=Manual",
        ],
        Some(ios_dir),
    )?;

    let archive_plist = ios_dir.join(&archive_path).join("Info.plist");
    patch_archive_plist(&archive_plist, bundle_id, uuid)?;

    runner.run_checked(
        "xcodebuild",
        &[
            "-exportArchive",
            "-archivePath",
            &archive_path,
            "-exportOptionsPlist",
            &format!("{archive_path}/Info.plist"),
            "-exportPath",
            "build",
        ],
        Some(ios_dir),
    )?;

    find_ipa(&ios_dir.join("build"))
}

/// App display name and bundle identifier from the ejected manifest.
fn read_app_identity(dest: &Path) -> IosResult<(String, String)> {
    let path = dest.join("app.json");
    let data = fs::read_to_string(&path)?;
    let doc: serde_json::Value = serde_json::from_str(&data)?;

    let name = doc["expo"]["name"]
        .as_str()
        .ok_or(IosBuildError::ManifestField {
            path: path.clone(),
            field: "expo.name",
        })?
        .to_string();
    let bundle_id = doc["expo"]["ios"]["bundleIdentifier"]
        .as_str()
        .ok_or(IosBuildError::ManifestField {
            path,
            field: "expo.ios.bundleIdentifier",
        })?
        .to_string();
    Ok((name, bundle_id))
}

/// Point the updates URL at a placeholder so the ejected project does not
/// try to reach a live update service during the build. Structured
/// parse-modify-serialize; the file is a well-formed plist. Projects from
/// older templates have no Expo.plist and are skipped.
fn patch_expo_plist(ios_dir: &Path) -> IosResult<()> {
    let Some(project_name) = find_xcode_project_name(ios_dir) else {
        return Err(IosBuildError::ProjectNotFound(ios_dir.to_path_buf()));
    };
    let plist_path = ios_dir
        .join(&project_name)
        .join("Supporting")
        .join("Expo.plist");
    if !plist_path.exists() {
        log::debug!("no Expo.plist at {}, skipping", plist_path.display());
        return Ok(());
    }

    let mut value = plist::Value::from_file(&plist_path)?;
    if let Some(dict) = value.as_dictionary_mut() {
        dict.insert(
            "EXUpdatesURL".to_string(),
            plist::Value::String("https://updates.invalid".to_string()),
        );
    }
    value.to_file_xml(&plist_path)?;
    log::info!("updated {}", plist_path.display());
    Ok(())
}

/// Name of the Xcode workspace/project inside `ios/`.
fn find_xcode_project_name(ios_dir: &Path) -> Option<String> {
    let entries = fs::read_dir(ios_dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name
            .strip_suffix(".xcworkspace")
            .or_else(|| name.strip_suffix(".xcodeproj"))
        {
            return Some(stem.to_string());
        }
    }
    None
}

/// Splice `compileBitcode` and an explicit bundle-id to profile-UUID mapping
/// in front of the existing `ApplicationProperties` block. This is a textual
/// transform on purpose: the export step consumes this exact file as its
/// export options and the surrounding document structure must survive
/// byte-for-byte.
fn patch_archive_plist(path: &Path, bundle_id: &str, uuid: &str) -> IosResult<()> {
    const MARKER: &str = "<key>ApplicationProperties</key>";

    let content = fs::read_to_string(path)?;
    if !content.contains(MARKER) {
        return Err(IosBuildError::ArchivePlistMarker(path.to_path_buf()));
    }

    let insertion = format!(
        "<key>compileBitcode</key>\n\t<true/>\n\t<key>provisioningProfiles</key>\n\t<dict>\n\t\t<key>{bundle_id}</key>\n\t\t<string>{uuid}</string>\n\t</dict>\n\t{MARKER}"
    );
    let patched = content.replacen(MARKER, &insertion, 1);
    fs::write(path, patched)?;
    Ok(())
}

/// The exported package lands in the export path with a name derived from
/// the scheme; scan rather than guess.
fn find_ipa(build_dir: &Path) -> IosResult<PathBuf> {
    if let Ok(entries) = fs::read_dir(build_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "ipa") {
                return Ok(path);
            }
        }
    }
    Err(IosBuildError::ArtifactMissing(build_dir.to_path_buf()))
}
