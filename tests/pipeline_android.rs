//! End-to-end Android pipeline run against a scripted toolchain.
//!
//! The gradle invocation is scripted, so the artifact is pre-placed in the
//! source tree at the path gradle would write it; staging copies it into the
//! destination and the post-build scan finds it there.
//!
//! These tests set Android SDK environment variables, so they live in their
//! own test binary and run single-threaded against the process environment.

use std::fs;
use std::path::Path;

use rnbuild::exec::{CommandOutput, ExecResult, ToolRunner};
use rnbuild::mock::ScriptedRunner;
use rnbuild::prompt::FixedConfirmer;
use rnbuild::request::AndroidSigning;
use rnbuild::{BuildRequest, Pipeline, Platform};

/// Forwarder that lets a test keep inspecting the scripted runner after the
/// pipeline has taken ownership of its runner box.
struct Shared(&'static ScriptedRunner);

impl ToolRunner for Shared {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> ExecResult<CommandOutput> {
        self.0.run(program, args, cwd)
    }
}

fn write_project(root: &Path) {
    fs::write(
        root.join("rn_config.json"),
        r#"{
            "id": "com.example.app1",
            "name": "App One",
            "icon": {"src": "resources/icon.png"},
            "splash": {"src": "resources/splash.png"},
            "preferences": {"enable_hermes": false},
            "ejected": false
        }"#,
    )
    .unwrap();
    fs::write(
        root.join("app.json"),
        r#"{"expo": {"name": "placeholder"}}"#,
    )
    .unwrap();
    fs::write(
        root.join("package.json"),
        r#"{"name": "generated-app", "main": "node_modules/expo/AppEntry.js"}"#,
    )
    .unwrap();

    // Where gradle would leave the package
    let outputs = root.join("android/app/build/outputs/apk/release");
    fs::create_dir_all(&outputs).unwrap();
    fs::write(outputs.join("app-release.apk"), b"not a real apk").unwrap();
}

fn script_toolchain(runner: &ScriptedRunner) {
    runner.respond("node", "v16.14.0");
    runner.respond("java", "openjdk version \"11.0.2\"");
    runner.respond("yarn", "1.22.19");
    runner.respond("gradle", "Gradle 7.4");
    runner.respond("git", "git version 2.30.0");
    runner.respond("expo", "5.4.12");
}

fn signing(dir: &Path) -> AndroidSigning {
    let keystore = dir.join("release.keystore");
    fs::write(&keystore, b"jks").unwrap();
    AndroidSigning {
        keystore: Some(keystore),
        store_password: Some("storepw".to_string()),
        key_alias: Some("key0".to_string()),
        key_password: Some("keypw".to_string()),
    }
}

fn set_sdk_env() {
    // A path that exists for the whole test binary's lifetime; the tests in
    // this file share the process environment.
    let stable = std::env::temp_dir();
    std::env::set_var("ANDROID_SDK_ROOT", &stable);
    std::env::set_var("JAVA_HOME", &stable);
}

#[test]
fn full_android_release_run() {
    let cache = tempfile::tempdir().unwrap();
    let src = tempfile::tempdir().unwrap();
    write_project(src.path());
    set_sdk_env();

    let runner = Box::new(ScriptedRunner::new());
    script_toolchain(&runner);

    let pipeline = Pipeline::new()
        .with_runner(runner)
        .with_confirmer(Box::new(FixedConfirmer(true)))
        .with_cache_root(cache.path());

    let mut request = BuildRequest::new(Platform::Android, src.path());
    request.android = signing(cache.path());

    let result = pipeline.run(&request);
    assert!(result.success, "errors: {:?}", result.errors);

    // Artifact found inside the numbered destination under the build cache
    let artifact = result.output.expect("artifact path");
    let artifact_str = artifact.to_string_lossy().into_owned();
    assert!(artifact_str.contains("build/com.example.app1/1.0.0/android/1"));
    assert!(artifact_str.ends_with("app-release.apk"));
    assert_eq!(result.artifact_sha256.unwrap().len(), 64);

    // Eject is persisted in the staged copy, not the pristine source
    let staged_root = cache
        .path()
        .join("build/com.example.app1/1.0.0/android/1");
    let staged_meta = fs::read_to_string(staged_root.join("rn_config.json")).unwrap();
    assert!(staged_meta.contains("\"ejected\": true"));
    let source_meta = fs::read_to_string(src.path().join("rn_config.json")).unwrap();
    assert!(source_meta.contains("\"ejected\": false"));
}

#[test]
fn gradle_runs_with_signing_properties() {
    let cache = tempfile::tempdir().unwrap();
    let src = tempfile::tempdir().unwrap();
    write_project(src.path());
    set_sdk_env();

    let runner = Box::new(ScriptedRunner::new());
    script_toolchain(&runner);
    // Keep a handle on the recorded calls after the pipeline takes ownership
    let runner_ref: &'static ScriptedRunner = Box::leak(runner);

    let pipeline = Pipeline::new()
        .with_runner(Box::new(Shared(runner_ref)))
        .with_confirmer(Box::new(FixedConfirmer(true)))
        .with_cache_root(cache.path());

    let mut request = BuildRequest::new(Platform::Android, src.path());
    request.android = signing(cache.path());

    let result = pipeline.run(&request);
    assert!(result.success, "errors: {:?}", result.errors);

    let gradle_calls = runner_ref.calls_to("./gradlew");
    assert_eq!(gradle_calls.len(), 1);
    let call = &gradle_calls[0];
    assert!(call.contains("assembleRelease"));
    assert!(call.contains("-PRELEASE_STORE_PASSWORD=storepw"));
    assert!(call.contains("-PRELEASE_KEY_ALIAS=key0"));
    assert!(call.contains("-PRELEASE_KEY_PASSWORD=keypw"));
}

#[test]
fn already_ejected_project_skips_eject_tools() {
    let cache = tempfile::tempdir().unwrap();
    let src = tempfile::tempdir().unwrap();
    write_project(src.path());
    set_sdk_env();
    fs::write(
        src.path().join("rn_config.json"),
        r#"{"id": "com.example.app1", "name": "App One", "ejected": true}"#,
    )
    .unwrap();

    let runner = Box::new(ScriptedRunner::new());
    script_toolchain(&runner);
    let runner_ref: &'static ScriptedRunner = Box::leak(runner);

    let pipeline = Pipeline::new()
        .with_runner(Box::new(Shared(runner_ref)))
        .with_confirmer(Box::new(FixedConfirmer(true)))
        .with_cache_root(cache.path());

    let mut request = BuildRequest::new(Platform::Android, src.path());
    request.android = signing(cache.path());

    let result = pipeline.run(&request);
    assert!(result.success, "errors: {:?}", result.errors);

    let commands: Vec<String> = runner_ref
        .calls()
        .iter()
        .map(|c| c.command_line())
        .collect();
    assert!(!commands.contains(&"expo eject".to_string()));
    assert!(!commands.contains(&"yarn install".to_string()));
}

#[test]
fn zip_source_is_extracted_and_built() {
    let cache = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let unpacked = tempfile::tempdir().unwrap();
    write_project(unpacked.path());
    set_sdk_env();

    // Pack the project into a zip archive source
    let zip_path = work.path().join("app1.zip");
    let file = fs::File::create(&zip_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    use std::io::Write;
    for entry in walkdir::WalkDir::new(unpacked.path()) {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(unpacked.path()).unwrap();
        if rel.as_os_str().is_empty() {
            continue;
        }
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if entry.file_type().is_dir() {
            writer.add_directory(rel_str, options).unwrap();
        } else {
            writer.start_file(rel_str, options).unwrap();
            writer.write_all(&fs::read(entry.path()).unwrap()).unwrap();
        }
    }
    writer.finish().unwrap();

    let runner = Box::new(ScriptedRunner::new());
    script_toolchain(&runner);

    let pipeline = Pipeline::new()
        .with_runner(runner)
        .with_confirmer(Box::new(FixedConfirmer(true)))
        .with_cache_root(cache.path());

    let mut request = BuildRequest::new(Platform::Android, zip_path);
    request.android = signing(cache.path());

    let result = pipeline.run(&request);
    assert!(result.success, "errors: {:?}", result.errors);

    // Extraction went through the per-run temp area named after the archive,
    // and the run-scoped directory was removed after the successful build
    let temp_stem = cache.path().join("temp/app1");
    assert!(temp_stem.is_dir());
    assert_eq!(fs::read_dir(&temp_stem).unwrap().count(), 0);
}

#[test]
fn missing_signing_inputs_fail_before_gradle() {
    let cache = tempfile::tempdir().unwrap();
    let src = tempfile::tempdir().unwrap();
    write_project(src.path());
    set_sdk_env();

    let runner = Box::new(ScriptedRunner::new());
    script_toolchain(&runner);

    let pipeline = Pipeline::new()
        .with_runner(runner)
        .with_confirmer(Box::new(FixedConfirmer(true)))
        .with_cache_root(cache.path());

    // Release build with no signing material at all
    let request = BuildRequest::new(Platform::Android, src.path());
    let result = pipeline.run(&request);

    assert!(!result.success);
    // One entry per missing input
    assert_eq!(result.errors.len(), 4);
    assert!(result.errors.iter().any(|e| e.contains("keystore file")));
    assert!(result.errors.iter().any(|e| e.contains("keystore password")));
    assert!(result.errors.iter().any(|e| e.contains("key alias")));
    assert!(result.errors.iter().any(|e| e.contains("key password")));
}
