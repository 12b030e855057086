//! rnbuild: build orchestration for generated React Native projects
//!
//! Takes a generated project (a directory or a zip archive), stages it into
//! a per-user build cache, runs the one-time eject transformation when the
//! project still needs it, and drives the platform toolchain to a signed
//! `.apk`, `.aab` or `.ipa`. All external tools run through the
//! [`exec::ToolRunner`] seam; [`mock::ScriptedRunner`] substitutes them in
//! tests.

pub mod android;
pub mod eject;
pub mod exec;
pub mod ios;
pub mod metadata;
pub mod mock;
pub mod pipeline;
pub mod prereq;
pub mod prompt;
pub mod request;
pub mod stage;
pub mod theme;

pub use pipeline::{BuildResult, Pipeline, PipelineError};
pub use request::{BuildRequest, BuildType, PackageType, Platform};
