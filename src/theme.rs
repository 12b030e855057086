//! Platform theme pruning
//!
//! Generated projects ship theme sources for both platforms; the two
//! generated theme entry files each import the other platform's variables
//! module. Before the native compile, the import line referencing the other
//! platform is stripped and that platform's theme subdirectory is deleted.
//! Runs exactly once per build, after eject (the files only exist then) and
//! before the native build step. Missing files are skipped: a project built
//! from an older generator simply has nothing to prune.

use std::fs;
use std::path::Path;

use crate::request::Platform;

/// Generated theme entry files carrying per-platform imports
pub const THEME_FILES: [&str; 2] = ["theme/app.theme.js", "theme/app.variables.js"];

/// Strip the other platform's theme sources from the staged project.
pub fn prune_platform_assets(dest: &Path, platform: Platform) -> std::io::Result<()> {
    let other = platform.other();

    for rel in THEME_FILES {
        let path = dest.join(rel);
        if !path.exists() {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        let kept: Vec<&str> = content
            .lines()
            .filter(|line| !references_platform(line, other))
            .collect();
        let mut out = kept.join("\n");
        if content.ends_with('\n') {
            out.push('\n');
        }
        fs::write(&path, out)?;
        log::info!("removed {} theme import from {}", other, rel);
    }

    let other_dir = dest.join("theme").join(other.dir_name());
    if other_dir.exists() {
        fs::remove_dir_all(&other_dir)?;
        log::info!("removed {} theme assets", other);
    }

    Ok(())
}

/// A line references a platform when it imports from that platform's theme
/// subdirectory or names its variables module.
fn references_platform(line: &str, platform: Platform) -> bool {
    let dir = format!("theme/{}", platform.dir_name());
    let module = format!("{}.variables", platform.dir_name());
    line.contains(&dir) || line.contains(&module)
}
