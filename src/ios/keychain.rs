//! Ephemeral signing keychain
//!
//! The signing certificate is imported into an isolated keychain created for
//! exactly one build and destroyed afterwards, whatever the build outcome.
//! The keychain search list is host-wide mutable state shared by every
//! `security` client on the machine, so the register/restore section is
//! serialized behind a process-wide mutex and the keychain name carries a
//! time-seeded unique token to avoid collisions with concurrent or stale
//! runs. The 3600-second auto-lock timeout is the backstop if cleanup never
//! runs: signing material does not stay unlocked indefinitely.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use ulid::Ulid;

use crate::exec::{ExecError, ToolRunner};

/// Serializes mutation of the host-wide keychain search list within this
/// process. Concurrent builds in separate processes must serialize
/// externally.
static SEARCH_LIST_LOCK: Mutex<()> = Mutex::new(());

/// Auto-lock timeout applied to the ephemeral keychain, in seconds
const KEYCHAIN_TIMEOUT_SECS: &str = "3600";

/// Tools granted access to the imported signing identity
const ACCESS_GRANTS: [&str; 4] = [
    "/usr/bin/codesign",
    "/usr/bin/productsign",
    "/usr/bin/productbuild",
    "/Applications/Xcode.app",
];

#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("keychain operation failed: {0}")]
    Exec(#[from] ExecError),
}

pub type KeychainResult<T> = Result<T, KeychainError>;

/// Scoped signing keychain holding an imported certificate for the duration
/// of one native build. Dropping the value restores the prior search list
/// and deletes the keychain; [`release`](Self::release) does the same but
/// surfaces cleanup errors.
pub struct EphemeralKeychain<'r> {
    runner: &'r dyn ToolRunner,
    name: String,
    /// Prior user search list; `None` until the list has actually been
    /// re-set, so cleanup never clobbers a list it did not touch.
    saved_search_list: Option<Vec<String>>,
    released: bool,
    _guard: MutexGuard<'static, ()>,
}

impl<'r> EphemeralKeychain<'r> {
    /// Create the keychain, unlock it, push it to the front of the user
    /// search list and import the certificate with code-signing access
    /// grants. The keychain exists as soon as `create-keychain` succeeds, so
    /// a failure in any later step tears it down (and restores the search
    /// list if it was already re-set) before surfacing its error.
    pub fn import(
        runner: &'r dyn ToolRunner,
        certificate: &Path,
        certificate_password: &str,
    ) -> KeychainResult<Self> {
        let guard = SEARCH_LIST_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let name = format!("rnbuild-{}.keychain", Ulid::new().to_string().to_lowercase());

        runner.run_checked("security", &["create-keychain", "-p", &name, &name], None)?;

        let mut keychain = Self {
            runner,
            name,
            saved_search_list: None,
            released: false,
            _guard: guard,
        };

        if let Err(e) = keychain.register_and_import(certificate, certificate_password) {
            keychain.released = true;
            if let Err(cleanup_err) = keychain.cleanup() {
                log::error!(
                    "failed to remove keychain {} after failed import: {}",
                    keychain.name,
                    cleanup_err
                );
            }
            return Err(e);
        }

        log::info!(
            "certificate at {} imported into {}",
            certificate.display(),
            keychain.name
        );

        Ok(keychain)
    }

    fn register_and_import(
        &mut self,
        certificate: &Path,
        certificate_password: &str,
    ) -> KeychainResult<()> {
        let name = self.name.clone();

        self.runner
            .run_checked("security", &["unlock-keychain", "-p", &name, &name], None)?;
        self.runner.run_checked(
            "security",
            &["set-keychain-settings", "-t", KEYCHAIN_TIMEOUT_SECS, &name],
            None,
        )?;

        let listing = self
            .runner
            .run_checked("security", &["list-keychains", "-d", "user"], None)?;
        let saved = parse_search_list(&listing.stdout);

        let mut set_args = vec!["list-keychains", "-d", "user", "-s", name.as_str()];
        set_args.extend(saved.iter().map(String::as_str));
        self.runner.run_checked("security", &set_args, None)?;
        self.saved_search_list = Some(saved);

        let cert = certificate.to_string_lossy();
        let mut import_args = vec![
            "import",
            cert.as_ref(),
            "-k",
            name.as_str(),
            "-P",
            certificate_password,
        ];
        for grant in ACCESS_GRANTS {
            import_args.push("-T");
            import_args.push(grant);
        }
        self.runner.run_checked("security", &import_args, None)?;

        // Pre-authorize the signing tools so xcodebuild does not block on a
        // keychain ACL prompt mid-build
        self.runner.run_checked(
            "security",
            &[
                "set-key-partition-list",
                "-S",
                "apple-tool:,apple:,codesign",
                "-s",
                "-k",
                &name,
                &name,
            ],
            None,
        )?;

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Restore the prior search list and delete the keychain, surfacing any
    /// cleanup failure. After this, `Drop` is a no-op.
    pub fn release(mut self) -> KeychainResult<()> {
        self.released = true;
        self.cleanup()
    }

    fn cleanup(&mut self) -> KeychainResult<()> {
        if let Some(saved) = &self.saved_search_list {
            let mut restore_args = vec!["list-keychains", "-d", "user", "-s"];
            restore_args.extend(saved.iter().map(String::as_str));
            self.runner.run_checked("security", &restore_args, None)?;
        }
        self.saved_search_list = None;
        self.runner
            .run_checked("security", &["delete-keychain", &self.name], None)?;
        log::info!("removed keychain {}", self.name);
        Ok(())
    }
}

impl Drop for EphemeralKeychain<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(e) = self.cleanup() {
                log::error!("failed to remove keychain {}: {}", self.name, e);
            }
        }
    }
}

/// `security list-keychains` prints one quoted, indented path per line.
fn parse_search_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim().trim_matches('"').to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedRunner;

    const SEARCH_LIST: &str =
        "    \"/Users/ci/Library/Keychains/login.keychain-db\"\n    \"/Library/Keychains/System.keychain\"\n";

    fn script_listing(runner: &ScriptedRunner) {
        runner.respond_matching("security", "-d", SEARCH_LIST);
    }

    #[test]
    fn parse_search_list_strips_quotes_and_indent() {
        let parsed = parse_search_list(SEARCH_LIST);
        assert_eq!(
            parsed,
            vec![
                "/Users/ci/Library/Keychains/login.keychain-db",
                "/Library/Keychains/System.keychain"
            ]
        );
    }

    #[test]
    fn import_registers_keychain_at_front_of_search_list() {
        let runner = ScriptedRunner::new();
        script_listing(&runner);

        let keychain =
            EphemeralKeychain::import(&runner, Path::new("/tmp/cert.p12"), "secret").unwrap();
        let name = keychain.name().to_string();
        assert!(name.starts_with("rnbuild-"));
        assert!(name.ends_with(".keychain"));

        let calls = runner.calls_to("security");
        assert!(calls.iter().any(|c| c.contains("create-keychain")));
        assert!(calls.iter().any(|c| c.contains("unlock-keychain")));
        assert!(calls.iter().any(|c| c.contains("set-keychain-settings -t 3600")));
        // New keychain goes first, prior list preserved behind it
        assert!(calls.iter().any(|c| c.contains(&format!(
            "list-keychains -d user -s {name} /Users/ci/Library/Keychains/login.keychain-db"
        ))));
        assert!(calls
            .iter()
            .any(|c| c.contains("import /tmp/cert.p12") && c.contains("-T /usr/bin/codesign")));
        assert!(calls.iter().any(|c| c.contains("set-key-partition-list")));

        keychain.release().unwrap();
    }

    #[test]
    fn drop_restores_search_list_and_deletes_keychain() {
        let runner = ScriptedRunner::new();
        script_listing(&runner);

        let name;
        {
            let keychain =
                EphemeralKeychain::import(&runner, Path::new("/tmp/cert.p12"), "secret").unwrap();
            name = keychain.name().to_string();
            // dropped here without release()
        }

        let calls = runner.calls_to("security");
        assert!(calls.iter().any(|c| c.contains(
            "list-keychains -d user -s /Users/ci/Library/Keychains/login.keychain-db /Library/Keychains/System.keychain"
        )));
        assert!(calls
            .iter()
            .any(|c| c.contains(&format!("delete-keychain {name}"))));
    }

    #[test]
    fn failed_import_restores_search_list_and_deletes_keychain() {
        let runner = ScriptedRunner::new();
        script_listing(&runner);
        runner.fail_matching("security", "import", "wrong passphrase");

        let err = EphemeralKeychain::import(&runner, Path::new("/tmp/cert.p12"), "wrong");
        assert!(err.is_err());

        let calls = runner.calls_to("security");
        // Search list was re-set before the failure, so it must be restored
        assert!(calls.iter().any(|c| c.contains(
            "list-keychains -d user -s /Users/ci/Library/Keychains/login.keychain-db /Library/Keychains/System.keychain"
        )));
        assert!(calls.iter().any(|c| c.contains("delete-keychain")));
    }

    #[test]
    fn failure_before_registration_deletes_without_touching_search_list() {
        let runner = ScriptedRunner::new();
        script_listing(&runner);
        runner.fail_matching("security", "unlock-keychain", "unlock failed");

        let err = EphemeralKeychain::import(&runner, Path::new("/tmp/cert.p12"), "pw");
        assert!(err.is_err());

        let calls = runner.calls_to("security");
        // The search list was never re-set, so no restore is issued
        assert!(!calls.iter().any(|c| c.contains("list-keychains -d user -s")));
        assert!(calls.iter().any(|c| c.contains("delete-keychain")));
    }

    #[test]
    fn names_are_unique_per_invocation() {
        let runner = ScriptedRunner::new();
        script_listing(&runner);

        let a = EphemeralKeychain::import(&runner, Path::new("/tmp/cert.p12"), "pw")
            .unwrap()
            .name()
            .to_string();
        let b = EphemeralKeychain::import(&runner, Path::new("/tmp/cert.p12"), "pw")
            .unwrap()
            .name()
            .to_string();
        assert_ne!(a, b);
    }
}
