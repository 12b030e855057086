//! Interactive yes/no confirmation seam
//!
//! The pipeline needs two confirmations: clearing a non-empty destination and
//! proceeding with the irreversible eject. Both go through [`Confirmer`] so
//! non-interactive runs and tests can answer without a terminal.

use std::io::{self, BufRead, Write};

/// Answers a yes/no question
pub trait Confirmer {
    fn confirm(&self, message: &str) -> bool;
}

/// Reads `y`/`yes` (case-insensitive) from stdin; anything else is a decline.
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, message: &str) -> bool {
        eprint!("{} (yes/no) ", message);
        let _ = io::stderr().flush();

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Fixed answer, for auto-accept flags and tests
pub struct FixedConfirmer(pub bool);

impl Confirmer for FixedConfirmer {
    fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}
