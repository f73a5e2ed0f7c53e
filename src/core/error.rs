//! Error types and user-facing failure reporting.
//!
//! Internally every fallible operation returns a typed [`ForgeError`] (or an
//! `anyhow::Error` wrapping one near the pipeline boundary). At the CLI edge
//! a failure is reduced to one human-readable line - the innermost cause -
//! and the full chain is only shown in verbose mode.

use colored::Colorize;
use thiserror::Error;

/// All failure kinds the recipe assembly run can surface.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// No input files were given, or none of them produced a key recipe.
    #[error("no usable input files; supply a script, archive, or recipe")]
    MissingInput,

    /// The key input has no hashbang, is not executable, and its extension
    /// does not select a template.
    #[error("no template basis for '{filename}': not a recipe, no hashbang, not executable, unrecognized extension")]
    NoTemplateBasis { filename: String },

    /// The selected template exists neither in the local template directory
    /// nor among the built-in defaults.
    #[error("template '{name}' not found")]
    TemplateNotFound { name: String },

    /// Tera failed while expanding a template.
    #[error("failed to expand template '{template}'")]
    TemplateExpansion {
        template: String,
        #[source]
        source: tera::Error,
    },

    /// A read, bundle, move, or write failed.
    #[error("i/o failure on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An input archive could not be read.
    #[error("cannot read archive {path}")]
    Archive {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// The orchestration agent CLI could not be located.
    #[error("cannot find the fleetctl executable; set --root-path or FLEET_ROOT_PATH")]
    AgentCliNotFound,

    /// The external deploy command exited non-zero.
    #[error("deployment failed with exit status {status}")]
    Deploy { status: i32 },
}

/// Print a failed run the way the CLI promises: the innermost cause on one
/// line, and the whole chain when verbose.
pub fn report_failure(err: &anyhow::Error, verbose: bool) {
    let innermost = err.chain().last().map_or_else(|| err.to_string(), ToString::to_string);
    eprintln!("{} {innermost}", "error:".red().bold());
    if verbose {
        for (depth, cause) in err.chain().enumerate().skip(1) {
            eprintln!("  {depth}: {cause}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn innermost_cause_is_last_in_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = anyhow::Error::from(ForgeError::Io { path: "x".into(), source: io })
            .context("while packaging");
        let innermost = err.chain().last().unwrap().to_string();
        assert_eq!(innermost, "gone");
    }

    #[test]
    fn messages_are_single_line() {
        let e = ForgeError::NoTemplateBasis { filename: "a.bin".into() };
        assert!(!e.to_string().contains('\n'));
        let e = ForgeError::Deploy { status: 3 };
        assert!(e.to_string().contains('3'));
    }
}
