//! Serializing produced recipes into the output directory.
//!
//! Every [`RecipeSource`](super::RecipeSource) flagged as a recipe is written
//! to `<out_dir>/<name>-<version>.yaml`. Any recipe still carrying the
//! `artifacts: inject` placeholder gets the run's artifact reference spliced
//! in, or the no-artifacts marker when the run produced no archive. Output
//! directories are pre-cleaned so stale recipes from a previous run never
//! linger.

use anyhow::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::core::ForgeError;

use super::RecipeCollection;

static INJECT_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)artifacts: *inject").unwrap());

const NO_ARTIFACTS: &str = "# no artifacts";

/// Replace the artifact placeholder in `body`.
///
/// With a reference, the placeholder becomes an artifact list entry pointing
/// at the content-addressed archive; without one it becomes a comment, so the
/// generated descriptor stays valid either way.
pub fn inject_artifact_refs(body: &str, artifact_ref: Option<&str>) -> String {
    let replacement = match artifact_ref {
        Some(url) => format!("artifacts: [{{ unarchive: ZIP, uri: '{url}' }}]"),
        None => NO_ARTIFACTS.to_string(),
    };
    INJECT_PLACEHOLDER.replace_all(body, replacement.as_str()).into_owned()
}

/// Recursively clear a directory, recreating it when clearing fails
/// (typically because it does not exist yet).
pub fn clean_directory(dir: &Path) -> Result<(), ForgeError> {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            tracing::warn!("could not clear {}: {e}", dir.display());
        }
    }
    fs::create_dir_all(dir).map_err(|source| ForgeError::Io {
        path: dir.display().to_string(),
        source,
    })
}

/// Write every recipe in the collection to `out_dir`.
///
/// Each recipe with a leftover placeholder resolves it against
/// `artifact_ref`. Failures are reported per recipe without aborting the
/// siblings; the number of recipes written is returned.
pub fn finalize(
    recipes: &mut RecipeCollection,
    artifact_ref: Option<&str>,
    out_dir: &Path,
) -> Result<usize> {
    let mut written = 0;
    for idx in 0..recipes.len() {
        let recipe = recipes.get_mut(idx);
        if !recipe.is_recipe {
            continue;
        }
        if let Some(body) = recipe.body.take() {
            let resolved = inject_artifact_refs(&body, artifact_ref);
            recipe.body = Some(resolved);
        }
        let Some(body) = recipe.body.as_deref() else {
            tracing::warn!("recipe {} has no body, skipping", recipe.name);
            continue;
        };
        let path = out_dir.join(format!("{}.yaml", recipe.name_version()));
        match fs::write(&path, body) {
            Ok(()) => {
                tracing::info!("wrote {}", path.display());
                written += 1;
            }
            Err(e) => {
                eprintln!("failed to write {}: {e}", path.display());
            }
        }
    }
    Ok(written)
}
