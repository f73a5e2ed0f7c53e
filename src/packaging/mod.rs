//! Content-addressed packaging of artifact files.
//!
//! All artifact inputs of a run are bundled into a single zip archive. The
//! archive is digested with SHA-256 and renamed to `<HEX>.zip`, so identical
//! ordered contents always produce the identical reference, and the location
//! reference handed to the recipe writer points at that digest-derived key.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;

use crate::core::ForgeError;

/// Append-only ordered list of files to bundle.
#[derive(Debug, Default, Clone)]
pub struct ArtifactSet {
    files: Vec<String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>) {
        self.files.push(path.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// The result of a successful packaging step.
#[derive(Debug, Clone)]
pub struct PackagedArchive {
    /// Final archive path, `<dest_dir>/<HEX>.zip`.
    pub path: PathBuf,
    /// Uppercase hexadecimal SHA-256 of the archive bytes.
    pub address: String,
    /// `s3://<bucket-or-localhost>/<HEX>.zip`, spliced into the recipe.
    pub location_ref: String,
}

/// Bundle `artifacts` into one archive under `dest_dir`.
///
/// Entries are written in iteration order under their base names; two inputs
/// sharing a base name are both written and the later one wins on extraction.
/// An empty set produces no archive. Any I/O failure aborts the run; a
/// partial bundle is removed best-effort.
pub fn package(
    artifacts: &ArtifactSet,
    dest_dir: &Path,
    base_name: &str,
    bucket: Option<&str>,
) -> Result<Option<PackagedArchive>, ForgeError> {
    if artifacts.is_empty() {
        tracing::debug!("no artifacts to package");
        return Ok(None);
    }
    fs::create_dir_all(dest_dir).map_err(|source| ForgeError::Io {
        path: dest_dir.display().to_string(),
        source,
    })?;

    let staging = dest_dir.join(format!("{base_name}.zip"));
    let result = write_bundle(artifacts, &staging);
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result?;

    let address = digest_file(&staging)?;
    let final_name = format!("{address}.zip");
    let final_path = dest_dir.join(&final_name);
    fs::rename(&staging, &final_path).map_err(|source| ForgeError::Io {
        path: final_path.display().to_string(),
        source,
    })?;
    tracing::info!("archive: {}", final_path.display());

    let location_ref = format!("s3://{}/{final_name}", bucket.unwrap_or("localhost"));
    Ok(Some(PackagedArchive { path: final_path, address, location_ref }))
}

fn write_bundle(artifacts: &ArtifactSet, staging: &Path) -> Result<(), ForgeError> {
    let file = File::create(staging).map_err(|source| ForgeError::Io {
        path: staging.display().to_string(),
        source,
    })?;
    let mut bundle = zip::ZipWriter::new(file);
    let mut seen: Vec<String> = Vec::new();
    for artifact in artifacts.iter() {
        let entry = Path::new(artifact)
            .file_name()
            .map_or_else(|| artifact.to_string(), |n| n.to_string_lossy().into_owned());
        if seen.contains(&entry) {
            tracing::warn!("duplicate archive entry '{entry}', last write wins");
        }
        tracing::info!("bundling {entry}");
        bundle
            .start_file(entry.clone(), FileOptions::default())
            .map_err(|e| zip_failure(staging, e))?;
        let mut src = File::open(artifact).map_err(|source| ForgeError::Io {
            path: artifact.to_string(),
            source,
        })?;
        io::copy(&mut src, &mut bundle).map_err(|source| ForgeError::Io {
            path: artifact.to_string(),
            source,
        })?;
        seen.push(entry);
    }
    bundle.finish().map_err(|e| zip_failure(staging, e))?;
    Ok(())
}

fn zip_failure(path: &Path, err: zip::result::ZipError) -> ForgeError {
    ForgeError::Io {
        path: path.display().to_string(),
        source: io::Error::other(err),
    }
}

/// SHA-256 of a file's bytes, rendered as uppercase hex.
fn digest_file(path: &Path) -> Result<String, ForgeError> {
    let mut file = File::open(path).map_err(|source| ForgeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|source| ForgeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(hex::encode_upper(hasher.finalize()))
}
