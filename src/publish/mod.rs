//! Remote publication of archives and recipe versions.
//!
//! Behind the `Publisher` seam sits an HTTP implementation: the archive is
//! PUT into an object-storage bucket under its content address, and the
//! recipe body is POSTed to a component registry. The registry refuses to
//! overwrite versions, so when the requested version is not greater than the
//! latest published one the patch number is bumped and the descriptor body is
//! rewritten to match before upload.

use anyhow::{Context, Result};
use regex::Regex;
use semver::Version;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::LazyLock;
use uuid::Uuid;

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(component[ \-_]?version[ \t]*[:=][ \t]*)('?)([^'\n,;#]*)('?)").unwrap()
});

/// Remote side of a run, invoked at most once per interface per run.
#[allow(async_fn_in_trait)]
pub trait Publisher {
    async fn upload_archive(&self, address: &str, path: &Path) -> Result<()>;
    /// Upload the recipe body, returning the version actually published.
    async fn upload_recipe(&self, name: &str, version: &str, body: &str) -> Result<String>;
}

/// Publisher talking to an HTTP object store and component registry.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct LatestVersion {
    version: String,
}

impl HttpPublisher {
    /// A missing bucket gets a unique generated name, so repeated anonymous
    /// runs never collide.
    pub fn new(endpoint: impl Into<String>, bucket: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.unwrap_or_else(|| format!("fleetforge-{}", Uuid::new_v4())),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Latest published version of a component, `None` when unknown there.
    async fn latest_version(&self, name: &str) -> Result<Option<Version>> {
        let url = format!("{}/components/{name}/latest", self.endpoint);
        let response = self.client.get(&url).send().await.context("registry unreachable")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let latest: LatestVersion =
            response.error_for_status()?.json().await.context("malformed registry response")?;
        Ok(Version::parse(&latest.version).ok())
    }
}

impl Publisher for HttpPublisher {
    async fn upload_archive(&self, address: &str, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let url = format!("{}/{}/{address}.zip", self.endpoint, self.bucket);
        tracing::info!("uploading archive to {url}");
        self.client
            .put(&url)
            .body(bytes)
            .send()
            .await
            .context("archive upload failed")?
            .error_for_status()
            .context("archive upload rejected")?;
        Ok(())
    }

    async fn upload_recipe(&self, name: &str, version: &str, body: &str) -> Result<String> {
        let requested = Version::parse(version).unwrap_or_else(|_| Version::new(0, 0, 0));
        let latest = self.latest_version(name).await?;
        let publish = resolve_version(&requested, latest.as_ref());
        let body = if publish == requested {
            body.to_string()
        } else {
            tracing::info!("version {requested} already published, bumping to {publish}");
            rewrite_version(body, &publish.to_string())
        };
        let url = format!("{}/components", self.endpoint);
        tracing::info!("registering {name} {publish} at {url}");
        self.client
            .post(&url)
            .json(&json!({ "name": name, "version": publish.to_string(), "recipe": body }))
            .send()
            .await
            .context("recipe upload failed")?
            .error_for_status()
            .context("recipe upload rejected")?;
        Ok(publish.to_string())
    }
}

/// The version to publish: the requested one, unless it is not greater than
/// the latest already published, in which case latest-plus-one-patch.
fn resolve_version(requested: &Version, latest: Option<&Version>) -> Version {
    match latest {
        Some(latest) if requested <= latest => {
            Version::new(latest.major, latest.minor, latest.patch + 1)
        }
        _ => requested.clone(),
    }
}

/// Rewrite the first version directive in a recipe body to `version`.
fn rewrite_version(body: &str, version: &str) -> String {
    VERSION_LINE.replace(body, format!("${{1}}'{version}'")).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greater_requested_version_is_kept() {
        let v = resolve_version(&Version::new(2, 0, 0), Some(&Version::new(1, 4, 9)));
        assert_eq!(v, Version::new(2, 0, 0));
    }

    #[test]
    fn stale_requested_version_bumps_latest_patch() {
        let v = resolve_version(&Version::new(1, 0, 0), Some(&Version::new(1, 4, 9)));
        assert_eq!(v, Version::new(1, 4, 10));
        let same = resolve_version(&Version::new(1, 4, 9), Some(&Version::new(1, 4, 9)));
        assert_eq!(same, Version::new(1, 4, 10));
    }

    #[test]
    fn unpublished_component_keeps_requested() {
        assert_eq!(resolve_version(&Version::new(0, 0, 0), None), Version::new(0, 0, 0));
    }

    #[test]
    fn rewrite_targets_the_version_line_only() {
        let body = "ComponentName: hello\nComponentVersion: '1.0.0'\nComponentPublisher: me\n";
        let out = rewrite_version(body, "1.0.1");
        assert!(out.contains("ComponentVersion: '1.0.1'"));
        assert!(out.contains("ComponentName: hello"));
        assert!(!out.contains("1.0.0"));
    }

    #[test]
    fn rewrite_handles_unquoted_versions() {
        let out = rewrite_version("component version: 2.0.0\n", "2.0.1");
        assert!(out.contains("'2.0.1'"));
    }

    #[test]
    fn generated_bucket_names_are_unique() {
        let a = HttpPublisher::new("http://localhost:9000", None);
        let b = HttpPublisher::new("http://localhost:9000", None);
        assert_ne!(a.bucket(), b.bucket());
        assert!(a.bucket().starts_with("fleetforge-"));
    }
}
