//! The value bag exposed to template expansion.

use chrono::{SecondsFormat, Utc};
use std::path::Path;
use tera::Context as TeraContext;

use crate::recipe::RecipeSource;

/// Everything a template may reference: key-recipe metadata, the artifact
/// file list, caller-supplied parameter overrides, and the odd runtime hint.
///
/// One instance exists per run, owned by the expansion engine; platform
/// expansions reuse it unchanged while their merge effects are routed to the
/// platform's own recipe.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub name: String,
    pub version: String,
    pub publisher: String,
    pub description: String,
    /// Base name of the key input file.
    pub file: String,
    /// Base names of every artifact, in ArtifactSet order.
    pub files: Vec<String>,
    /// `key=value` overrides from the command line.
    pub params: Vec<(String, String)>,
    pub hashbang: Option<String>,
    /// Major version of the language runtime harvested from an input archive
    /// manifest, when there was one.
    pub runtime_version: String,
}

impl GenerationContext {
    /// Seed the context from the key recipe and the run's inputs.
    pub fn from_key(
        key: &RecipeSource,
        artifacts: &[String],
        params: &[(String, String)],
        inputs: &[String],
        runtime_version: &str,
    ) -> Self {
        let user = username();
        let publisher = key.publisher.clone().unwrap_or_else(|| user.clone());
        let description = key.description.clone().unwrap_or_else(|| {
            format!(
                "Created for {user} on {} from {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                inputs.join(" ")
            )
        });
        Self {
            name: key.name.clone(),
            version: key.version.clone(),
            publisher,
            description,
            file: base_name(&key.filename),
            files: artifacts.iter().map(|f| base_name(f)).collect(),
            params: params.to_vec(),
            hashbang: key.hashbang.clone(),
            runtime_version: runtime_version.to_string(),
        }
    }

    /// Flatten into a Tera context. Parameter overrides become top-level
    /// variables and shadow nothing the engine itself sets.
    pub fn to_tera(&self) -> TeraContext {
        let mut ctx = TeraContext::new();
        ctx.insert("name", &self.name);
        ctx.insert("version", &self.version);
        ctx.insert("publisher", &self.publisher);
        ctx.insert("description", &self.description);
        ctx.insert("file", &self.file);
        ctx.insert("files", &self.files);
        ctx.insert("runtime_version", &self.runtime_version);
        if let Some(hashbang) = &self.hashbang {
            ctx.insert("hashbang", hashbang);
        }
        for (k, v) in &self.params {
            if !ctx.contains_key(k) {
                ctx.insert(k, v);
            }
        }
        ctx
    }
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned())
}

fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RecipeSource {
        RecipeSource::new("dir/hello.sh", Some("#!/bin/sh\necho hi\n".to_string()), false)
    }

    #[test]
    fn params_become_variables() {
        let ctx = GenerationContext::from_key(
            &key(),
            &["dir/hello.sh".into()],
            &[("msg".into(), "23".into())],
            &["dir/hello.sh".into()],
            "11",
        );
        let tera = ctx.to_tera();
        assert_eq!(tera.get("msg").unwrap(), "23");
        assert_eq!(tera.get("file").unwrap(), "hello.sh");
    }

    #[test]
    fn params_cannot_shadow_metadata() {
        let ctx = GenerationContext::from_key(
            &key(),
            &[],
            &[("name".into(), "sneaky".into())],
            &[],
            "11",
        );
        assert_eq!(ctx.to_tera().get("name").unwrap(), "hello");
    }

    #[test]
    fn default_description_mentions_inputs() {
        let ctx = GenerationContext::from_key(&key(), &[], &[], &["hello.sh".into()], "11");
        assert!(ctx.description.contains("hello.sh"));
        assert!(ctx.description.starts_with("Created for "));
    }
}
