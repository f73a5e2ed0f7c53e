//! Template selection, expansion, and the recursive platform worklist.
//!
//! Selection precedence for the root template: a hashbang always wins, then
//! executability, then the file extension. Expansion runs on a fresh Tera
//! instance per call with the callback surface from [`super::hooks`]
//! registered; a template may request further platform templates during its
//! own expansion, and those are drained iteratively afterwards (FIFO, each
//! name expanded at most once per run).

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tera::Tera;

use crate::core::ForgeError;
use crate::metadata;
use crate::recipe::{RecipeCollection, RecipeSource};

use super::builtin;
use super::context::GenerationContext;
use super::hooks::MergeContext;

/// Expands templates from a local directory, falling back to the built-in
/// defaults when a name is absent there.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    template_dir: PathBuf,
}

impl TemplateEngine {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self { template_dir: template_dir.into() }
    }

    /// Pick the root template for a non-recipe key input.
    pub fn select_template(key: &RecipeSource) -> Result<String, ForgeError> {
        if key.hashbang.is_some() {
            return Ok("hashbang.yml".to_string());
        }
        if is_executable(Path::new(&key.filename)) {
            return Ok("executable.yml".to_string());
        }
        let ext = metadata::extension(&key.filename);
        if !ext.is_empty() {
            return Ok(format!("{ext}.yml"));
        }
        Err(ForgeError::NoTemplateBasis { filename: key.filename.clone() })
    }

    /// Load a template body by engine-relative name.
    fn load(&self, name: &str) -> Result<String, ForgeError> {
        let local = self.template_dir.join(name);
        match fs::read_to_string(&local) {
            Ok(body) => {
                tracing::debug!("using local template {}", local.display());
                Ok(body)
            }
            Err(_) => builtin::lookup(name)
                .map(str::to_string)
                .ok_or_else(|| ForgeError::TemplateNotFound { name: name.to_string() }),
        }
    }

    /// Expand one template against the generation context, with merge
    /// effects routed to `active`.
    ///
    /// Returns the rendered body and the platform names requested during this
    /// expansion, in request order. The active recipe's configuration and
    /// dependency maps are updated in place.
    pub fn expand(
        &self,
        name: &str,
        ctx: &GenerationContext,
        active: &mut RecipeSource,
    ) -> Result<(String, Vec<String>), ForgeError> {
        let template = self.load(name)?;
        let merge = MergeContext::seeded_from(active);
        let mut tera = Tera::default();
        merge.register(&mut tera);
        let rendered = tera.render_str(&template, &ctx.to_tera()).map_err(|source| {
            ForgeError::TemplateExpansion { template: name.to_string(), source }
        })?;
        let outcome = merge.outcome();
        active.configuration = outcome.configuration;
        active.dependencies = outcome.dependencies;
        Ok((rendered, outcome.requested_platforms))
    }

    /// Drain the platform worklist seeded by the root expansion.
    ///
    /// Each pending name gets a fresh bodyless [`RecipeSource`]; its template
    /// is expanded with merge effects routed to that source, the result
    /// becomes the source body, and any names it requested in turn are
    /// appended behind the ones already queued. The visited set guarantees
    /// termination and at-most-once expansion per name.
    pub fn generate_platforms(
        &self,
        ctx: &GenerationContext,
        recipes: &mut RecipeCollection,
        initial_requests: Vec<String>,
    ) -> Result<Vec<usize>, ForgeError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        for name in initial_requests {
            if visited.insert(name.clone()) {
                queue.push_back(name);
            }
        }
        let mut generated = Vec::new();
        while let Some(platform) = queue.pop_front() {
            tracing::info!("generating platform recipe {platform}");
            let mut source = RecipeSource::new(platform.clone(), None, true);
            let (body, requested) =
                self.expand(&format!("platforms/{platform}"), ctx, &mut source)?;
            source.set_body(body);
            generated.push(recipes.insert(source));
            for name in requested {
                if visited.insert(name.clone()) {
                    queue.push_back(name);
                }
            }
        }
        Ok(generated)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).map(|m| m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    // No execute bit off unix; the extension rule covers those systems.
    let _ = path;
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_template(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn ctx() -> GenerationContext {
        let key = RecipeSource::new("hello.sh", Some("#!/bin/sh\n".to_string()), false);
        GenerationContext::from_key(&key, &["hello.sh".into()], &[], &["hello.sh".into()], "11")
    }

    #[test]
    fn hashbang_wins_selection() {
        let key = RecipeSource::new("x.py", Some("#!/usr/bin/env python3\n".into()), false);
        assert_eq!(TemplateEngine::select_template(&key).unwrap(), "hashbang.yml");
    }

    #[test]
    fn extension_selects_when_not_executable() {
        let key = RecipeSource::new("thing.py", Some("print('hi')\n".into()), false);
        assert_eq!(TemplateEngine::select_template(&key).unwrap(), "py.yml");
    }

    #[cfg(unix)]
    #[test]
    fn executable_beats_extension() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.py");
        fs::write(&path, "print('hi')\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        let key = RecipeSource::new(
            path.to_string_lossy().into_owned(),
            Some("print('hi')\n".to_string()),
            false,
        );
        assert_eq!(TemplateEngine::select_template(&key).unwrap(), "executable.yml");
    }

    #[test]
    fn no_basis_is_an_error() {
        let key = RecipeSource::new("README", Some("plain text".into()), false);
        assert!(matches!(
            TemplateEngine::select_template(&key),
            Err(ForgeError::NoTemplateBasis { .. })
        ));
    }

    #[test]
    fn local_template_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "sh.yml", "local {{ name }}\n");
        let engine = TemplateEngine::new(dir.path());
        let mut active = RecipeSource::new("hello.sh", None, false);
        let (body, _) = engine.expand("sh.yml", &ctx(), &mut active).unwrap();
        assert_eq!(body, "local hello\n");
    }

    #[test]
    fn builtin_fallback_renders() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TemplateEngine::new(dir.path());
        let mut active = RecipeSource::new("hello.sh", None, false);
        let (body, _) = engine.expand("hashbang.yml", &ctx(), &mut active).unwrap();
        assert!(body.contains("ComponentName: hello"));
        assert!(body.contains("artifacts: inject"));
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TemplateEngine::new(dir.path());
        let mut active = RecipeSource::new("x.sh", None, false);
        assert!(matches!(
            engine.expand("nope.yml", &ctx(), &mut active),
            Err(ForgeError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn platform_requested_three_times_expands_once() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "platforms/a.yml",
            "component name: plat-a\n{{ platform(name='c.yml') }}",
        );
        write_template(
            dir.path(),
            "platforms/b.yml",
            "component name: plat-b\n{{ platform(name='c.yml') }}",
        );
        write_template(dir.path(), "platforms/c.yml", "component name: plat-c\n");
        let engine = TemplateEngine::new(dir.path());
        let mut recipes = RecipeCollection::new();
        let generated = engine
            .generate_platforms(
                &ctx(),
                &mut recipes,
                vec!["a.yml".into(), "b.yml".into(), "c.yml".into()],
            )
            .unwrap();
        // c requested by the root and by both platforms, expanded exactly once
        assert_eq!(generated.len(), 3);
        assert_eq!(recipes.iter().filter(|r| r.name == "plat-c").count(), 1);
    }

    #[test]
    fn later_requests_queue_behind_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "platforms/first.yml",
            "component name: first\n{{ platform(name='third.yml') }}",
        );
        write_template(dir.path(), "platforms/second.yml", "component name: second\n");
        write_template(dir.path(), "platforms/third.yml", "component name: third\n");
        let engine = TemplateEngine::new(dir.path());
        let mut recipes = RecipeCollection::new();
        engine
            .generate_platforms(
                &ctx(),
                &mut recipes,
                vec!["first.yml".into(), "second.yml".into()],
            )
            .unwrap();
        let order: Vec<&str> = recipes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn merge_effects_route_to_platform_source() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "platforms/p.yml",
            "component name: plat-p\n{{ add_dependency(name='lib', version='1.0') }}",
        );
        let engine = TemplateEngine::new(dir.path());
        let mut recipes = RecipeCollection::new();
        engine.generate_platforms(&ctx(), &mut recipes, vec!["p.yml".into()]).unwrap();
        let plat = recipes.by_name("plat-p").unwrap();
        assert_eq!(plat.dependencies, vec![("lib".to_string(), "1.0".to_string())]);
    }
}
