//! The callback surface templates may invoke during expansion.
//!
//! A [`MergeContext`] is seeded from the active recipe's maps before each
//! expansion and registered on the Tera instance as a fixed set of functions:
//!
//! - `platform(name=...)` - request generation of a platform sub-recipe
//! - `add_config(key=..., value=...)` - merge a configuration entry
//!   (first-write-wins)
//! - `add_dependency(name=..., version=...)` - merge a dependency entry
//!   (last-write-wins)
//! - `gen_config()` / `gen_env()` / `gen_dependencies()` - render the maps
//!   accumulated so far as descriptor blocks
//!
//! All functions splice string results into the output; the mutating ones
//! splice the empty string. Effects apply immediately, so a template can call
//! `add_config` and then render the result with `gen_config` further down.
//!
//! The state sits behind a mutex only because Tera requires its functions to
//! be `Send + Sync`; expansion itself is single-threaded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tera::{Tera, Value};

use crate::recipe::RecipeSource;

/// Suffix marking a configuration key that should also surface as an
/// environment variable at deployment time.
const ENV_SUFFIX: &str = "-env";
/// Suffix marking a dependency version spec as non-strict.
const SOFT_SUFFIX: &str = "-soft";

/// The merge effects of one expansion.
#[derive(Debug, Default, Clone)]
pub struct MergeOutcome {
    pub configuration: Vec<(String, String)>,
    pub dependencies: Vec<(String, String)>,
    pub requested_platforms: Vec<String>,
}

#[derive(Debug, Default)]
struct MergeState {
    configuration: Vec<(String, String)>,
    dependencies: Vec<(String, String)>,
    requested_platforms: Vec<String>,
}

/// Per-expansion mutable merge state plus the Tera registration for it.
#[derive(Clone, Default)]
pub struct MergeContext {
    state: Arc<Mutex<MergeState>>,
}

impl MergeContext {
    /// Seed the merge state from the active recipe so callbacks and the
    /// `gen_*` renderers observe entries already present on it.
    pub fn seeded_from(recipe: &RecipeSource) -> Self {
        let ctx = Self::default();
        {
            let mut state = ctx.state.lock().expect("merge state poisoned");
            state.configuration = recipe.configuration.clone();
            state.dependencies = recipe.dependencies.clone();
        }
        ctx
    }

    /// Snapshot the effects accumulated so far.
    pub fn outcome(&self) -> MergeOutcome {
        let state = self.state.lock().expect("merge state poisoned");
        MergeOutcome {
            configuration: state.configuration.clone(),
            dependencies: state.dependencies.clone(),
            requested_platforms: state.requested_platforms.clone(),
        }
    }

    /// Register the callback surface on a Tera instance.
    pub fn register(&self, tera: &mut Tera) {
        let state = Arc::clone(&self.state);
        tera.register_function("platform", move |args: &HashMap<String, Value>| {
            let name = str_arg(args, "name", "platform")?;
            state.lock().expect("merge state poisoned").requested_platforms.push(name);
            Ok(Value::String(String::new()))
        });

        let state = Arc::clone(&self.state);
        tera.register_function("add_config", move |args: &HashMap<String, Value>| {
            let key = str_arg(args, "key", "add_config")?;
            let value = str_arg(args, "value", "add_config")?;
            let mut state = state.lock().expect("merge state poisoned");
            // First write wins; later calls for the same key are no-ops.
            if !state.configuration.iter().any(|(k, _)| *k == key) {
                state.configuration.push((key, value));
            }
            Ok(Value::String(String::new()))
        });

        let state = Arc::clone(&self.state);
        tera.register_function("add_dependency", move |args: &HashMap<String, Value>| {
            let name = str_arg(args, "name", "add_dependency")?;
            let version = str_arg(args, "version", "add_dependency")?;
            let mut state = state.lock().expect("merge state poisoned");
            match state.dependencies.iter_mut().find(|(n, _)| *n == name) {
                Some(entry) => entry.1 = version,
                None => state.dependencies.push((name, version)),
            }
            Ok(Value::String(String::new()))
        });

        let state = Arc::clone(&self.state);
        tera.register_function("gen_config", move |_: &HashMap<String, Value>| {
            let state = state.lock().expect("merge state poisoned");
            Ok(Value::String(render_config(&state.configuration)))
        });

        let state = Arc::clone(&self.state);
        tera.register_function("gen_env", move |_: &HashMap<String, Value>| {
            let state = state.lock().expect("merge state poisoned");
            Ok(Value::String(render_env(&state.configuration)))
        });

        let state = Arc::clone(&self.state);
        tera.register_function("gen_dependencies", move |_: &HashMap<String, Value>| {
            let state = state.lock().expect("merge state poisoned");
            Ok(Value::String(render_dependencies(&state.dependencies)))
        });
    }
}

fn str_arg(args: &HashMap<String, Value>, name: &str, func: &str) -> tera::Result<String> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(tera::Error::msg(format!("{func}() requires a '{name}' argument"))),
    }
}

/// Render the default-configuration block. Keys with the `-env` suffix emit
/// with the suffix stripped; they additionally surface via [`render_env`].
pub fn render_config(configuration: &[(String, String)]) -> String {
    if configuration.is_empty() {
        return String::new();
    }
    let mut out = String::from("ComponentConfiguration:\n  DefaultConfiguration:\n");
    for (key, value) in configuration {
        let key = key.strip_suffix(ENV_SUFFIX).unwrap_or(key);
        out.push_str(&format!("    {key}: {value}\n"));
    }
    out
}

/// Render the environment-variable block: one indirection entry per `-env`
/// key, referencing the configuration path resolved at deployment time.
pub fn render_env(configuration: &[(String, String)]) -> String {
    let env_keys: Vec<&str> = configuration
        .iter()
        .filter_map(|(k, _)| k.strip_suffix(ENV_SUFFIX))
        .collect();
    if env_keys.is_empty() {
        return String::new();
    }
    let mut out = String::from("Setenv:\n");
    for key in env_keys {
        out.push_str(&format!("  {key}: '{{configuration:/{key}}}'\n"));
    }
    out
}

/// Render the dependency block. A version spec suffixed `-soft` marks the
/// dependency non-strict; the suffix never reaches the output.
pub fn render_dependencies(dependencies: &[(String, String)]) -> String {
    if dependencies.is_empty() {
        return String::new();
    }
    let mut out = String::from("ComponentDependencies:\n");
    for (name, spec) in dependencies {
        let (spec, soft) = match spec.strip_suffix(SOFT_SUFFIX) {
            Some(stripped) => (stripped, true),
            None => (spec.as_str(), false),
        };
        out.push_str(&format!("  {name}:\n    VersionRequirement: {spec}\n"));
        if soft {
            out.push_str("    DependencyType: SOFT\n");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(template: &str, merge: &MergeContext) -> String {
        let mut tera = Tera::default();
        merge.register(&mut tera);
        tera.render_str(template, &tera::Context::new()).unwrap()
    }

    #[test]
    fn add_config_first_write_wins() {
        let merge = MergeContext::default();
        render(
            "{{ add_config(key='k', value='a') }}{{ add_config(key='k', value='b') }}",
            &merge,
        );
        assert_eq!(merge.outcome().configuration, vec![("k".to_string(), "a".to_string())]);
    }

    #[test]
    fn add_dependency_last_write_wins() {
        let merge = MergeContext::default();
        render(
            "{{ add_dependency(name='x', version='1.0') }}\
             {{ add_dependency(name='x', version='2.0') }}",
            &merge,
        );
        assert_eq!(merge.outcome().dependencies, vec![("x".to_string(), "2.0".to_string())]);
    }

    #[test]
    fn effects_visible_within_same_expansion() {
        let merge = MergeContext::default();
        let out = render("{{ add_config(key='port', value='80') }}{{ gen_config() }}", &merge);
        assert!(out.contains("port: 80"));
    }

    #[test]
    fn seeded_entries_survive_and_win() {
        let mut recipe = RecipeSource::new("x.sh", None, false);
        recipe.add_config("port", "8080");
        let merge = MergeContext::seeded_from(&recipe);
        render("{{ add_config(key='port', value='9') }}", &merge);
        assert_eq!(
            merge.outcome().configuration,
            vec![("port".to_string(), "8080".to_string())]
        );
    }

    #[test]
    fn env_suffix_emits_twice_with_suffix_stripped() {
        let config = vec![
            ("plain".to_string(), "1".to_string()),
            ("path-env".to_string(), "/usr/bin".to_string()),
        ];
        let config_block = render_config(&config);
        assert!(config_block.contains("    plain: 1\n"));
        assert!(config_block.contains("    path: /usr/bin\n"));
        assert!(!config_block.contains("-env"));

        let env_block = render_env(&config);
        assert!(env_block.contains("  path: '{configuration:/path}'\n"));
        assert!(!env_block.contains("plain"));
    }

    #[test]
    fn soft_dependency_marked_non_strict() {
        let deps = vec![
            ("hard".to_string(), ">=1.0".to_string()),
            ("lenient".to_string(), ">=2.0-soft".to_string()),
        ];
        let block = render_dependencies(&deps);
        assert!(block.contains("  hard:\n    VersionRequirement: >=1.0\n"));
        assert!(block.contains("  lenient:\n    VersionRequirement: >=2.0\n    DependencyType: SOFT\n"));
        assert!(!block.contains("-soft"));
    }

    #[test]
    fn empty_maps_render_empty() {
        assert_eq!(render_config(&[]), "");
        assert_eq!(render_env(&[]), "");
        assert_eq!(render_dependencies(&[]), "");
    }

    #[test]
    fn platform_requests_accumulate_in_order() {
        let merge = MergeContext::default();
        render("{{ platform(name='linux.yml') }}{{ platform(name='pi.yml') }}", &merge);
        assert_eq!(
            merge.outcome().requested_platforms,
            vec!["linux.yml".to_string(), "pi.yml".to_string()]
        );
    }

    #[test]
    fn missing_argument_is_a_template_error() {
        let merge = MergeContext::default();
        let mut tera = Tera::default();
        merge.register(&mut tera);
        assert!(tera.render_str("{{ platform() }}", &tera::Context::new()).is_err());
    }
}
