//! Recipe sources and the per-run recipe collection.
//!
//! A [`RecipeSource`] is one parsed input file or one generated platform
//! recipe. The [`RecipeCollection`] keeps every source of a run in insertion
//! order; exactly one of them is the *key* recipe whose name and version drive
//! the output layout.

pub mod writer;

use crate::metadata;

/// One input or generated recipe, with its extracted metadata and the
/// per-recipe configuration / dependency maps filled in during expansion.
///
/// Both maps preserve insertion order. Configuration keys are first-write-wins
/// and dependency keys are last-write-wins; see [`RecipeSource::add_config`]
/// and [`RecipeSource::add_dependency`].
#[derive(Debug, Clone)]
pub struct RecipeSource {
    pub filename: String,
    pub body: Option<String>,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub group: Option<String>,
    pub hashbang: Option<String>,
    pub is_recipe: bool,
    pub configuration: Vec<(String, String)>,
    pub dependencies: Vec<(String, String)>,
}

impl RecipeSource {
    /// Create a source from a filename and optional body. When a body is
    /// present its directives are extracted immediately; otherwise the name
    /// and version default from the filename stem.
    pub fn new(filename: impl Into<String>, body: Option<String>, is_recipe: bool) -> Self {
        let filename = filename.into();
        let mut source = Self {
            filename: filename.clone(),
            body: None,
            name: metadata::chop_extension(&filename),
            version: "0.0.0".to_string(),
            description: None,
            publisher: None,
            group: None,
            hashbang: None,
            is_recipe,
            configuration: Vec::new(),
            dependencies: Vec::new(),
        };
        if let Some(body) = body {
            source.set_body(body);
        }
        source
    }

    /// Install (or replace) the body and re-extract directives from it.
    ///
    /// Configuration entries found in the body merge first-write-wins with
    /// whatever the maps already hold, so values added by template callbacks
    /// earlier in the run are not clobbered.
    pub fn set_body(&mut self, body: String) {
        let meta = metadata::extract(&body, &self.filename);
        self.name = meta.name;
        self.version = meta.version;
        self.description = meta.description.or(self.description.take());
        self.publisher = meta.publisher.or(self.publisher.take());
        self.group = meta.group.or(self.group.take());
        self.hashbang = meta.hashbang;
        for (k, v) in meta.configuration {
            self.add_config(&k, &v);
        }
        self.body = Some(body);
    }

    /// Insert a configuration entry unless the key is already present.
    /// Returns whether the entry was inserted.
    pub fn add_config(&mut self, key: &str, value: &str) -> bool {
        if self.configuration.iter().any(|(k, _)| k == key) {
            return false;
        }
        self.configuration.push((key.to_string(), value.to_string()));
        true
    }

    /// Insert a dependency entry, overwriting any existing version spec for
    /// the same name. Position is kept on overwrite.
    pub fn add_dependency(&mut self, name: &str, version_spec: &str) {
        if let Some(entry) = self.dependencies.iter_mut().find(|(n, _)| n == name) {
            entry.1 = version_spec.to_string();
        } else {
            self.dependencies.push((name.to_string(), version_spec.to_string()));
        }
    }

    /// `<name>-<version>`, the stem used for output files and deploy targets.
    pub fn name_version(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl std::fmt::Display for RecipeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "recipe {} - {}", self.name, self.version)
    }
}

/// Insertion-ordered set of every [`RecipeSource`] in a run, keyed by recipe
/// name. The first inserted source becomes the key recipe unless another one
/// is designated explicitly.
#[derive(Debug, Default)]
pub struct RecipeCollection {
    entries: Vec<RecipeSource>,
    key: Option<usize>,
}

impl RecipeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a source, replacing any entry with the same name in place.
    /// Returns the index of the stored source.
    pub fn insert(&mut self, source: RecipeSource) -> usize {
        let idx = match self.entries.iter().position(|e| e.name == source.name) {
            Some(existing) => {
                self.entries[existing] = source;
                existing
            }
            None => {
                self.entries.push(source);
                self.entries.len() - 1
            }
        };
        if self.key.is_none() {
            self.key = Some(idx);
        }
        idx
    }

    /// Force a particular entry to be the key recipe.
    pub fn designate_key(&mut self, idx: usize) {
        debug_assert!(idx < self.entries.len());
        self.key = Some(idx);
    }

    pub fn key_index(&self) -> Option<usize> {
        self.key
    }

    pub fn key(&self) -> Option<&RecipeSource> {
        self.key.map(|i| &self.entries[i])
    }

    pub fn get(&self, idx: usize) -> &RecipeSource {
        &self.entries[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut RecipeSource {
        &mut self.entries[idx]
    }

    pub fn by_name(&self, name: &str) -> Option<&RecipeSource> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecipeSource> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
