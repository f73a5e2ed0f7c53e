//! The end-to-end assembly run.
//!
//! One invocation walks the whole path: scan the inputs into recipes,
//! artifacts, and parameter overrides; expand the key input's template and
//! drain the platform worklist; bundle the artifacts into a content-addressed
//! archive; write every recipe with the archive reference spliced in; then
//! hand the result to the publish and deploy collaborators when asked.
//!
//! Everything up to deployment is synchronous single-threaded work; only the
//! external process and HTTP calls at the end await anything.

use anyhow::{Result, anyhow};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::config::Preferences;
use crate::core::ForgeError;
use crate::deploy::{self, DeployRequest};
use crate::metadata;
use crate::packaging::{self, ArtifactSet};
use crate::publish::{HttpPublisher, Publisher};
use crate::recipe::{RecipeCollection, RecipeSource, writer};
use crate::templating::{GenerationContext, TemplateEngine};

/// Only this much of a free-form seed file is read for metadata extraction.
const KEY_BODY_LIMIT: u64 = 4096;
const RECIPE_EXTENSIONS: &[&str] = &["yaml", "yml", "ggr"];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "jar"];
/// Archive entries under this prefix are pass-through recipes.
const EMBEDDED_RECIPE_PREFIX: &str = "RECIPES/";
const DEFAULT_RUNTIME_VERSION: &str = "11";

/// Everything one assembly run needs, resolved from flags and preferences.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// File paths, `key=value` overrides, and `<platform>:<name>` tokens.
    pub inputs: Vec<String>,
    pub dry_run: bool,
    pub group: Option<String>,
    pub root_path: Option<String>,
    pub bucket: Option<String>,
    pub template_dir: Option<PathBuf>,
    pub upload: bool,
    pub endpoint: Option<String>,
    /// Directory the `<name>/recipes` and `<name>/artifacts` trees go under.
    pub workspace: PathBuf,
}

/// Run the full pipeline once.
pub async fn run(options: &RunOptions, prefs: &Preferences) -> Result<()> {
    let scan = scan_inputs(&options.inputs)?;
    let mut recipes = scan.recipes;
    let key_idx = recipes.key_index().ok_or(ForgeError::MissingInput)?;

    if !recipes.get(key_idx).is_recipe {
        let template_dir = options
            .template_dir
            .clone()
            .or_else(|| prefs.expanded_template_dir())
            .unwrap_or_else(|| PathBuf::from("templates"));
        let engine = TemplateEngine::new(template_dir);
        let artifact_names: Vec<String> = scan.artifacts.iter().map(str::to_string).collect();
        let ctx = GenerationContext::from_key(
            recipes.get(key_idx),
            &artifact_names,
            &scan.params,
            &scan.input_files,
            &scan.runtime_version,
        );
        let template = TemplateEngine::select_template(recipes.get(key_idx))?;
        tracing::info!("expanding {template} for {}", recipes.get(key_idx).name);
        let mut active = recipes.get(key_idx).clone();
        let (body, requested) = engine.expand(&template, &ctx, &mut active)?;
        active.set_body(body);
        active.is_recipe = true;
        *recipes.get_mut(key_idx) = active;
        engine.generate_platforms(&ctx, &mut recipes, requested)?;
    }

    let key = recipes.get(key_idx).clone();
    let base = options.workspace.join(&key.name);
    let recipe_dir = base.join("recipes");
    let artifact_root = base.join("artifacts");
    writer::clean_directory(&recipe_dir)?;
    writer::clean_directory(&artifact_root)?;

    let mut bucket = options.bucket.clone().or_else(|| prefs.bucket.clone());
    let publisher = if options.upload || options.endpoint.is_some() {
        let endpoint = options
            .endpoint
            .clone()
            .or_else(|| prefs.endpoint.clone())
            .ok_or_else(|| anyhow!("uploading requires an endpoint; pass --to or set one in preferences"))?;
        let publisher = HttpPublisher::new(endpoint, bucket.clone());
        bucket = Some(publisher.bucket().to_string());
        Some(publisher)
    } else {
        None
    };

    let archive_dir = artifact_root.join(&key.name).join(&key.version);
    let packaged =
        packaging::package(&scan.artifacts, &archive_dir, &key.name, bucket.as_deref())?;

    let written = writer::finalize(
        &mut recipes,
        packaged.as_ref().map(|p| p.location_ref.as_str()),
        &recipe_dir,
    )?;
    println!("assembled {} {} ({written} recipe(s) in {})", key.name, key.version, recipe_dir.display());

    if let Some(publisher) = &publisher {
        if let Some(packaged) = &packaged {
            publisher.upload_archive(&packaged.address, &packaged.path).await?;
        }
        if let Some(body) = recipes.get(key_idx).body.as_deref() {
            let published = publisher.upload_recipe(&key.name, &key.version, body).await?;
            println!("published {} {published}", key.name);
        }
    }

    let request = DeployRequest {
        recipe_dir,
        artifact_dir: artifact_root,
        name: key.name.clone(),
        version: key.version.clone(),
        group: options.group.clone().or_else(|| key.group.clone()),
        params: scan.params.clone(),
    };
    let root_path = options.root_path.clone().or_else(|| prefs.expanded_root_path());
    deploy::deploy(&request, root_path.as_deref(), options.dry_run).await?;
    Ok(())
}

/// The classified inputs of one run.
#[derive(Debug, Default)]
struct ScanResult {
    recipes: RecipeCollection,
    artifacts: ArtifactSet,
    params: Vec<(String, String)>,
    /// Paths of inputs that were actual files, for the default description.
    input_files: Vec<String>,
    runtime_version: String,
}

/// Sort the raw argument list into recipes, artifacts, and parameters.
///
/// A token containing `=` is a parameter override. A `<platform>:<name>`
/// token that names no file synthesizes a bodyless key recipe used only for
/// template selection. Files dispatch on extension: recipe extensions pass
/// through, archives are harvested, anything else contributes its head as
/// the key body (first such file only) and always joins the artifact set.
fn scan_inputs(inputs: &[String]) -> Result<ScanResult, ForgeError> {
    if inputs.is_empty() {
        return Err(ForgeError::MissingInput);
    }
    let mut scan =
        ScanResult { runtime_version: DEFAULT_RUNTIME_VERSION.to_string(), ..Default::default() };
    for token in inputs {
        if let Some((key, value)) = token.split_once('=') {
            scan.params.push((key.trim().to_string(), value.trim().to_string()));
            continue;
        }
        let path = Path::new(token);
        if !path.exists() {
            if let Some((platform, name)) = parse_platform_token(token) {
                tracing::debug!("synthesizing key for platform request {token}");
                scan.recipes.insert(RecipeSource::new(format!("{name}.{platform}"), None, false));
                continue;
            }
            return Err(ForgeError::Io {
                path: token.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "input file not found"),
            });
        }
        scan.input_files.push(token.clone());
        let ext = metadata::extension(token).to_ascii_lowercase();
        if RECIPE_EXTENSIONS.contains(&ext.as_str()) {
            let body = std::fs::read_to_string(path).map_err(|source| ForgeError::Io {
                path: token.clone(),
                source,
            })?;
            scan.recipes.insert(RecipeSource::new(token.clone(), Some(body), true));
        } else if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
            // an archive only seeds the key when nothing else has; a recipe
            // given alongside its jar keeps driving the run
            if scan.recipes.key_index().is_none() {
                harvest_archive(token, &mut scan)?;
            }
            scan.artifacts.push(token.clone());
        } else {
            if scan.recipes.key_index().is_none() {
                let head = read_head(path, KEY_BODY_LIMIT)?;
                scan.recipes.insert(RecipeSource::new(token.clone(), Some(head), false));
            }
            scan.artifacts.push(token.clone());
        }
    }
    Ok(scan)
}

/// `<platform>:<name>` with both halves plain identifiers.
fn parse_platform_token(token: &str) -> Option<(&str, &str)> {
    let (platform, name) = token.split_once(':')?;
    let plain = |s: &str| {
        !s.is_empty()
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };
    (plain(platform) && plain(name)).then_some((platform, name))
}

fn read_head(path: &Path, limit: u64) -> Result<String, ForgeError> {
    let file = File::open(path).map_err(|source| ForgeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut data = Vec::new();
    file.take(limit).read_to_end(&mut data).map_err(|source| ForgeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Seed a key recipe from an archive's manifest and lift out any embedded
/// recipes.
///
/// `META-INF/MANIFEST.MF` may carry `ComponentName`, `ComponentVersion`, and
/// a `Build-Jdk` whose major version becomes the `runtime_version` template
/// variable. Entries under `RECIPES/` with a recipe extension pass through.
fn harvest_archive(path_str: &str, scan: &mut ScanResult) -> Result<(), ForgeError> {
    let file = File::open(path_str).map_err(|source| ForgeError::Io {
        path: path_str.to_string(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| ForgeError::Archive {
        path: path_str.to_string(),
        source,
    })?;

    let mut seed = RecipeSource::new(path_str, None, false);
    if let Ok(mut manifest) = archive.by_name("META-INF/MANIFEST.MF") {
        let mut raw = String::new();
        if manifest.read_to_string(&mut raw).is_ok() {
            for line in raw.lines() {
                let Some((attr, value)) = line.split_once(':') else { continue };
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                match attr.trim() {
                    "ComponentName" => seed.name = value.to_string(),
                    "ComponentVersion" => seed.version = metadata::clean_version(value),
                    "Build-Jdk" | "Build-Jdk-Spec" => scan.runtime_version = jdk_major(value),
                    _ => {}
                }
            }
        }
    }
    scan.recipes.insert(seed);

    let embedded: Vec<String> = archive
        .file_names()
        .filter(|name| {
            name.starts_with(EMBEDDED_RECIPE_PREFIX)
                && RECIPE_EXTENSIONS
                    .contains(&metadata::extension(name).to_ascii_lowercase().as_str())
        })
        .map(str::to_string)
        .collect();
    for name in embedded {
        let mut entry = archive.by_name(&name).map_err(|source| ForgeError::Archive {
            path: path_str.to_string(),
            source,
        })?;
        let mut body = String::new();
        entry.read_to_string(&mut body).map_err(|source| ForgeError::Io {
            path: name.clone(),
            source,
        })?;
        tracing::info!("found embedded recipe {name}");
        scan.recipes.insert(RecipeSource::new(name, Some(body), true));
    }
    Ok(())
}

/// Major version of a JDK version string (`11.0.2` -> `11`, `1.8.0` -> `8`).
fn jdk_major(raw: &str) -> String {
    let mut parts = raw.trim().split('.');
    match parts.next() {
        Some("1") => parts.next().unwrap_or("8").to_string(),
        Some(major) if !major.is_empty() && major.chars().all(|c| c.is_ascii_digit()) => {
            major.to_string()
        }
        _ => DEFAULT_RUNTIME_VERSION.to_string(),
    }
}
