//! Tolerant metadata extraction from free-form seed files.
//!
//! A seed file (a shell script, a Python file, a descriptor fragment) may
//! carry `component <field>: <value>` directives anywhere in its body, usually
//! inside comments. This module scans for them without ever failing: a field
//! that is absent, empty, or malformed simply degrades to its computed
//! default.
//!
//! Recognized directives (case-insensitive, `-`/`_`/space allowed between
//! `component` and the field word, `:` or `=` as the separator):
//!
//! ```text
//! # component name: greeter
//! # component version: 1.2.3
//! # component publisher: example.com
//! # component config: port = 8080
//! ```
//!
//! Field values run until the first unescaped `;`, `,`, newline, or `#`.
//! Defaults for name and version come from the filename stem: `greeter-1.2.3.sh`
//! splits at the first hyphen-digit boundary into `greeter` / `1.2.3`.

use regex::Regex;
use std::sync::LazyLock;

/// Metadata harvested from a single seed body.
///
/// `configuration` preserves directive appearance order; a key that appears
/// more than once keeps its first value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeMetadata {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub group: Option<String>,
    pub hashbang: Option<String>,
    pub configuration: Vec<(String, String)>,
}

static VERSION_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-[0-9]").unwrap());
static CONFIG_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)component[ \-_]?config(?:uration)?:[ \t]*([A-Za-z0-9_.\-]+)[ \t]*[=:][ \t]*([^\n]+)")
        .unwrap()
});
static EXTENSION_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[a-zA-Z][^.\-]*$").unwrap());

/// Extract recipe metadata from `body`, using `filename_hint` for defaults.
///
/// Never fails; missing fields fall back to filename-derived defaults and the
/// version is canonicalized with [`clean_version`].
pub fn extract(body: &str, filename_hint: &str) -> RecipeMetadata {
    let stem = chop_extension(filename_hint);
    let (default_name, default_version) = match VERSION_BOUNDARY.find(&stem) {
        Some(m) => (stem[..m.start()].to_string(), stem[m.start() + 1..].to_string()),
        None => (stem.clone(), "0.0.0".to_string()),
    };

    let name = field(body, "name").unwrap_or(default_name);
    // generated descriptors quote their version strings; unwrap one layer so
    // re-extraction yields the bare version (other fields keep their quotes)
    let version = clean_version(&unquote(field(body, "version").unwrap_or(default_version)));
    let description = field(body, "description");
    let publisher = field(body, "publisher");
    let group = field(body, "group");

    let mut configuration: Vec<(String, String)> = Vec::new();
    for caps in CONFIG_DIRECTIVE.captures_iter(body) {
        let key = caps[1].to_string();
        // First directive for a key wins; later ones are dropped.
        if !configuration.iter().any(|(k, _)| *k == key) {
            configuration.push((key, caps[2].trim().to_string()));
        } else {
            tracing::debug!("dropping repeated config directive for '{}'", &caps[1]);
        }
    }

    RecipeMetadata {
        name,
        version,
        description,
        publisher,
        group,
        hashbang: hashbang(body),
        configuration,
    }
}

/// Canonicalize a raw version token: empty becomes `0.0.0`, a trailing
/// `-SNAPSHOT` qualifier is stripped. Idempotent.
pub fn clean_version(version: &str) -> String {
    let v = version.trim();
    if v.is_empty() {
        return "0.0.0".to_string();
    }
    v.strip_suffix("-SNAPSHOT").unwrap_or(v).to_string()
}

/// Filename stem: directory part and one trailing extension removed.
/// The extension must start with a letter so `app-1.2` keeps its `.2`.
pub fn chop_extension(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    EXTENSION_TAIL.replace(base, "").to_string()
}

/// File extension without the dot; empty when there is none.
pub fn extension(filename: &str) -> &str {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    match base.rfind('.') {
        Some(dot) if dot > 0 => &base[dot + 1..],
        _ => "",
    }
}

fn hashbang(body: &str) -> Option<String> {
    let rest = body.strip_prefix("#!")?;
    let line = rest.lines().next().unwrap_or("");
    Some(line.trim().to_string())
}

/// Look up one `component <field>` directive in the body.
///
/// The value ends at the first unescaped `;`, `,`, `#`, or newline; backslash
/// escapes of those characters are unwrapped. Returns `None` when the
/// directive is missing or its value is empty after trimming.
fn field(body: &str, part: &str) -> Option<String> {
    let pattern = format!(r"(?i)component[ \-_]?{part}[ \t]*[:=][ \t]*((?:\\[;,#]|[^;,\n#])*)");
    let re = Regex::new(&pattern).expect("field pattern is valid");
    let raw = re.captures(body)?.get(1)?.as_str();
    let value = raw
        .replace(r"\;", ";")
        .replace(r"\,", ",")
        .replace(r"\#", "#")
        .trim()
        .to_string();
    if value.is_empty() { None } else { Some(value) }
}

fn unquote(value: String) -> String {
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_stem_splits_at_hyphen_digit() {
        let meta = extract("", "pkg/name-1.2.3.sh");
        assert_eq!(meta.name, "name");
        assert_eq!(meta.version, "1.2.3");
    }

    #[test]
    fn filename_without_version_defaults_to_zero() {
        let meta = extract("echo hi\n", "hello.sh");
        assert_eq!(meta.name, "hello");
        assert_eq!(meta.version, "0.0.0");
    }

    #[test]
    fn directives_override_filename_defaults() {
        let body = "#!/bin/sh\n# component name: greeter\n# Component-Version: 2.0.1\n\
                    # component publisher: example.com\n# component_group: edge\n";
        let meta = extract(body, "hello-1.0.0.sh");
        assert_eq!(meta.name, "greeter");
        assert_eq!(meta.version, "2.0.1");
        assert_eq!(meta.publisher.as_deref(), Some("example.com"));
        assert_eq!(meta.group.as_deref(), Some("edge"));
        assert_eq!(meta.hashbang.as_deref(), Some("/bin/sh"));
    }

    #[test]
    fn value_stops_at_terminators() {
        let meta = extract("component name: alpha; trailing\n", "x.sh");
        assert_eq!(meta.name, "alpha");
        let meta = extract("component name: beta # comment\n", "x.sh");
        assert_eq!(meta.name, "beta");
        let meta = extract("component name: gamma, delta\n", "x.sh");
        assert_eq!(meta.name, "gamma");
    }

    #[test]
    fn escaped_terminator_is_kept() {
        let meta = extract(r"component description: a\;b", "x.sh");
        assert_eq!(meta.description.as_deref(), Some("a;b"));
    }

    #[test]
    fn empty_directive_falls_back_to_default() {
        let meta = extract("component name:   \n", "fallback.sh");
        assert_eq!(meta.name, "fallback");
    }

    #[test]
    fn clean_version_rules() {
        assert_eq!(clean_version(""), "0.0.0");
        assert_eq!(clean_version("1.2.3-SNAPSHOT"), "1.2.3");
        assert_eq!(clean_version("1.2.3"), "1.2.3");
        // idempotent
        assert_eq!(clean_version(&clean_version("1.2.3-SNAPSHOT")), "1.2.3");
        assert_eq!(clean_version(&clean_version("")), "0.0.0");
    }

    #[test]
    fn config_directives_first_write_wins() {
        let body = "component config: k = a\ncomponent configuration: k = b\n\
                    component config: other = 1\n";
        let meta = extract(body, "x.sh");
        assert_eq!(
            meta.configuration,
            vec![("k".to_string(), "a".to_string()), ("other".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn generated_recipe_directives_match() {
        // The generated descriptors use ComponentName / ComponentVersion lines,
        // which the same grammar picks up when the body is re-extracted.
        let body = "ComponentName: greeter\nComponentVersion: '3.1.4'\n";
        let meta = extract(body, "greeter-3.1.4");
        assert_eq!(meta.name, "greeter");
        assert_eq!(meta.version, "3.1.4");
    }

    #[test]
    fn only_the_version_is_unquoted() {
        let body = "ComponentVersion: '2.0.0'\ncomponent description: 'say \"hi\"'\n";
        let meta = extract(body, "x.sh");
        assert_eq!(meta.version, "2.0.0");
        assert_eq!(meta.description.as_deref(), Some("'say \"hi\"'"));
    }

    #[test]
    fn chop_extension_cases() {
        assert_eq!(chop_extension("a/b/hello.sh"), "hello");
        assert_eq!(chop_extension("name-1.2.3.sh"), "name-1.2.3");
        assert_eq!(chop_extension("noext"), "noext");
    }

    #[test]
    fn extension_cases() {
        assert_eq!(extension("a.yaml"), "yaml");
        assert_eq!(extension("noext"), "");
        assert_eq!(extension(".hidden"), "");
        assert_eq!(extension("dir.d/noext"), "");
    }

    #[test]
    fn malformed_body_never_panics() {
        let meta = extract("component \u{0} name::: ;;; \\", "odd-9x.bin");
        assert_eq!(meta.version, "0.0.0");
    }
}
