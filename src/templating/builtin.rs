//! Built-in default templates, compiled into the binary.
//!
//! The local template directory always wins; these are the fallback so the
//! tool works out of the box for the common seed kinds.

/// Look up a built-in template by its engine-relative name
/// (e.g. `sh.yml` or `platforms/linux.yml`).
pub fn lookup(name: &str) -> Option<&'static str> {
    match name {
        "hashbang.yml" => Some(include_str!("builtin/hashbang.yml")),
        "executable.yml" => Some(include_str!("builtin/executable.yml")),
        "sh.yml" => Some(include_str!("builtin/sh.yml")),
        "py.yml" => Some(include_str!("builtin/py.yml")),
        "jar.yml" => Some(include_str!("builtin/jar.yml")),
        // a bare `linux:<name>` input token selects this by extension
        "linux.yml" | "platforms/linux.yml" => Some(include_str!("builtin/platforms/linux.yml")),
        _ => None,
    }
}
