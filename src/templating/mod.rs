//! Template expansion against extracted metadata.
//!
//! The engine expands a named template (selected by hashbang, executability,
//! or file extension) with Tera. Templates see the run's
//! [`GenerationContext`](context::GenerationContext) as plain variables and a
//! small callback surface ([`hooks`]) for requesting platform sub-recipes and
//! merging configuration/dependency entries into the active recipe.

pub mod builtin;
pub mod context;
pub mod engine;
pub mod hooks;

pub use context::GenerationContext;
pub use engine::TemplateEngine;
