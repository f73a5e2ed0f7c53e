//! fleetforge turns an arbitrary "seed" input (a script, a prebuilt archive,
//! a descriptor fragment) into a fully-formed deployable component descriptor
//! ("recipe") plus a content-addressed artifact bundle, and hands both to a
//! device-fleet orchestration agent.
//!
//! The interesting parts live in [`metadata`] (tolerant directive
//! extraction), [`templating`] (Tera expansion with a platform worklist and
//! config/dependency merge callbacks), [`packaging`] (content-addressed
//! bundling), and [`pipeline`] (the end-to-end run). The rest is plumbing:
//! CLI, preferences, and the deploy/publish/watch collaborators.

pub mod cli;
pub mod config;
pub mod core;
pub mod deploy;
pub mod metadata;
pub mod packaging;
pub mod pipeline;
pub mod publish;
pub mod recipe;
pub mod templating;
pub mod watch;
