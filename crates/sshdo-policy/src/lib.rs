//! Policy engine for the sshdo gatekeeper.
//!
//! A policy is a tree `principal -> label-or-any -> set of command
//! patterns`, loaded from a main file plus a sorted `*.d` drop-in
//! directory, with a training set and a flat settings record alongside.
//! The decision function resolves (user, label, command) against the tree
//! in a fixed order; command patterns use `#` digit runs compiled to
//! anchored matchers under one of three styles.

pub mod engine;
pub mod error;
pub mod loader;
pub mod pattern;
pub mod tree;

pub use engine::decide;
pub use error::{PolicyError, PolicyResult};
pub use loader::{load, validate, Issue, LoadedPolicy};
pub use pattern::{CommandPattern, PatternCache};
pub use tree::{PolicyTree, Settings, TrainingSet, DEFAULT_CONFIG_PATH};
