//! Deterministic, pure logic for planning and validation.
//!
//! Core modules never touch the filesystem or spawn processes. They operate
//! on plans, paths and file contents in memory and return deterministic
//! results suitable for tests.

pub mod architecture;
pub mod domain;
pub mod graph;
pub mod integration;
pub mod invariants;
pub mod normalize;
pub mod pipeline;
pub mod preflight;
pub mod profile;
pub mod semantic;
pub mod strategy;
pub mod structure;
pub mod syntax;
pub mod types;
