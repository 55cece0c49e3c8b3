//! Plan-driven task executor with validated file generation.
//!
//! A natural-language request becomes a [`plan::Plan`]: an ordered,
//! dependency-annotated list of read/write/run/delete steps. The executor
//! runs the steps one at a time, generating file contents through an
//! external generator and refusing to write anything that breaks the
//! project's architectural, semantic or cross-file contracts.
//!
//! - **[`core`]**: Pure, deterministic logic (ordering, pre-flight, content
//!   validation, integration checks). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, processes, the
//!   generator, prompts, config). Behind traits so tests can script them.
//!
//! Orchestration modules ([`step`], [`execute`], [`planner`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod planner;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
