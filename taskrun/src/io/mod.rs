//! I/O helpers for taskrun commands.

pub mod config;
pub mod generator;
pub mod init;
pub mod plan_store;
pub mod process;
pub mod prompt;
pub mod run_log;
pub mod workspace;
