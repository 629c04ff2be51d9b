//! Side-effecting adapters: filesystem, processes, git, terminal.

pub mod config;
pub mod context;
pub mod credentials;
pub mod display;
pub mod git;
pub mod pipeline;
pub mod process;
pub mod project;
pub mod prompt;
pub mod run_store;
pub mod source;
