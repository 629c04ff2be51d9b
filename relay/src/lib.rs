//! Relay: run named pipelines of LLM, coding-agent, and shell steps.
//!
//! A pipeline turns a ticket (a spec file or an ad-hoc prompt) into planning
//! artifacts and, optionally, code changes. Every invocation leaves a durable
//! run record under `.relay/runs/<id>/` for later inspection and cost
//! reporting. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (binding, budgeting, plan parsing).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (config, filesystem, git, processes,
//!   terminal).
//! - **[`executors`]**: The three step executors behind one trait.
//!
//! Orchestration modules ([`engine`], [`session`], [`stats`], [`init`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod core;
pub mod engine;
pub mod executors;
pub mod exit_codes;
pub mod init;
pub mod io;
pub mod logging;
pub mod session;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
