//! Deterministic, pure logic shared by the pipeline engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod cost;
pub mod plan;
pub mod roles;
pub mod slug;
pub mod types;
