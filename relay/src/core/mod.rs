//! Deterministic, pure logic shared by relay stages.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod filter;
pub mod image_index;
pub mod naming;
pub mod state;
pub mod types;
