//! Cloud task pipeline: chained CLI stages that provision, tag and terminate
//! cloud resources.
//!
//! Each invocation runs one stage. Stages read the accumulated
//! [`core::state::PipelineState`] from stdin, add their results, and write it
//! to stdout for the next stage. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (state document, lookup filters,
//!   image indexing, naming). No I/O.
//! - **[`io`]**: Side effects (backend adapters, environment, config, process
//!   execution, stdin/stdout). Isolated behind traits so tests can swap in
//!   an in-memory backend.
//!
//! Orchestration modules ([`gateway`], [`resolver`], [`semaphore`], [`task`],
//! [`tasks`]) combine the two to implement CLI commands. Every mutating
//! backend call goes through the [`gateway`], which turns simulate mode into
//! validation-only requests.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod gateway;
pub mod io;
pub mod logging;
pub mod resolver;
pub mod semaphore;
pub mod task;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
