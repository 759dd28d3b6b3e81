//! Side effects: process spawning, backend adapters, environment, config and
//! stdin/stdout state threading.

pub mod aws_cli;
pub mod cloud;
pub mod config;
pub mod env;
pub mod process;
pub mod state_io;
