//! Lifecycle of one pipeline stage.
//!
//! A run loads incoming state (stdin in pipe mode, else empty), checks the
//! stage's required environment, runs the stage, and writes the resulting
//! state to stdout. Any failure ends the run before stdout is touched.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::state::PipelineState;
use crate::gateway::{ExecutionMode, Gateway};
use crate::io::cloud::Backends;
use crate::io::config::RelayConfig;
use crate::io::env::Environment;
use crate::io::state_io::{read_state, write_state};
use crate::resolver::ResourceResolver;
use crate::semaphore::SemaphoreStore;

/// Options shared by every stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    /// Read incoming state from stdin.
    pub pipe: bool,
    pub mode: ExecutionMode,
}

/// Process-wide collaborators handed to a stage.
pub struct TaskContext<'a> {
    pub env: &'a Environment,
    pub config: &'a RelayConfig,
    pub backends: Backends<'a>,
    pub gateway: Gateway,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        env: &'a Environment,
        config: &'a RelayConfig,
        backends: Backends<'a>,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            env,
            config,
            backends,
            gateway: Gateway::new(mode),
        }
    }

    pub fn resolver(&self) -> ResourceResolver<'a> {
        ResourceResolver::new(self.backends.compute, self.backends.database)
    }

    pub fn semaphores(&self, caller: &'a str) -> SemaphoreStore<'a> {
        SemaphoreStore::new(self.backends.storage, self.gateway, caller)
    }
}

/// One pipeline stage.
pub trait Stage {
    /// Stage name, used to tag dry-run sentinels and log lines.
    fn name(&self) -> &'static str;

    /// Environment variables that must be present before the stage runs.
    fn required_env(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Stage logic. May read and write `state`.
    fn perform(&self, ctx: &TaskContext<'_>, state: &mut PipelineState) -> Result<()>;
}

/// Run `stage` end to end and return the state that was written.
#[instrument(skip_all, fields(stage = stage.name(), pipe = globals.pipe, mode = ?globals.mode))]
pub fn run_task<S, R, W>(
    stage: &S,
    globals: &GlobalOptions,
    ctx: &TaskContext<'_>,
    input: R,
    output: W,
) -> Result<PipelineState>
where
    S: Stage + ?Sized,
    R: Read,
    W: Write,
{
    let mut state = if globals.pipe {
        read_state(input)?
    } else {
        PipelineState::new()
    };
    debug!(keys = state.len(), "incoming state");

    ctx.env.require_all(&stage.required_env())?;

    info!("performing {}", stage.name());
    stage
        .perform(ctx, &mut state)
        .with_context(|| format!("{} failed", stage.name()))?;

    write_state(output, &state)?;
    debug!("done performing {}", stage.name());
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::test_support::FakeCloud;
    use anyhow::bail;

    struct Marker {
        fail: bool,
    }

    impl Stage for Marker {
        fn name(&self) -> &'static str {
            "marker"
        }

        fn required_env(&self) -> Vec<&'static str> {
            vec!["RELAY_MARKER"]
        }

        fn perform(&self, ctx: &TaskContext<'_>, state: &mut PipelineState) -> Result<()> {
            if self.fail {
                bail!("marker exploded");
            }
            state.set("marker", ctx.env.require("RELAY_MARKER")?);
            Ok(())
        }
    }

    fn env() -> Environment {
        Environment::from_pairs([("RELAY_MARKER", "seen")])
    }

    #[test]
    fn pipe_mode_threads_incoming_state() {
        let cloud = FakeCloud::new();
        let env = env();
        let config = RelayConfig::default();
        let ctx = TaskContext::new(&env, &config, Backends::uniform(&cloud), ExecutionMode::Apply);
        let globals = GlobalOptions {
            pipe: true,
            mode: ExecutionMode::Apply,
        };

        let mut out = Vec::new();
        let state = run_task(
            &Marker { fail: false },
            &globals,
            &ctx,
            "{\"a\": 1, \"b\": \"x\"}".as_bytes(),
            &mut out,
        )
        .expect("run");

        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["a", "b", "marker"]);
        let written = PipelineState::parse(&String::from_utf8(out).expect("utf8")).expect("parse");
        assert_eq!(written, state);
    }

    #[test]
    fn without_pipe_stdin_is_ignored() {
        let cloud = FakeCloud::new();
        let env = env();
        let config = RelayConfig::default();
        let ctx = TaskContext::new(&env, &config, Backends::uniform(&cloud), ExecutionMode::Apply);

        let mut out = Vec::new();
        let state = run_task(
            &Marker { fail: false },
            &GlobalOptions::default(),
            &ctx,
            "{\"a\": 1}".as_bytes(),
            &mut out,
        )
        .expect("run");
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["marker"]);
    }

    #[test]
    fn missing_env_fails_before_stage_and_writes_nothing() {
        let cloud = FakeCloud::new();
        let env = Environment::default();
        let config = RelayConfig::default();
        let ctx = TaskContext::new(&env, &config, Backends::uniform(&cloud), ExecutionMode::Apply);

        let mut out = Vec::new();
        let err = run_task(
            &Marker { fail: false },
            &GlobalOptions::default(),
            &ctx,
            std::io::empty(),
            &mut out,
        )
        .expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RelayError>(),
            Some(RelayError::Configuration { key }) if key == "RELAY_MARKER"
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn failing_stage_writes_nothing() {
        let cloud = FakeCloud::new();
        let env = env();
        let config = RelayConfig::default();
        let ctx = TaskContext::new(&env, &config, Backends::uniform(&cloud), ExecutionMode::Apply);

        let mut out = Vec::new();
        let err = run_task(
            &Marker { fail: true },
            &GlobalOptions::default(),
            &ctx,
            std::io::empty(),
            &mut out,
        )
        .expect_err("should fail");
        assert!(format!("{err:#}").contains("marker exploded"));
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_pipe_input_stops_the_run() {
        let cloud = FakeCloud::new();
        let env = env();
        let config = RelayConfig::default();
        let ctx = TaskContext::new(&env, &config, Backends::uniform(&cloud), ExecutionMode::Apply);
        let globals = GlobalOptions {
            pipe: true,
            mode: ExecutionMode::Apply,
        };

        let mut out = Vec::new();
        assert!(run_task(&Marker { fail: false }, &globals, &ctx, "42".as_bytes(), &mut out).is_err());
        assert!(out.is_empty());
    }
}
