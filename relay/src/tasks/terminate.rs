//! `relay terminate`: terminate instances named on the command line or
//! launched by an earlier stage.

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::core::state::{PipelineState, is_sentinel};
use crate::error::StateError;
use crate::task::{Stage, TaskContext};

pub const INSTANCE_ID_KEY: &str = "instanceid";
pub const TERMINATED_KEY: &str = "terminated";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Terminate {
    /// Explicit ids. When non-empty, state is not consulted.
    pub instances: Vec<String>,
}

/// Ids held in state under `instanceid`, minus dry-run sentinels, and
/// whether any sentinel was skipped.
fn ids_from_state(state: &PipelineState) -> Result<(Vec<String>, bool), StateError> {
    let wrong_type = || StateError::WrongType {
        key: INSTANCE_ID_KEY.to_string(),
        expected: "an instance id or a list of instance ids",
    };
    let values: Vec<&Value> = match state.require(INSTANCE_ID_KEY)? {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    let mut ids = Vec::new();
    let mut skipped = false;
    for value in values {
        match value {
            Value::String(id) => ids.push(id.clone()),
            value if is_sentinel(value) => {
                warn!("skipping simulated instance handle");
                skipped = true;
            }
            _ => return Err(wrong_type()),
        }
    }
    Ok((ids, skipped))
}

impl Stage for Terminate {
    fn name(&self) -> &'static str {
        "terminate"
    }

    fn perform(&self, ctx: &TaskContext<'_>, state: &mut PipelineState) -> Result<()> {
        let ids = if self.instances.is_empty() {
            let (ids, skipped) = ids_from_state(state)?;
            if ids.is_empty() {
                if skipped {
                    info!("only simulated instances in state, nothing to terminate");
                    state.set(TERMINATED_KEY, Vec::<String>::new());
                    return Ok(());
                }
                return Err(StateError::Missing {
                    key: INSTANCE_ID_KEY.to_string(),
                }
                .into());
            }
            ids
        } else {
            self.instances.clone()
        };

        info!(?ids, "terminating instances");
        let outcome = ctx
            .gateway
            .mutate(self.name(), "terminate-instances", |dry_run| {
                ctx.backends.compute.terminate_instances(&ids, dry_run)
            })?;
        state.set(TERMINATED_KEY, outcome.into_value());
        Ok(())
    }
}
