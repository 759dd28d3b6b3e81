//! `relay stub`: bumps a counter in state to exercise stage chaining.

use anyhow::Result;
use tracing::info;

use crate::core::state::PipelineState;
use crate::error::StateError;
use crate::task::{Stage, TaskContext};

pub const MESSAGE_KEY: &str = "message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stub {
    pub increment: i64,
}

impl Default for Stub {
    fn default() -> Self {
        Self { increment: 1 }
    }
}

impl Stage for Stub {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn perform(&self, _ctx: &TaskContext<'_>, state: &mut PipelineState) -> Result<()> {
        let old = state.get_i64(MESSAGE_KEY)?;
        info!("old message: {old:?}");

        let new = match old {
            Some(message) => {
                message
                    .checked_add(self.increment)
                    .ok_or_else(|| StateError::Overflow {
                        key: MESSAGE_KEY.to_string(),
                    })?
            }
            None => self.increment,
        };
        state.set(MESSAGE_KEY, new);
        info!("new message: {new}");
        Ok(())
    }
}
