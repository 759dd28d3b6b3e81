//! `relay endpoint`: record the address of a database instance.

use anyhow::Result;
use tracing::info;

use crate::core::state::PipelineState;
use crate::task::{Stage, TaskContext};

pub const DB_ENDPOINT_KEY: &str = "dbendpoint";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub db: String,
}

impl Stage for Endpoint {
    fn name(&self) -> &'static str {
        "endpoint"
    }

    fn perform(&self, ctx: &TaskContext<'_>, state: &mut PipelineState) -> Result<()> {
        let address = ctx.resolver().db_endpoint(&self.db)?;
        info!(db = %self.db, %address, "database endpoint");
        state.set(DB_ENDPOINT_KEY, address);
        Ok(())
    }
}
