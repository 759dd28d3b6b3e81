//! `relay semaphore`: set, check, read or clear a named storage semaphore.

use anyhow::Result;
use clap::ValueEnum;
use serde_json::{Value, json};
use tracing::info;

use crate::core::naming::{SEMAPHORE_OBJECT_TYPE, object_name};
use crate::core::state::PipelineState;
use crate::io::env::S3_BUCKET;
use crate::semaphore::Semaphore;
use crate::task::{Stage, TaskContext};

pub const SEMAPHORE_KEY: &str = "semaphore";
pub const PRESENT_KEY: &str = "semaphore_present";
pub const PAYLOAD_KEY: &str = "semaphore_payload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SignalOp {
    Set,
    Check,
    Get,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub op: SignalOp,
    pub name: String,
    pub payload: Option<String>,
}

impl Signal {
    fn semaphore(&self, ctx: &TaskContext<'_>) -> Result<Semaphore> {
        let bucket = ctx.env.require(S3_BUCKET)?;
        let key = object_name(&self.name, SEMAPHORE_OBJECT_TYPE, &ctx.env.s3_prefixes()?);
        let semaphore = Semaphore::new(bucket, key);
        Ok(match &self.payload {
            Some(payload) => semaphore.with_payload(payload.as_str()),
            None => semaphore,
        })
    }
}

impl Stage for Signal {
    fn name(&self) -> &'static str {
        "semaphore"
    }

    fn required_env(&self) -> Vec<&'static str> {
        vec![S3_BUCKET]
    }

    fn perform(&self, ctx: &TaskContext<'_>, state: &mut PipelineState) -> Result<()> {
        let semaphore = self.semaphore(ctx)?;
        state.set(
            SEMAPHORE_KEY,
            json!({ "bucket": semaphore.bucket, "key": semaphore.key }),
        );

        let store = ctx.semaphores(self.name());
        match self.op {
            SignalOp::Set => {
                let outcome = store.set(&semaphore)?;
                state.set(PRESENT_KEY, outcome.map(|()| true).into_value());
            }
            SignalOp::Check => {
                let present = store.check(&semaphore)?;
                info!(%semaphore, present, "semaphore checked");
                state.set(PRESENT_KEY, present);
            }
            SignalOp::Get => {
                let payload = store.get(&semaphore)?;
                state.set(PAYLOAD_KEY, payload.map_or(Value::Null, Value::String));
            }
            SignalOp::Clear => {
                let outcome = store.clear(&semaphore)?;
                if let Some(cleared) = outcome.clone().applied() {
                    info!(%semaphore, cleared, "semaphore cleared");
                }
                state.set(PRESENT_KEY, outcome.map(|_| false).into_value());
            }
        }
        Ok(())
    }
}
