//! `relay instantiate`: resolve the build network and launch one instance.
//!
//! The gold master phase boots the configured base image under a fixed name.
//! The application phase boots the highest-indexed gold master image and
//! names the instance after the current index of the application image family.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::ValueEnum;
use tracing::{debug, info};

use crate::core::naming::{application_prefix, indexed_name};
use crate::core::state::PipelineState;
use crate::core::types::LaunchRequest;
use crate::gateway::Mutation;
use crate::io::env::{
    APP_NAME, BASE_IMAGE_ID, BUILD_SECURITY_GROUP, BUILD_SUBNET, BUILD_TARGET, BUILD_VPC,
    GOLD_MASTER_IMAGE_PREFIX, GOLD_MASTER_NAME,
};
use crate::task::{Stage, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Phase {
    #[value(name = "gold_master")]
    GoldMaster,
    #[value(name = "application")]
    Application,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::GoldMaster => "gold_master",
            Phase::Application => "application",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instantiate {
    pub phase: Phase,
}

impl Instantiate {
    /// Instance name and source image id for the current phase.
    fn naming(&self, ctx: &TaskContext<'_>) -> Result<(String, String)> {
        let resolver = ctx.resolver();
        match self.phase {
            Phase::GoldMaster => Ok((
                ctx.env.require(GOLD_MASTER_NAME)?.to_string(),
                ctx.env.require(BASE_IMAGE_ID)?.to_string(),
            )),
            Phase::Application => {
                let prefix = application_prefix(
                    ctx.env.require(APP_NAME)?,
                    ctx.env.require(BUILD_TARGET)?,
                );
                let index = resolver.image_index(&prefix)?;
                let instance_name = indexed_name(&prefix, index);

                let gold_prefix = ctx.env.require(GOLD_MASTER_IMAGE_PREFIX)?;
                let gold_index = resolver.image_index(gold_prefix)?;
                let image_id = resolver.image_id(&indexed_name(gold_prefix, gold_index))?;
                Ok((instance_name, image_id))
            }
        }
    }
}

impl Stage for Instantiate {
    fn name(&self) -> &'static str {
        "instantiate"
    }

    fn required_env(&self) -> Vec<&'static str> {
        let mut keys = vec![BUILD_VPC, BUILD_SECURITY_GROUP, BUILD_SUBNET];
        match self.phase {
            Phase::GoldMaster => keys.extend([GOLD_MASTER_NAME, BASE_IMAGE_ID]),
            Phase::Application => keys.extend([APP_NAME, BUILD_TARGET, GOLD_MASTER_IMAGE_PREFIX]),
        }
        keys
    }

    fn perform(&self, ctx: &TaskContext<'_>, state: &mut PipelineState) -> Result<()> {
        let resolver = ctx.resolver();

        let vpc_name = ctx.env.require(BUILD_VPC)?;
        let vpc_id = resolver.vpc_id(vpc_name)?;
        state.set("vpcid", vpc_id.as_str());

        let sg_id =
            resolver.security_group_id(ctx.env.require(BUILD_SECURITY_GROUP)?, vpc_name, &vpc_id)?;
        state.set("sgid", sg_id.as_str());

        let subnet_id = resolver.subnet_id(ctx.env.require(BUILD_SUBNET)?, &vpc_id)?;
        state.set("subnetid", subnet_id.as_str());

        state.set("phase", self.phase.as_str());

        let (instance_name, image_id) = self.naming(ctx)?;
        debug!(%instance_name, %image_id, "launch target");

        let request = LaunchRequest {
            image_id: image_id.clone(),
            instance_type: ctx.config.instance.instance_type.clone(),
            subnet_id,
            security_group_ids: vec![sg_id],
            key_name: ctx.config.instance.key_name.clone(),
        };
        let launched = ctx.gateway.mutate(self.name(), "run-instances", |dry_run| {
            ctx.backends.compute.run_instance(&request, dry_run)
        })?;

        if let Mutation::Applied(instance_id) = &launched {
            info!(%instance_id, "launched instance");
            let ids = [instance_id.clone()];
            let tags = BTreeMap::from([("Name".to_string(), instance_name.clone())]);
            ctx.gateway.mutate(self.name(), "create-tags", |dry_run| {
                ctx.backends.compute.create_tags(&ids, &tags, dry_run)
            })?;
        } else {
            info!("no instance launched, skipping Name tag");
        }

        state.set("imageid", image_id);
        state.set("instancename", instance_name);
        state.set("instanceid", launched.into_value());
        Ok(())
    }
}
