//! Resource resolver: name lookups that must match exactly one entity.

use regex::Regex;
use tracing::{debug, instrument};

use crate::core::filter::{LookupFilter, Refinement, exactly_one};
use crate::core::image_index::max_image_index;
use crate::error::{BackendError, RelayError};
use crate::io::cloud::{Compute, Database};

pub struct ResourceResolver<'a> {
    compute: &'a dyn Compute,
    database: &'a dyn Database,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(compute: &'a dyn Compute, database: &'a dyn Database) -> Self {
        Self { compute, database }
    }

    /// VPC id for the VPC tagged `Name={vpc_name}`.
    #[instrument(skip(self))]
    pub fn vpc_id(&self, vpc_name: &str) -> Result<String, RelayError> {
        let filter = LookupFilter::new("vpc").with_term("tag:Name", vpc_name);
        let vpcs = self.compute.describe_vpcs(filter.terms())?;
        let vpc = exactly_one(&filter, vpcs)?;
        debug!(vpc_id = %vpc.vpc_id, "resolved vpc");
        Ok(vpc.vpc_id)
    }

    /// Security group id within `vpc_id` whose name starts with
    /// `{vpc_name}-{group_name}-`. The compute API cannot filter on a name
    /// prefix, so candidates are narrowed in process.
    #[instrument(skip(self))]
    pub fn security_group_id(
        &self,
        group_name: &str,
        vpc_name: &str,
        vpc_id: &str,
    ) -> Result<String, RelayError> {
        let pattern = Regex::new(&format!(
            "^{}-{}-",
            regex::escape(vpc_name),
            regex::escape(group_name)
        ))
        .map_err(|err| RelayError::InvalidConfig(format!("security group pattern: {err}")))?;
        let filter = LookupFilter::new("security group")
            .with_term("vpc-id", vpc_id)
            .refined_by(Refinement::NameMatches(pattern));

        let groups: Vec<_> = self
            .compute
            .describe_security_groups(filter.terms())?
            .into_iter()
            .filter(|group| filter.accepts(Some(&group.group_name)))
            .collect();
        let group = exactly_one(&filter, groups)?;
        debug!(group_id = %group.group_id, group_name = %group.group_name, "resolved security group");
        Ok(group.group_id)
    }

    #[instrument(skip(self))]
    pub fn subnet_id(&self, subnet_name: &str, vpc_id: &str) -> Result<String, RelayError> {
        let filter = LookupFilter::new("subnet")
            .with_term("vpc-id", vpc_id)
            .with_term("tag:Name", subnet_name);
        let subnets = self.compute.describe_subnets(filter.terms())?;
        let subnet = exactly_one(&filter, subnets)?;
        debug!(subnet_id = %subnet.subnet_id, "resolved subnet");
        Ok(subnet.subnet_id)
    }

    /// Id of the caller-owned image named exactly `image_name`.
    #[instrument(skip(self))]
    pub fn image_id(&self, image_name: &str) -> Result<String, RelayError> {
        let filter = LookupFilter::new("image")
            .refined_by(Refinement::NameEquals(image_name.to_string()));
        let images: Vec<_> = self
            .compute
            .describe_own_images()?
            .into_iter()
            .filter(|image| filter.accepts(image.name.as_deref()))
            .collect();
        let image = exactly_one(&filter, images)?;
        debug!(image_id = %image.image_id, "resolved image");
        Ok(image.image_id)
    }

    /// Current index of the caller-owned image family named `{prefix}...N`.
    #[instrument(skip(self))]
    pub fn image_index(&self, prefix: &str) -> Result<u64, RelayError> {
        let images = self.compute.describe_own_images()?;
        let index = max_image_index(images.iter().filter_map(|image| image.name.as_deref()), prefix);
        debug!(index, "image index");
        Ok(index)
    }

    /// Endpoint address of the database instance `identifier`.
    #[instrument(skip(self))]
    pub fn db_endpoint(&self, identifier: &str) -> Result<String, RelayError> {
        let filter = LookupFilter::new("database instance").with_term("db-instance-id", identifier);
        let instances = match self.database.describe_db_instances(identifier) {
            Ok(instances) => instances,
            Err(BackendError::NotFound { .. }) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        let instance = exactly_one(&filter, instances)?;
        let endpoint = instance.endpoint.ok_or_else(|| {
            RelayError::Backend(BackendError::failed(
                "describe-db-instances",
                format!("database instance '{identifier}' has no endpoint yet"),
            ))
        })?;
        debug!(address = %endpoint.address, "resolved database endpoint");
        Ok(endpoint.address)
    }
}
