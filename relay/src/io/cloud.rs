//! Backend boundary: compute, database and blob-storage APIs.
//!
//! Stages only see these traits. [`crate::io::aws_cli::AwsCli`] implements
//! them against a real account; tests use the in-memory fake from
//! `test_support`.
//!
//! Mutating methods take `dry_run`. When it is set the backend must only
//! validate the request and answer with [`BackendError::DryRunSucceeded`]
//! if the request would have gone through.

use std::collections::BTreeMap;

use crate::core::filter::Filter;
use crate::core::types::{DbInstance, Image, LaunchRequest, ObjectHead, SecurityGroup, Subnet, Vpc};
use crate::error::BackendError;

pub type BackendResult<T> = Result<T, BackendError>;

pub trait Compute {
    fn describe_vpcs(&self, filters: &[Filter]) -> BackendResult<Vec<Vpc>>;

    fn describe_security_groups(&self, filters: &[Filter]) -> BackendResult<Vec<SecurityGroup>>;

    fn describe_subnets(&self, filters: &[Filter]) -> BackendResult<Vec<Subnet>>;

    /// Images owned by the calling account.
    fn describe_own_images(&self) -> BackendResult<Vec<Image>>;

    /// Launch one instance and return its id.
    fn run_instance(&self, request: &LaunchRequest, dry_run: bool) -> BackendResult<String>;

    /// Terminate instances and return the ids the backend reports as terminating.
    fn terminate_instances(&self, ids: &[String], dry_run: bool) -> BackendResult<Vec<String>>;

    fn create_tags(
        &self,
        resources: &[String],
        tags: &BTreeMap<String, String>,
        dry_run: bool,
    ) -> BackendResult<()>;
}

pub trait Database {
    /// Describe one database instance by identifier. A missing instance is
    /// reported as [`BackendError::NotFound`].
    fn describe_db_instances(&self, identifier: &str) -> BackendResult<Vec<DbInstance>>;
}

pub trait Storage {
    fn put_object(&self, bucket: &str, key: &str, body: &[u8], dry_run: bool)
    -> BackendResult<()>;

    fn get_object(&self, bucket: &str, key: &str) -> BackendResult<Vec<u8>>;

    /// Metadata-only existence check.
    fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectHead>;

    fn delete_object(&self, bucket: &str, key: &str, dry_run: bool) -> BackendResult<()>;
}

/// Backend clients for one process, constructed once and passed to stages.
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub compute: &'a dyn Compute,
    pub database: &'a dyn Database,
    pub storage: &'a dyn Storage,
}

impl<'a> Backends<'a> {
    /// Use one value for all three APIs.
    pub fn uniform<B>(backend: &'a B) -> Self
    where
        B: Compute + Database + Storage,
    {
        Self {
            compute: backend,
            database: backend,
            storage: backend,
        }
    }
}
