//! Test-only in-memory backend.
//!
//! [`FakeCloud`] implements every backend trait over plain collections. It
//! honours `dry_run` the way the real APIs do (validate, then answer
//! `DryRunSucceeded` without mutating) and records what was mutated so tests
//! can assert on authoritative state.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::core::filter::Filter;
use crate::core::types::{
    DbEndpoint, DbInstance, Image, LaunchRequest, ObjectHead, SecurityGroup, Subnet, Tag, Vpc,
};
use crate::error::BackendError;
use crate::io::cloud::{BackendResult, Compute, Database, Storage};

/// A launched instance as seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeInstance {
    pub request: LaunchRequest,
    pub tags: BTreeMap<String, String>,
    pub terminated: bool,
}

#[derive(Debug, Clone)]
enum StoredObject {
    Body(Vec<u8>),
    DeleteMarker,
}

#[derive(Default)]
struct Inventory {
    vpcs: Vec<Vpc>,
    security_groups: Vec<SecurityGroup>,
    subnets: Vec<Subnet>,
    images: Vec<Image>,
    db_instances: Vec<DbInstance>,
    instances: BTreeMap<String, FakeInstance>,
    objects: BTreeMap<(String, String), StoredObject>,
    deleted_objects: Vec<(String, String)>,
    storage_failure: Option<BackendError>,
}

#[derive(Default)]
pub struct FakeCloud {
    inner: RefCell<Inventory>,
}

fn name_tag(name: &str) -> Vec<Tag> {
    vec![Tag {
        key: "Name".to_string(),
        value: name.to_string(),
    }]
}

fn dry_run_ok(operation: &str) -> BackendError {
    BackendError::dry_run(operation, "Request would have succeeded, but DryRun flag is set.")
}

/// True if every filter term accepts the entity. Unknown filter names match nothing.
fn matches_terms(filters: &[Filter], lookup: impl Fn(&str) -> Option<String>) -> bool {
    filters.iter().all(|filter| {
        lookup(&filter.name).is_some_and(|actual| filter.values.iter().any(|v| *v == actual))
    })
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vpc(&self, vpc_id: &str, name: &str) {
        self.inner.borrow_mut().vpcs.push(Vpc {
            vpc_id: vpc_id.to_string(),
            tags: name_tag(name),
        });
    }

    pub fn add_security_group(&self, group_id: &str, group_name: &str, vpc_id: &str) {
        self.inner.borrow_mut().security_groups.push(SecurityGroup {
            group_id: group_id.to_string(),
            group_name: group_name.to_string(),
            vpc_id: Some(vpc_id.to_string()),
        });
    }

    pub fn add_subnet(&self, subnet_id: &str, name: &str, vpc_id: &str) {
        self.inner.borrow_mut().subnets.push(Subnet {
            subnet_id: subnet_id.to_string(),
            vpc_id: Some(vpc_id.to_string()),
            tags: name_tag(name),
        });
    }

    pub fn add_image(&self, image_id: &str, name: &str) {
        self.inner.borrow_mut().images.push(Image {
            image_id: image_id.to_string(),
            name: Some(name.to_string()),
        });
    }

    pub fn add_db_instance(&self, identifier: &str, address: Option<&str>) {
        self.inner.borrow_mut().db_instances.push(DbInstance {
            identifier: identifier.to_string(),
            endpoint: address.map(|address| DbEndpoint {
                address: address.to_string(),
            }),
        });
    }

    /// Seed a running instance that was not launched through the fake.
    pub fn add_instance(&self, instance_id: &str) {
        self.inner.borrow_mut().instances.insert(
            instance_id.to_string(),
            FakeInstance {
                request: LaunchRequest {
                    image_id: "ami-seed".to_string(),
                    instance_type: "t2.micro".to_string(),
                    subnet_id: "subnet-seed".to_string(),
                    security_group_ids: Vec::new(),
                    key_name: None,
                },
                tags: BTreeMap::new(),
                terminated: false,
            },
        );
    }

    pub fn put_delete_marker(&self, bucket: &str, key: &str) {
        self.inner
            .borrow_mut()
            .objects
            .insert((bucket.to_string(), key.to_string()), StoredObject::DeleteMarker);
    }

    /// Make the next storage call fail with `err`.
    pub fn fail_storage_with(&self, err: BackendError) {
        self.inner.borrow_mut().storage_failure = Some(err);
    }

    pub fn instances(&self) -> BTreeMap<String, FakeInstance> {
        self.inner.borrow().instances.clone()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        match self
            .inner
            .borrow()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
        {
            Some(StoredObject::Body(body)) => Some(body.clone()),
            _ => None,
        }
    }

    pub fn deleted_objects(&self) -> Vec<(String, String)> {
        self.inner.borrow().deleted_objects.clone()
    }

    fn take_storage_failure(&self) -> BackendResult<()> {
        match self.inner.borrow_mut().storage_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_instances(&self, operation: &str, ids: &[String]) -> BackendResult<()> {
        let inner = self.inner.borrow();
        for id in ids {
            if !inner.instances.contains_key(id) {
                return Err(BackendError::failed(
                    operation,
                    format!("InvalidInstanceID.NotFound: {id}"),
                ));
            }
        }
        Ok(())
    }
}

impl Compute for FakeCloud {
    fn describe_vpcs(&self, filters: &[Filter]) -> BackendResult<Vec<Vpc>> {
        let inner = self.inner.borrow();
        Ok(inner
            .vpcs
            .iter()
            .filter(|vpc| {
                matches_terms(filters, |name| match name {
                    "tag:Name" => vpc.name().map(str::to_string),
                    "vpc-id" => Some(vpc.vpc_id.clone()),
                    _ => None,
                })
            })
            .cloned()
            .collect())
    }

    fn describe_security_groups(&self, filters: &[Filter]) -> BackendResult<Vec<SecurityGroup>> {
        let inner = self.inner.borrow();
        Ok(inner
            .security_groups
            .iter()
            .filter(|group| {
                matches_terms(filters, |name| match name {
                    "vpc-id" => group.vpc_id.clone(),
                    "group-name" => Some(group.group_name.clone()),
                    _ => None,
                })
            })
            .cloned()
            .collect())
    }

    fn describe_subnets(&self, filters: &[Filter]) -> BackendResult<Vec<Subnet>> {
        let inner = self.inner.borrow();
        Ok(inner
            .subnets
            .iter()
            .filter(|subnet| {
                matches_terms(filters, |name| match name {
                    "tag:Name" => subnet.name().map(str::to_string),
                    "vpc-id" => subnet.vpc_id.clone(),
                    _ => None,
                })
            })
            .cloned()
            .collect())
    }

    fn describe_own_images(&self) -> BackendResult<Vec<Image>> {
        Ok(self.inner.borrow().images.clone())
    }

    fn run_instance(&self, request: &LaunchRequest, dry_run: bool) -> BackendResult<String> {
        if dry_run {
            return Err(dry_run_ok("run-instances"));
        }
        let mut inner = self.inner.borrow_mut();
        let id = format!("i-{:04}", inner.instances.len() + 1);
        inner.instances.insert(
            id.clone(),
            FakeInstance {
                request: request.clone(),
                tags: BTreeMap::new(),
                terminated: false,
            },
        );
        Ok(id)
    }

    fn terminate_instances(&self, ids: &[String], dry_run: bool) -> BackendResult<Vec<String>> {
        self.require_instances("terminate-instances", ids)?;
        if dry_run {
            return Err(dry_run_ok("terminate-instances"));
        }
        let mut inner = self.inner.borrow_mut();
        for id in ids {
            if let Some(instance) = inner.instances.get_mut(id) {
                instance.terminated = true;
            }
        }
        let mut terminated = ids.to_vec();
        terminated.sort();
        Ok(terminated)
    }

    fn create_tags(
        &self,
        resources: &[String],
        tags: &BTreeMap<String, String>,
        dry_run: bool,
    ) -> BackendResult<()> {
        self.require_instances("create-tags", resources)?;
        if dry_run {
            return Err(dry_run_ok("create-tags"));
        }
        let mut inner = self.inner.borrow_mut();
        for id in resources {
            if let Some(instance) = inner.instances.get_mut(id) {
                instance
                    .tags
                    .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        Ok(())
    }
}

impl Database for FakeCloud {
    fn describe_db_instances(&self, identifier: &str) -> BackendResult<Vec<DbInstance>> {
        let found: Vec<_> = self
            .inner
            .borrow()
            .db_instances
            .iter()
            .filter(|db| db.identifier == identifier)
            .cloned()
            .collect();
        if found.is_empty() {
            return Err(BackendError::not_found(
                "describe-db-instances",
                format!("DBInstanceNotFound: {identifier}"),
            ));
        }
        Ok(found)
    }
}

impl Storage for FakeCloud {
    fn put_object(&self, bucket: &str, key: &str, body: &[u8], dry_run: bool) -> BackendResult<()> {
        self.take_storage_failure()?;
        if dry_run {
            return Err(dry_run_ok("put-object"));
        }
        self.inner.borrow_mut().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject::Body(body.to_vec()),
        );
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> BackendResult<Vec<u8>> {
        self.take_storage_failure()?;
        self.object(bucket, key)
            .ok_or_else(|| BackendError::not_found("get-object", "NoSuchKey"))
    }

    fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectHead> {
        self.take_storage_failure()?;
        match self
            .inner
            .borrow()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
        {
            Some(StoredObject::Body(_)) => Ok(ObjectHead {
                delete_marker: false,
            }),
            Some(StoredObject::DeleteMarker) => Ok(ObjectHead {
                delete_marker: true,
            }),
            None => Err(BackendError::not_found("head-object", "404 Not Found")),
        }
    }

    fn delete_object(&self, bucket: &str, key: &str, dry_run: bool) -> BackendResult<()> {
        self.take_storage_failure()?;
        if dry_run {
            return Err(dry_run_ok("delete-object"));
        }
        let mut inner = self.inner.borrow_mut();
        let address = (bucket.to_string(), key.to_string());
        inner.objects.remove(&address);
        inner.deleted_objects.push(address);
        Ok(())
    }
}
