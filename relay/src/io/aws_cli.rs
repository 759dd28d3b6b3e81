//! Backend adapter that drives the `aws` command-line client.
//!
//! Every call spawns `aws <service> <operation> --output json ...` through
//! [`run_command_with_timeout`] and decodes the JSON response. Failures are
//! classified from the CLI's stderr: dry-run validation, not-found, or a
//! plain failure carrying the CLI message.

use std::collections::BTreeMap;
use std::fs;
use std::process::Command;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::filter::Filter;
use crate::core::types::{DbInstance, Image, LaunchRequest, ObjectHead, SecurityGroup, Subnet, Vpc};
use crate::error::BackendError;
use crate::io::cloud::{BackendResult, Compute, Database, Storage};
use crate::io::config::AwsConfig;
use crate::io::process::run_command_with_timeout;

const NOT_FOUND_MARKERS: &[&str] = &["(404)", "Not Found", "(NoSuchKey)", "(DBInstanceNotFound)"];
const DRY_RUN_MARKER: &str = "(DryRunOperation)";

pub struct AwsCli {
    config: AwsConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcsResponse {
    #[serde(default)]
    vpcs: Vec<Vpc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupsResponse {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubnetsResponse {
    #[serde(default)]
    subnets: Vec<Subnet>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImagesResponse {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceRef {
    instance_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesResponse {
    #[serde(default)]
    instances: Vec<InstanceRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TerminateInstancesResponse {
    #[serde(default)]
    terminating_instances: Vec<InstanceRef>,
}

#[derive(Deserialize)]
struct DbInstancesResponse {
    #[serde(rename = "DBInstances", default)]
    db_instances: Vec<DbInstance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HeadObjectResponse {
    #[serde(default)]
    delete_marker: Option<bool>,
}

impl AwsCli {
    pub fn new(config: AwsConfig) -> Self {
        Self { config }
    }

    /// Leading arguments shared by every call.
    fn base_args(&self, service: &str, operation: &str) -> Vec<String> {
        let mut args = vec![
            service.to_string(),
            operation.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(region) = &self.config.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &self.config.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    #[instrument(skip(self, args))]
    fn invoke(&self, service: &str, operation: &str, args: Vec<String>) -> BackendResult<String> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.base_args(service, operation)).args(&args);

        let output = run_command_with_timeout(
            cmd,
            self.config.command_timeout(),
            self.config.output_limit_bytes,
        )
        .map_err(|err| BackendError::failed(operation, format!("{err:#}")))?;

        if output.timed_out {
            return Err(BackendError::failed(
                operation,
                format!("timed out after {}s", self.config.command_timeout_secs),
            ));
        }
        if !output.status.success() {
            return Err(classify_failure(operation, &output.stderr_lossy()));
        }
        debug!("aws call succeeded");
        Ok(output.stdout_lossy())
    }

    fn invoke_json<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        args: Vec<String>,
    ) -> BackendResult<T> {
        let stdout = self.invoke(service, operation, args)?;
        serde_json::from_str(&stdout)
            .map_err(|err| BackendError::failed(operation, format!("decode response: {err}")))
    }

    /// Storage writes have no native dry-run, so validate by checking the
    /// bucket and report validation-only success.
    fn validate_bucket(&self, operation: &str, bucket: &str) -> BackendResult<()> {
        self.invoke(
            "s3api",
            "head-bucket",
            vec!["--bucket".to_string(), bucket.to_string()],
        )?;
        Err(BackendError::dry_run(
            operation,
            format!("bucket '{bucket}' is reachable; write skipped"),
        ))
    }
}

/// Map CLI stderr to a backend error kind.
pub fn classify_failure(operation: &str, stderr: &str) -> BackendError {
    if stderr.contains(DRY_RUN_MARKER) {
        return BackendError::dry_run(operation, stderr);
    }
    if NOT_FOUND_MARKERS.iter().any(|marker| stderr.contains(marker)) {
        return BackendError::not_found(operation, stderr);
    }
    let message = if stderr.is_empty() {
        "aws exited unsuccessfully with no output".to_string()
    } else {
        stderr.to_string()
    };
    BackendError::failed(operation, message)
}

fn filter_args(filters: &[Filter]) -> BackendResult<Vec<String>> {
    if filters.is_empty() {
        return Ok(Vec::new());
    }
    let encoded = serde_json::to_string(filters)
        .map_err(|err| BackendError::failed("encode filters", err.to_string()))?;
    Ok(vec!["--filters".to_string(), encoded])
}

fn dry_run_flag(dry_run: bool) -> String {
    let flag = if dry_run { "--dry-run" } else { "--no-dry-run" };
    flag.to_string()
}

fn bucket_key_args(bucket: &str, key: &str) -> Vec<String> {
    vec![
        "--bucket".to_string(),
        bucket.to_string(),
        "--key".to_string(),
        key.to_string(),
    ]
}

impl Compute for AwsCli {
    fn describe_vpcs(&self, filters: &[Filter]) -> BackendResult<Vec<Vpc>> {
        let response: VpcsResponse = self.invoke_json("ec2", "describe-vpcs", filter_args(filters)?)?;
        Ok(response.vpcs)
    }

    fn describe_security_groups(&self, filters: &[Filter]) -> BackendResult<Vec<SecurityGroup>> {
        let response: SecurityGroupsResponse =
            self.invoke_json("ec2", "describe-security-groups", filter_args(filters)?)?;
        Ok(response.security_groups)
    }

    fn describe_subnets(&self, filters: &[Filter]) -> BackendResult<Vec<Subnet>> {
        let response: SubnetsResponse =
            self.invoke_json("ec2", "describe-subnets", filter_args(filters)?)?;
        Ok(response.subnets)
    }

    fn describe_own_images(&self) -> BackendResult<Vec<Image>> {
        let response: ImagesResponse = self.invoke_json(
            "ec2",
            "describe-images",
            vec!["--owners".to_string(), "self".to_string()],
        )?;
        Ok(response.images)
    }

    fn run_instance(&self, request: &LaunchRequest, dry_run: bool) -> BackendResult<String> {
        let mut args = vec![
            "--image-id".to_string(),
            request.image_id.clone(),
            "--instance-type".to_string(),
            request.instance_type.clone(),
            "--subnet-id".to_string(),
            request.subnet_id.clone(),
            "--count".to_string(),
            "1".to_string(),
        ];
        if !request.security_group_ids.is_empty() {
            args.push("--security-group-ids".to_string());
            args.extend(request.security_group_ids.iter().cloned());
        }
        if let Some(key_name) = &request.key_name {
            args.push("--key-name".to_string());
            args.push(key_name.clone());
        }
        args.push(dry_run_flag(dry_run));

        let response: RunInstancesResponse = self.invoke_json("ec2", "run-instances", args)?;
        response
            .instances
            .into_iter()
            .next()
            .map(|instance| instance.instance_id)
            .ok_or_else(|| BackendError::failed("run-instances", "response listed no instances"))
    }

    fn terminate_instances(&self, ids: &[String], dry_run: bool) -> BackendResult<Vec<String>> {
        let mut args = vec!["--instance-ids".to_string()];
        args.extend(ids.iter().cloned());
        args.push(dry_run_flag(dry_run));

        let response: TerminateInstancesResponse =
            self.invoke_json("ec2", "terminate-instances", args)?;
        let mut terminated: Vec<String> = response
            .terminating_instances
            .into_iter()
            .map(|instance| instance.instance_id)
            .collect();
        terminated.sort();
        Ok(terminated)
    }

    fn create_tags(
        &self,
        resources: &[String],
        tags: &BTreeMap<String, String>,
        dry_run: bool,
    ) -> BackendResult<()> {
        let tag_list: Vec<_> = tags
            .iter()
            .map(|(key, value)| json!({"Key": key, "Value": value}))
            .collect();
        let mut args = vec!["--resources".to_string()];
        args.extend(resources.iter().cloned());
        args.push("--tags".to_string());
        args.push(serde_json::Value::Array(tag_list).to_string());
        args.push(dry_run_flag(dry_run));

        self.invoke("ec2", "create-tags", args)?;
        Ok(())
    }
}

impl Database for AwsCli {
    fn describe_db_instances(&self, identifier: &str) -> BackendResult<Vec<DbInstance>> {
        let response: DbInstancesResponse = self.invoke_json(
            "rds",
            "describe-db-instances",
            vec![
                "--db-instance-identifier".to_string(),
                identifier.to_string(),
            ],
        )?;
        Ok(response.db_instances)
    }
}

impl Storage for AwsCli {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        dry_run: bool,
    ) -> BackendResult<()> {
        if dry_run {
            return self.validate_bucket("put-object", bucket);
        }
        let body_file = tempfile::NamedTempFile::new()
            .map_err(|err| BackendError::failed("put-object", format!("create body file: {err}")))?;
        fs::write(body_file.path(), body)
            .map_err(|err| BackendError::failed("put-object", format!("write body file: {err}")))?;

        let mut args = bucket_key_args(bucket, key);
        args.push("--body".to_string());
        args.push(body_file.path().display().to_string());
        self.invoke("s3api", "put-object", args)?;
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> BackendResult<Vec<u8>> {
        let out_dir = tempfile::tempdir()
            .map_err(|err| BackendError::failed("get-object", format!("create temp dir: {err}")))?;
        let out_path = out_dir.path().join("object");

        let mut args = bucket_key_args(bucket, key);
        args.push(out_path.display().to_string());
        self.invoke("s3api", "get-object", args)?;

        fs::read(&out_path)
            .map_err(|err| BackendError::failed("get-object", format!("read downloaded object: {err}")))
    }

    fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectHead> {
        let response: HeadObjectResponse =
            self.invoke_json("s3api", "head-object", bucket_key_args(bucket, key))?;
        Ok(ObjectHead {
            delete_marker: response.delete_marker.unwrap_or(false),
        })
    }

    fn delete_object(&self, bucket: &str, key: &str, dry_run: bool) -> BackendResult<()> {
        if dry_run {
            return self.validate_bucket("delete-object", bucket);
        }
        self.invoke("s3api", "delete-object", bucket_key_args(bucket, key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_stderr_is_recognised() {
        let stderr = "An error occurred (DryRunOperation) when calling the RunInstances operation: Request would have succeeded, but DryRun flag is set.";
        assert!(matches!(
            classify_failure("run-instances", stderr),
            BackendError::DryRunSucceeded { .. }
        ));
    }

    #[test]
    fn missing_objects_are_not_found() {
        for stderr in [
            "An error occurred (404) when calling the HeadObject operation: Not Found",
            "An error occurred (NoSuchKey) when calling the GetObject operation: The specified key does not exist.",
            "An error occurred (DBInstanceNotFound) when calling the DescribeDBInstances operation: DBInstance orders not found.",
        ] {
            assert!(classify_failure("op", stderr).is_not_found(), "{stderr}");
        }
    }

    #[test]
    fn other_errors_keep_the_message() {
        let err = classify_failure(
            "terminate-instances",
            "An error occurred (UnauthorizedOperation) when calling the TerminateInstances operation",
        );
        assert!(matches!(err, BackendError::Failed { .. }));
        assert!(err.to_string().contains("UnauthorizedOperation"));
    }

    #[test]
    fn base_args_include_region_and_profile() {
        let cli = AwsCli::new(AwsConfig {
            region: Some("eu-west-1".to_string()),
            profile: Some("build".to_string()),
            ..AwsConfig::default()
        });
        assert_eq!(
            cli.base_args("ec2", "describe-vpcs"),
            vec![
                "ec2",
                "describe-vpcs",
                "--output",
                "json",
                "--region",
                "eu-west-1",
                "--profile",
                "build"
            ]
        );
    }

    #[test]
    fn filters_encode_as_json_list() {
        let args = filter_args(&[Filter::new("tag:Name", "build")]).expect("encode");
        assert_eq!(
            args,
            vec!["--filters", r#"[{"Name":"tag:Name","Values":["build"]}]"#]
        );
        assert!(filter_args(&[]).expect("encode").is_empty());
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn write_script(dir: &Path, body: &str) -> String {
            let path = dir.join("aws");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
            let mut perms = fs::metadata(&path).expect("metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).expect("chmod");
            path.display().to_string()
        }

        fn cli_for(program: String) -> AwsCli {
            AwsCli::new(AwsConfig {
                program,
                ..AwsConfig::default()
            })
        }

        #[test]
        fn describe_vpcs_decodes_response() {
            let temp = tempfile::tempdir().expect("tempdir");
            let program = write_script(
                temp.path(),
                r#"echo '{"Vpcs":[{"VpcId":"vpc-9","Tags":[{"Key":"Name","Value":"build"}]}]}'"#,
            );
            let vpcs = cli_for(program).describe_vpcs(&[]).expect("describe");
            assert_eq!(vpcs.len(), 1);
            assert_eq!(vpcs[0].vpc_id, "vpc-9");
        }

        #[test]
        fn dry_run_failure_exit_maps_to_dry_run() {
            let temp = tempfile::tempdir().expect("tempdir");
            let program = write_script(
                temp.path(),
                "echo 'An error occurred (DryRunOperation) when calling the TerminateInstances operation' >&2\nexit 254",
            );
            let err = cli_for(program)
                .terminate_instances(&["i-1".to_string()], true)
                .expect_err("dry run");
            assert!(matches!(err, BackendError::DryRunSucceeded { .. }));
        }

        #[test]
        fn simulated_put_checks_bucket_only() {
            let temp = tempfile::tempdir().expect("tempdir");
            let calls = temp.path().join("calls.log");
            let program = write_script(
                temp.path(),
                &format!(
                    "echo \"$2\" >> '{}'\ncase \"$2\" in\n  head-bucket) exit 0 ;;\n  *) echo \"unexpected $2\" >&2; exit 1 ;;\nesac",
                    calls.display()
                ),
            );

            let err = cli_for(program)
                .put_object("builds", "relay/semaphores/ready", b"ami-42", true)
                .expect_err("dry run");
            assert!(matches!(
                err,
                BackendError::DryRunSucceeded { ref operation, .. } if operation == "put-object"
            ));
            assert_eq!(fs::read_to_string(&calls).expect("calls"), "head-bucket\n");
        }

        #[test]
        fn simulated_put_on_missing_bucket_fails() {
            let temp = tempfile::tempdir().expect("tempdir");
            let program = write_script(
                temp.path(),
                "echo 'An error occurred (403) when calling the HeadBucket operation: Forbidden' >&2\nexit 254",
            );
            let err = cli_for(program)
                .put_object("builds", "key", b"", true)
                .expect_err("bucket check fails");
            assert!(matches!(err, BackendError::Failed { .. }));
        }

        #[test]
        fn put_object_uploads_body_file() {
            let temp = tempfile::tempdir().expect("tempdir");
            let uploaded = temp.path().join("uploaded");
            let program = write_script(
                temp.path(),
                &format!(
                    "while [ $# -gt 0 ]; do\n  if [ \"$1\" = --body ]; then cp \"$2\" '{}'; fi\n  shift\ndone\necho '{{\"ETag\": \"x\"}}'",
                    uploaded.display()
                ),
            );

            cli_for(program)
                .put_object("builds", "relay/semaphores/ready", b"ami-42", false)
                .expect("put");
            assert_eq!(fs::read(&uploaded).expect("uploaded"), b"ami-42");
        }

        #[test]
        fn get_object_reads_downloaded_body() {
            let temp = tempfile::tempdir().expect("tempdir");
            let program = write_script(
                temp.path(),
                "for last; do :; done\nprintf 'ami-42' > \"$last\"\necho '{\"ContentLength\": 6}'",
            );
            let body = cli_for(program)
                .get_object("builds", "relay/semaphores/ready")
                .expect("get");
            assert_eq!(body, b"ami-42");
        }

        #[test]
        fn head_object_missing_is_not_found() {
            let temp = tempfile::tempdir().expect("tempdir");
            let program = write_script(
                temp.path(),
                "echo 'An error occurred (404) when calling the HeadObject operation: Not Found' >&2\nexit 254",
            );
            let err = cli_for(program)
                .head_object("builds", "relay/semaphores/ready")
                .expect_err("missing");
            assert!(err.is_not_found());
        }

        #[test]
        fn head_object_decodes_delete_marker() {
            let temp = tempfile::tempdir().expect("tempdir");
            let program = write_script(temp.path(), r#"echo '{"DeleteMarker": true}'"#);
            let head = cli_for(program)
                .head_object("builds", "relay/semaphores/ready")
                .expect("head");
            assert!(head.delete_marker);
        }
    }
}
