//! CloudFormation stack operations
//!
//! Template rendering, create-or-update, and status polling with a deadline.

use crate::error::{AwsError, Result};
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::types::{Capability, OnFailure};
use serde_json::{Map, Value, json};
use siteflow_cloud::ResourceConfig;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Prefix of the extra outputs that expose each resource's physical id
pub const REF_OUTPUT_PREFIX: &str = "Ref";

/// How long to wait for a stack operation, and how often to look
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(30 * 60),
        }
    }
}

/// Coarse classification of a stack status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    InProgress,
    Complete,
    Deleted,
    Failed,
}

pub fn classify(status: &str) -> StackPhase {
    match status {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => StackPhase::Complete,
        "DELETE_COMPLETE" => StackPhase::Deleted,
        s if s.ends_with("_IN_PROGRESS") => StackPhase::InProgress,
        // ROLLBACK_COMPLETE, UPDATE_ROLLBACK_COMPLETE and every *_FAILED
        _ => StackPhase::Failed,
    }
}

/// Snapshot of a stack
#[derive(Debug, Clone, Default)]
pub struct StackInfo {
    pub status: String,
    pub reason: Option<String>,
    pub outputs: BTreeMap<String, String>,
}

impl StackInfo {
    /// Declared outputs, without the physical-id outputs
    pub fn user_outputs(&self) -> BTreeMap<String, String> {
        self.outputs
            .iter()
            .filter(|(k, _)| !k.starts_with(REF_OUTPUT_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Logical id to physical id, read from the `Ref<id>` outputs
    pub fn physical_ids(&self) -> BTreeMap<String, String> {
        self.outputs
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(REF_OUTPUT_PREFIX)
                    .map(|id| (id.to_string(), v.clone()))
            })
            .collect()
    }
}

/// Whether the stack was changed by [`StackClient::create_or_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackChange {
    Created,
    Updated,
    Unchanged,
}

/// Render a CloudFormation template from provider resource configs.
///
/// Each config carries `Properties` and optional deletion policies. Every
/// resource also gets a `Ref<id>` output so physical ids can be read back
/// from `DescribeStacks` alone.
pub fn render_template<'a>(
    description: &str,
    resources: impl IntoIterator<Item = &'a ResourceConfig>,
    outputs: &BTreeMap<String, Value>,
) -> Value {
    let mut rendered_resources = Map::new();
    let mut rendered_outputs = Map::new();

    for resource in resources {
        let mut body = Map::new();
        body.insert("Type".to_string(), json!(resource.resource_type));
        body.insert(
            "Properties".to_string(),
            resource.config.get("Properties").cloned().unwrap_or(json!({})),
        );
        for key in ["DeletionPolicy", "UpdateReplacePolicy"] {
            if let Some(policy) = resource.config.get(key) {
                body.insert(key.to_string(), policy.clone());
            }
        }
        if !resource.depends_on.is_empty() {
            body.insert("DependsOn".to_string(), json!(resource.depends_on));
        }
        rendered_resources.insert(resource.id.clone(), Value::Object(body));

        rendered_outputs.insert(
            format!("{}{}", REF_OUTPUT_PREFIX, resource.id),
            json!({ "Value": { "Ref": resource.id } }),
        );
    }

    for (name, value) in outputs {
        rendered_outputs.insert(name.clone(), json!({ "Value": value }));
    }

    json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": description,
        "Resources": rendered_resources,
        "Outputs": rendered_outputs,
    })
}

pub struct StackClient {
    client: Client,
}

impl StackClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Current stack snapshot, or `None` if the stack does not exist
    pub async fn describe(&self, name: &str) -> Result<Option<StackInfo>> {
        let response = match self.client.describe_stacks().stack_name(name).send().await {
            Ok(response) => response,
            Err(e) => {
                let message = format!("{:?}", e);
                if message.contains("does not exist") {
                    return Ok(None);
                }
                return Err(AwsError::CloudFormation(message));
            }
        };

        let Some(stack) = response.stacks().first() else {
            return Ok(None);
        };

        let outputs = stack
            .outputs()
            .iter()
            .filter_map(|o| match (o.output_key(), o.output_value()) {
                (Some(k), Some(v)) => Some((k.to_string(), v.to_string())),
                _ => None,
            })
            .collect();

        Ok(Some(StackInfo {
            status: stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            reason: stack.stack_status_reason().map(|s| s.to_string()),
            outputs,
        }))
    }

    pub async fn create_or_update(&self, name: &str, body: &str) -> Result<StackChange> {
        let exists = self
            .describe(name)
            .await?
            .is_some_and(|s| classify(&s.status) != StackPhase::Deleted);

        if exists {
            tracing::info!(stack = name, "Updating stack");
            match self
                .client
                .update_stack()
                .stack_name(name)
                .template_body(body)
                .capabilities(Capability::CapabilityIam)
                .send()
                .await
            {
                Ok(_) => Ok(StackChange::Updated),
                Err(e) => {
                    let message = format!("{:?}", e);
                    if message.contains("No updates are to be performed") {
                        tracing::info!(stack = name, "Stack already up to date");
                        return Ok(StackChange::Unchanged);
                    }
                    Err(AwsError::CloudFormation(message))
                }
            }
        } else {
            tracing::info!(stack = name, "Creating stack");
            self.client
                .create_stack()
                .stack_name(name)
                .template_body(body)
                .capabilities(Capability::CapabilityIam)
                .on_failure(OnFailure::Delete)
                .send()
                .await
                .map_err(|e| AwsError::CloudFormation(format!("{:?}", e)))?;
            Ok(StackChange::Created)
        }
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        tracing::info!(stack = name, "Deleting stack");
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| AwsError::CloudFormation(format!("{:?}", e)))?;
        Ok(())
    }

    /// Poll until the stack settles. Returns `None` once the stack is gone.
    pub async fn wait(&self, name: &str, options: WaitOptions) -> Result<Option<StackInfo>> {
        let started = Instant::now();
        loop {
            let Some(info) = self.describe(name).await? else {
                return Ok(None);
            };

            match classify(&info.status) {
                StackPhase::Complete => return Ok(Some(info)),
                StackPhase::Deleted => return Ok(None),
                StackPhase::Failed => {
                    return Err(AwsError::StackFailed {
                        stack: name.to_string(),
                        reason: info
                            .reason
                            .clone()
                            .unwrap_or_else(|| "no reason reported".to_string()),
                        status: info.status,
                    });
                }
                StackPhase::InProgress => {
                    tracing::debug!(stack = name, status = %info.status, "Waiting for stack");
                }
            }

            if started.elapsed() >= options.deadline {
                return Err(AwsError::Timeout {
                    stack: name.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(options.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("CREATE_COMPLETE"), StackPhase::Complete);
        assert_eq!(classify("UPDATE_COMPLETE"), StackPhase::Complete);
        assert_eq!(classify("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"), StackPhase::InProgress);
        assert_eq!(classify("CREATE_IN_PROGRESS"), StackPhase::InProgress);
        assert_eq!(classify("DELETE_COMPLETE"), StackPhase::Deleted);
        assert_eq!(classify("ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(classify("UPDATE_ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(classify("CREATE_FAILED"), StackPhase::Failed);
    }

    #[test]
    fn test_render_template() {
        let bucket = ResourceConfig::new(
            "AWS::S3::Bucket",
            "WebsiteBucket",
            "aws",
            json!({
                "Properties": { "WebsiteConfiguration": { "IndexDocument": "index.html" } },
                "DeletionPolicy": "Retain",
            }),
        );
        let distribution = ResourceConfig::new(
            "AWS::CloudFront::Distribution",
            "WebsiteDistribution",
            "aws",
            json!({ "Properties": {} }),
        )
        .with_dependency("WebsiteBucket");

        let mut outputs = BTreeMap::new();
        outputs.insert(
            "BucketURL".to_string(),
            json!({ "Fn::GetAtt": ["WebsiteBucket", "WebsiteURL"] }),
        );

        let template = render_template("demo", [&bucket, &distribution], &outputs);
        assert_eq!(template["Resources"]["WebsiteBucket"]["DeletionPolicy"], "Retain");
        assert!(template["Resources"]["WebsiteBucket"].get("DependsOn").is_none());
        assert_eq!(
            template["Resources"]["WebsiteDistribution"]["DependsOn"],
            json!(["WebsiteBucket"])
        );
        assert_eq!(
            template["Outputs"]["RefWebsiteBucket"]["Value"],
            json!({ "Ref": "WebsiteBucket" })
        );
        assert!(template["Outputs"].get("BucketURL").is_some());
    }

    #[test]
    fn test_stack_info_splits_outputs() {
        let mut info = StackInfo::default();
        info.outputs
            .insert("CloudFrontURL".to_string(), "https://d1.cloudfront.net".to_string());
        info.outputs
            .insert("RefWebsiteBucket".to_string(), "demo-bucket-1".to_string());

        assert_eq!(info.user_outputs().len(), 1);
        assert_eq!(info.physical_ids()["WebsiteBucket"], "demo-bucket-1");
    }
}
