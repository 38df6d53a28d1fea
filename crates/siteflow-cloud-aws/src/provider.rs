//! AWS provider implementation
//!
//! Bucket, policy and distribution are deployed as one CloudFormation stack.
//! The content sync runs after the stack settles, straight against S3 and
//! CloudFront.

use crate::error::{AwsError, Result};
use crate::stack::{StackChange, StackClient, StackInfo, WaitOptions, render_template};
use crate::sync::{ContentSync, ManifestEntry, invalidate};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use serde_json::{Value, json};
use siteflow_cloud::types::{BUCKET_TYPE, CONTENT_SYNC_TYPE, has_auto_delete_tag};
use siteflow_cloud::{
    Action, ActionType, ApplyResult, AuthStatus, CloudError, CloudProvider, GlobalState, Plan,
    ProviderState, ResourceConfig, ResourceSet, ResourceState, StateManager, plan_changes,
};
use std::collections::BTreeMap;
use std::path::Path;

pub const PROVIDER_NAME: &str = "aws";
pub const DEFAULT_REGION: &str = "us-east-1";

pub struct AwsProvider {
    stack_name: String,
    region: String,
    state: StateManager,
    stack: StackClient,
    s3: aws_sdk_s3::Client,
    cloudfront: aws_sdk_cloudfront::Client,
    sts: aws_sdk_sts::Client,
    wait: WaitOptions,
}

impl AwsProvider {
    /// Build clients from the default credential chain for `region`
    pub async fn new(
        root: impl AsRef<Path>,
        stack_name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;

        Self {
            stack_name: stack_name.into(),
            state: StateManager::new(root),
            stack: StackClient::new(aws_sdk_cloudformation::Client::new(&config)),
            s3: aws_sdk_s3::Client::new(&config),
            cloudfront: aws_sdk_cloudfront::Client::new(&config),
            sts: aws_sdk_sts::Client::new(&config),
            wait: WaitOptions::default(),
            region,
        }
    }

    pub fn with_wait_options(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn load_state(&self) -> Result<(GlobalState, ProviderState)> {
        Ok(self.state.load_provider(PROVIDER_NAME).await?)
    }

    async fn persist(&self, global: &mut GlobalState, current: &ProviderState) -> Result<()> {
        Ok(self
            .state
            .save_provider(global, PROVIDER_NAME, current)
            .await?)
    }

    /// Deploy the stack part of the plan. Returns the settled stack, or
    /// `None` when the plan leaves no stack resources behind.
    async fn deploy_stack(&self, plan: &Plan) -> Result<Option<StackInfo>> {
        let resources: Vec<ResourceConfig> = stack_actions(plan)
            .filter(|a| a.action_type != ActionType::Delete)
            .filter_map(|a| a.resource())
            .collect();
        let changed = stack_actions(plan).any(|a| a.action_type != ActionType::NoOp);

        if resources.is_empty() {
            if self.stack.describe(&self.stack_name).await?.is_some() {
                self.stack.delete(&self.stack_name).await?;
                self.stack.wait(&self.stack_name, self.wait).await?;
            }
            return Ok(None);
        }

        if changed {
            let template = render_template(
                &format!("SiteFlow stack {}", self.stack_name),
                &resources,
                &plan.outputs,
            );
            let body = serde_json::to_string(&template)?;
            match self.stack.create_or_update(&self.stack_name, &body).await? {
                StackChange::Unchanged => {}
                change => {
                    tracing::info!(stack = %self.stack_name, ?change, "Waiting for stack");
                    self.stack.wait(&self.stack_name, self.wait).await?;
                }
            }
        }

        self.stack
            .describe(&self.stack_name)
            .await?
            .map(Some)
            .ok_or_else(|| AwsError::CloudFormation(format!("stack {} not found", self.stack_name)))
    }

    async fn sync_content(
        &self,
        resource: &ResourceConfig,
        physical_ids: &BTreeMap<String, String>,
    ) -> Result<ResourceState> {
        let props = &resource.config["Properties"];
        let bucket = resolve_ref(&props["DestinationBucket"], physical_ids)?;
        let distribution = resolve_ref(&props["Distribution"], physical_ids)?;
        let source = resource.source_dir.clone().ok_or_else(|| {
            AwsError::UnresolvedReference(format!("{}.Source", resource.id))
        })?;
        let prune = props["Prune"].as_bool().unwrap_or(true);
        let paths: Vec<String> = serde_json::from_value(props["DistributionPaths"].clone())?;
        let manifest: BTreeMap<String, ManifestEntry> =
            serde_json::from_value(props["Manifest"].clone())?;

        let report = ContentSync::new(&self.s3, &bucket)
            .run(&source, &manifest, prune)
            .await?;
        let invalidation = invalidate(&self.cloudfront, &distribution, &paths).await?;
        tracing::info!(
            bucket = %bucket,
            uploaded = report.uploaded,
            skipped = report.skipped,
            pruned = report.pruned,
            "Content synced"
        );

        let physical_id = format!("{}-{}", resource.id, &resource.fingerprint()[..8]);
        Ok(ResourceState::applied(physical_id, resource)
            .with_attribute("Bucket", json!(bucket))
            .with_attribute("Distribution", json!(distribution))
            .with_attribute("Objects", json!(manifest.len()))
            .with_attribute("Uploaded", json!(report.uploaded))
            .with_attribute("Pruned", json!(report.pruned))
            .with_attribute("InvalidationId", json!(invalidation)))
    }

    async fn run(&self, plan: &Plan) -> Result<ApplyResult> {
        let mut result = ApplyResult::new();
        let start = std::time::Instant::now();

        let lock = self.state.acquire_lock().await?;
        let (mut global, mut current) = self.load_state().await?;

        let stack = match self.deploy_stack(plan).await {
            Ok(stack) => stack,
            Err(e) => {
                tracing::error!(stack = %self.stack_name, error = %e, "Stack deployment failed");
                for action in stack_actions(plan) {
                    result.add_failure(action.id.clone(), e.to_string());
                }
                lock.release().await?;
                result.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(result);
            }
        };
        let physical_ids = stack.as_ref().map(|s| s.physical_ids()).unwrap_or_default();

        for action in stack_actions(plan) {
            match action.action_type {
                ActionType::Delete => {
                    current.remove(&action.resource_id);
                    result.add_success(action.id.clone(), format!("deleted {}", action.resource_id));
                }
                ActionType::NoOp => {
                    result.add_success(
                        action.id.clone(),
                        format!("{} unchanged", action.resource_id),
                    );
                }
                ActionType::Create | ActionType::Update => {
                    let Some(resource) = action.resource() else {
                        result.add_failure(action.id.clone(), "missing resource config".into());
                        continue;
                    };
                    let physical = physical_ids
                        .get(&resource.id)
                        .cloned()
                        .unwrap_or_else(|| resource.id.clone());
                    current.add(resource.id.clone(), recorded_state(&physical, &resource));
                    result.add_success(
                        action.id.clone(),
                        format!("{} {} ({})", action.action_type, resource.id, physical),
                    );
                }
            }
        }
        self.persist(&mut global, &current).await?;

        for action in plan.actions.iter().filter(|a| a.resource_type == CONTENT_SYNC_TYPE) {
            let outcome = match action.action_type {
                ActionType::NoOp => Ok(format!("{} unchanged", action.resource_id)),
                ActionType::Delete => {
                    current.remove(&action.resource_id);
                    Ok(format!("forgot {}", action.resource_id))
                }
                ActionType::Create | ActionType::Update => match action.resource() {
                    Some(resource) => self
                        .sync_content(&resource, &physical_ids)
                        .await
                        .map(|state| {
                            let message = format!("synced {} ({})", resource.id, state.id);
                            current.add(resource.id.clone(), state);
                            message
                        }),
                    None => Err(AwsError::UnresolvedReference(action.resource_id.clone())),
                },
            };
            match outcome {
                Ok(message) => {
                    self.persist(&mut global, &current).await?;
                    result.add_success(action.id.clone(), message);
                }
                Err(e) => {
                    tracing::error!(action = %action.id, error = %e, "Action failed");
                    result.add_failure(action.id.clone(), e.to_string());
                }
            }
        }

        result.outputs = stack.map(|s| s.user_outputs()).unwrap_or_default();
        lock.release().await?;
        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn teardown(&self) -> Result<ApplyResult> {
        let mut result = ApplyResult::new();
        let start = std::time::Instant::now();

        let lock = self.state.acquire_lock().await?;
        let (mut global, current) = self.load_state().await?;
        let plan = plan_changes(&ResourceSet::new(), &current)?;

        let stack = self.stack.describe(&self.stack_name).await?;
        if stack.is_some() {
            for (id, state) in current.iter().filter(|(_, s)| s.resource_type == BUCKET_TYPE) {
                let retained = state.get_attribute::<String>("DeletionPolicy").as_deref()
                    == Some("Retain");
                let auto_delete = state.get_attribute::<bool>("AutoDeleteObjects").unwrap_or(false);
                if !retained && auto_delete {
                    tracing::info!(resource = %id, bucket = %state.id, "Emptying bucket");
                    ContentSync::new(&self.s3, &state.id).empty().await?;
                }
            }

            self.stack.delete(&self.stack_name).await?;
            if let Err(e) = self.stack.wait(&self.stack_name, self.wait).await {
                for action in &plan.actions {
                    result.add_failure(action.id.clone(), e.to_string());
                }
                lock.release().await?;
                result.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(result);
            }
        } else {
            tracing::warn!(stack = %self.stack_name, "Stack not found; clearing recorded state");
        }

        for action in &plan.actions {
            result.add_success(action.id.clone(), format!("deleted {}", action.resource_id));
        }
        self.persist(&mut global, &ProviderState::new()).await?;
        lock.release().await?;
        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}

/// Actions for resources that live in the CloudFormation stack
fn stack_actions(plan: &Plan) -> impl Iterator<Item = &Action> {
    plan.actions
        .iter()
        .filter(|a| a.resource_type != CONTENT_SYNC_TYPE)
}

fn recorded_state(physical_id: &str, resource: &ResourceConfig) -> ResourceState {
    let mut state = ResourceState::applied(physical_id, resource);
    if resource.resource_type == BUCKET_TYPE {
        let policy = resource.config["DeletionPolicy"]
            .as_str()
            .unwrap_or("Delete");
        state = state
            .with_attribute("DeletionPolicy", json!(policy))
            .with_attribute(
                "AutoDeleteObjects",
                json!(has_auto_delete_tag(&resource.config["Properties"])),
            );
    }
    state
}

/// Resolve a literal or `{"Ref": id}` against the stack's physical ids
fn resolve_ref(value: &Value, physical_ids: &BTreeMap<String, String>) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Object(map) => {
            let id = map
                .get("Ref")
                .and_then(|v| v.as_str())
                .ok_or_else(|| AwsError::UnresolvedReference(value.to_string()))?;
            physical_ids
                .get(id)
                .cloned()
                .ok_or_else(|| AwsError::UnresolvedReference(id.to_string()))
        }
        other => Err(AwsError::UnresolvedReference(other.to_string())),
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn display_name(&self) -> &str {
        "Amazon Web Services"
    }

    async fn check_auth(&self) -> siteflow_cloud::Result<AuthStatus> {
        match self.sts.get_caller_identity().send().await {
            Ok(identity) => Ok(AuthStatus::ok(format!(
                "{} ({})",
                identity.account().unwrap_or("unknown"),
                identity.arn().unwrap_or("unknown")
            ))),
            Err(e) => Ok(AuthStatus::failed(format!("{:?}", e))),
        }
    }

    async fn get_state(&self) -> siteflow_cloud::Result<ProviderState> {
        let (_, current) = self.load_state().await?;
        if current.is_empty() || self.stack.describe(&self.stack_name).await?.is_some() {
            return Ok(current);
        }
        tracing::warn!(stack = %self.stack_name, "Recorded state has no stack behind it");
        Ok(ProviderState::new())
    }

    async fn plan(&self, desired: &ResourceSet) -> siteflow_cloud::Result<Plan> {
        let current = self.get_state().await?;
        plan_changes(desired, &current)
    }

    async fn apply(&self, plan: &Plan) -> siteflow_cloud::Result<ApplyResult> {
        Ok(self.run(plan).await?)
    }

    async fn outputs(&self) -> siteflow_cloud::Result<BTreeMap<String, String>> {
        Ok(self
            .stack
            .describe(&self.stack_name)
            .await?
            .map(|s| s.user_outputs())
            .unwrap_or_default())
    }

    async fn destroy(&self, resource_id: &str) -> siteflow_cloud::Result<()> {
        let (mut global, mut current) = self.load_state().await?;
        let state = current
            .get(resource_id)
            .ok_or_else(|| CloudError::ResourceNotFound(resource_id.to_string()))?;

        if state.resource_type != CONTENT_SYNC_TYPE {
            return Err(AwsError::Unsupported(format!(
                "{} is part of stack {}; remove it from the site and deploy, or destroy the whole site",
                resource_id, self.stack_name
            ))
            .into());
        }

        current.remove(resource_id);
        self.persist(&mut global, &current).await?;
        Ok(())
    }

    async fn destroy_all(&self) -> siteflow_cloud::Result<ApplyResult> {
        Ok(self.teardown().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ref() {
        let ids = BTreeMap::from([("WebsiteBucket".to_string(), "demo-bucket-1a2b".to_string())]);

        assert_eq!(
            resolve_ref(&json!({ "Ref": "WebsiteBucket" }), &ids).unwrap(),
            "demo-bucket-1a2b"
        );
        assert_eq!(resolve_ref(&json!("literal"), &ids).unwrap(), "literal");
        assert!(matches!(
            resolve_ref(&json!({ "Ref": "Missing" }), &ids),
            Err(AwsError::UnresolvedReference(_))
        ));
        assert!(resolve_ref(&json!(3), &ids).is_err());
    }

    #[test]
    fn test_recorded_bucket_state() {
        let bucket = ResourceConfig::new(
            BUCKET_TYPE,
            "WebsiteBucket",
            PROVIDER_NAME,
            json!({
                "Properties": {
                    "Tags": [{ "Key": siteflow_cloud::types::AUTO_DELETE_TAG, "Value": "true" }]
                },
                "DeletionPolicy": "Delete",
            }),
        );
        let state = recorded_state("demo-bucket", &bucket);

        assert_eq!(state.id, "demo-bucket");
        assert_eq!(state.get_attribute::<bool>("AutoDeleteObjects"), Some(true));
        assert_eq!(
            state.get_attribute::<String>("DeletionPolicy").as_deref(),
            Some("Delete")
        );
    }

    #[test]
    fn test_stack_actions_skip_content_sync() {
        let bucket = ResourceConfig::new(BUCKET_TYPE, "WebsiteBucket", PROVIDER_NAME, json!({}));
        let sync = ResourceConfig::new(CONTENT_SYNC_TYPE, "Deploy", PROVIDER_NAME, json!({}))
            .with_dependency("WebsiteBucket");
        let plan = Plan::new(vec![
            Action::for_resource(ActionType::Create, &bucket),
            Action::for_resource(ActionType::Create, &sync),
        ]);

        let ids: Vec<&str> = stack_actions(&plan).map(|a| a.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["WebsiteBucket"]);
    }
}
