//! Local provider implementation

use crate::cdn::{self, Response};
use crate::error::{LocalError, Result};
use crate::intrinsic::{resolve, resolve_string};
use crate::naming;
use crate::store::ObjectStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use siteflow_cloud::types::{
    BUCKET_POLICY_TYPE, BUCKET_TYPE, CONTENT_SYNC_TYPE, DISTRIBUTION_TYPE, has_auto_delete_tag,
    object_path,
};
use siteflow_cloud::{
    Action, ActionType, ApplyResult, AuthStatus, CloudError, CloudProvider, GlobalState, Plan,
    ProviderState, ResourceConfig, ResourceSet, ResourceState, StateManager, plan_changes,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const PROVIDER_NAME: &str = "local";
pub const DEFAULT_REGION: &str = "us-east-1";

const LOCAL_DIR: &str = ".siteflow/local";
const OUTPUTS_FILE: &str = "outputs.json";

/// Attribute holding the invalidation history of a distribution
pub const INVALIDATIONS_ATTR: &str = "Invalidations";

/// A recorded cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Invalidation {
    pub id: String,
    pub paths: Vec<String>,
    pub create_time: DateTime<Utc>,
    pub status: String,
}

/// Reconciles a site against an on-disk emulation of S3 and CloudFront.
///
/// State lives in `<root>/.siteflow/state.json`, objects under
/// `<root>/.siteflow/local/buckets/<bucket>/`.
pub struct LocalProvider {
    root: PathBuf,
    stack_name: String,
    region: String,
    state: StateManager,
    store: ObjectStore,
}

impl LocalProvider {
    pub fn new(root: impl AsRef<Path>, stack_name: impl Into<String>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            state: StateManager::new(&root),
            store: ObjectStore::new(root.join(LOCAL_DIR).join("buckets")),
            stack_name: stack_name.into(),
            region: DEFAULT_REGION.to_string(),
            root,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    fn outputs_path(&self) -> PathBuf {
        self.root.join(LOCAL_DIR).join(OUTPUTS_FILE)
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

    /// Objects currently stored in the bucket declared as `bucket_id`
    pub async fn bucket_objects(&self, bucket_id: &str) -> Result<BTreeMap<String, String>> {
        let (_, current) = self.load_state().await?;
        let bucket = current
            .get(bucket_id)
            .ok_or_else(|| LocalError::UnresolvedReference(bucket_id.to_string()))?;
        self.store.list_objects(&bucket.id).await
    }

    /// Invalidations recorded on the distribution declared as `distribution_id`
    pub async fn invalidations(&self, distribution_id: &str) -> Result<Vec<Invalidation>> {
        let (_, current) = self.load_state().await?;
        Ok(current
            .get(distribution_id)
            .and_then(|d| d.get_attribute::<Vec<Invalidation>>(INVALIDATIONS_ATTR))
            .unwrap_or_default())
    }

    /// Request a URL from the emulated distribution or bucket website endpoint
    pub async fn fetch(&self, url: &str) -> Result<Response> {
        let (_, current) = self.load_state().await?;
        cdn::fetch(&current, &self.store, url).await
    }

    async fn apply_action(&self, action: &Action, current: &mut ProviderState) -> Result<String> {
        match action.action_type {
            ActionType::NoOp => Ok(format!("{} unchanged", action.resource_id)),
            ActionType::Delete => self.delete_resource(&action.resource_id, current).await,
            ActionType::Create | ActionType::Update => {
                let resource = action.resource().ok_or_else(|| LocalError::MissingProperty {
                    resource: action.resource_id.clone(),
                    property: "config".to_string(),
                })?;
                let previous = current.get(&resource.id).cloned();

                let mut applied = match resource.resource_type.as_str() {
                    BUCKET_TYPE => self.apply_bucket(&resource, previous.as_ref(), current).await?,
                    BUCKET_POLICY_TYPE => self.apply_bucket_policy(&resource, current)?,
                    DISTRIBUTION_TYPE => {
                        self.apply_distribution(&resource, previous.as_ref(), current)?
                    }
                    CONTENT_SYNC_TYPE => self.apply_content_sync(&resource, current).await?,
                    other => return Err(LocalError::UnsupportedResource(other.to_string())),
                };
                if let Some(previous) = previous {
                    applied.created_at = previous.created_at;
                }

                let message = format!("{} {} ({})", action.action_type, resource.id, applied.id);
                current.add(resource.id.clone(), applied);
                Ok(message)
            }
        }
    }

    async fn apply_bucket(
        &self,
        resource: &ResourceConfig,
        previous: Option<&ResourceState>,
        current: &ProviderState,
    ) -> Result<ResourceState> {
        let props = resolve(&resource.config["Properties"], current)?;
        let website = &props["WebsiteConfiguration"];
        let index = website["IndexDocument"]
            .as_str()
            .ok_or_else(|| missing(resource, "WebsiteConfiguration.IndexDocument"))?;
        let error = website["ErrorDocument"].as_str();
        let deletion_policy = resource.config["DeletionPolicy"]
            .as_str()
            .unwrap_or("Delete");

        let name = previous
            .map(|p| p.id.clone())
            .unwrap_or_else(|| naming::bucket_name(&self.stack_name, &resource.id));
        self.store.create_bucket(&name).await?;
        tracing::info!(bucket = %name, "Bucket ready");

        let host = naming::website_host(&name, &self.region);
        Ok(ResourceState::applied(name.clone(), resource)
            .with_attribute("Arn", json!(naming::bucket_arn(&name)))
            .with_attribute("DomainName", json!(format!("{}.s3.amazonaws.com", name)))
            .with_attribute(
                "RegionalDomainName",
                json!(format!("{}.s3.{}.amazonaws.com", name, self.region)),
            )
            .with_attribute("WebsiteURL", json!(format!("http://{}", host)))
            .with_attribute("WebsiteHost", json!(host))
            .with_attribute("IndexDocument", json!(index))
            .with_attribute("ErrorDocument", json!(error))
            .with_attribute("DeletionPolicy", json!(deletion_policy))
            .with_attribute("AutoDeleteObjects", json!(has_auto_delete_tag(&props))))
    }

    fn apply_bucket_policy(
        &self,
        resource: &ResourceConfig,
        current: &ProviderState,
    ) -> Result<ResourceState> {
        let props = resolve(&resource.config["Properties"], current)?;
        let bucket = props["Bucket"]
            .as_str()
            .ok_or_else(|| missing(resource, "Bucket"))?
            .to_string();
        if !self.store.bucket_exists(&bucket) {
            return Err(LocalError::BucketNotFound(bucket));
        }

        let public_read = allows_public_get(&props["PolicyDocument"]);
        tracing::info!(bucket = %bucket, public_read, "Bucket policy attached");
        Ok(ResourceState::applied(bucket.clone(), resource)
            .with_attribute("Bucket", json!(bucket))
            .with_attribute("PublicRead", json!(public_read))
            .with_attribute("PolicyDocument", props["PolicyDocument"].clone()))
    }

    fn apply_distribution(
        &self,
        resource: &ResourceConfig,
        previous: Option<&ResourceState>,
        current: &ProviderState,
    ) -> Result<ResourceState> {
        let props = resolve(&resource.config["Properties"], current)?;
        let config = &props["DistributionConfig"];
        let origin = config["Origins"][0]["DomainName"]
            .as_str()
            .ok_or_else(|| missing(resource, "DistributionConfig.Origins[0].DomainName"))?;
        let viewer_protocol = config["DefaultCacheBehavior"]["ViewerProtocolPolicy"]
            .as_str()
            .ok_or_else(|| missing(resource, "DefaultCacheBehavior.ViewerProtocolPolicy"))?;

        let (id, domain) = match previous {
            Some(p) => (
                p.id.clone(),
                p.get_attribute::<String>("DomainName")
                    .unwrap_or_else(|| naming::distribution_domain(&self.stack_name, &resource.id)),
            ),
            None => (
                naming::distribution_id(&self.stack_name, &resource.id),
                naming::distribution_domain(&self.stack_name, &resource.id),
            ),
        };
        let invalidations = previous
            .and_then(|p| p.attributes.get(INVALIDATIONS_ATTR).cloned())
            .unwrap_or_else(|| json!([]));

        tracing::info!(distribution = %id, domain = %domain, origin, "Distribution deployed");
        Ok(ResourceState::applied(id.clone(), resource)
            .with_attribute("Id", json!(id))
            .with_attribute("DomainName", json!(domain))
            .with_attribute("OriginDomain", json!(origin))
            .with_attribute("ViewerProtocolPolicy", json!(viewer_protocol))
            .with_attribute("DefaultRootObject", config["DefaultRootObject"].clone())
            .with_attribute("CustomErrorResponses", config["CustomErrorResponses"].clone())
            .with_attribute(INVALIDATIONS_ATTR, invalidations))
    }

    async fn apply_content_sync(
        &self,
        resource: &ResourceConfig,
        current: &mut ProviderState,
    ) -> Result<ResourceState> {
        let props = &resource.config["Properties"];
        let bucket = resolve_string(&props["DestinationBucket"], current)?;
        let distribution = resolve_string(&props["Distribution"], current)?;
        let source = resource
            .source_dir
            .clone()
            .ok_or_else(|| missing(resource, "Source"))?;
        let prune = props["Prune"].as_bool().unwrap_or(true);
        let paths: Vec<String> = serde_json::from_value(props["DistributionPaths"].clone())?;
        let manifest: BTreeMap<String, ManifestEntry> =
            serde_json::from_value(props["Manifest"].clone())?;

        let existing = self.store.list_objects(&bucket).await?;

        let mut uploaded = 0usize;
        for (key, entry) in &manifest {
            if existing.get(key) == Some(&entry.sha256) {
                continue;
            }
            let path = object_path(&source, key);
            let body = fs::read(&path).await?;
            let actual = hex::encode(Sha256::digest(&body));
            if actual != entry.sha256 {
                return Err(LocalError::AssetChanged {
                    key: key.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            self.store.put_object(&bucket, key, &body).await?;
            tracing::debug!(bucket = %bucket, key = %key, "Uploaded object");
            uploaded += 1;
        }

        let mut pruned = 0usize;
        if prune {
            for key in existing.keys().filter(|k| !manifest.contains_key(*k)) {
                self.store.delete_object(&bucket, key).await?;
                tracing::debug!(bucket = %bucket, key = %key, "Pruned object");
                pruned += 1;
            }
        }

        let invalidation = self.invalidate(current, &distribution, paths)?;
        tracing::info!(
            bucket = %bucket,
            uploaded,
            pruned,
            invalidation = %invalidation.id,
            "Content synced"
        );

        let physical_id = format!("{}-{}", resource.id, &resource.fingerprint()[..8]);
        Ok(ResourceState::applied(physical_id, resource)
            .with_attribute("Bucket", json!(bucket))
            .with_attribute("Distribution", json!(distribution))
            .with_attribute("Objects", json!(manifest.len()))
            .with_attribute("Uploaded", json!(uploaded))
            .with_attribute("Pruned", json!(pruned))
            .with_attribute("InvalidationId", json!(invalidation.id)))
    }

    /// Record an invalidation on the distribution with physical id `distribution`
    fn invalidate(
        &self,
        current: &mut ProviderState,
        distribution: &str,
        paths: Vec<String>,
    ) -> Result<Invalidation> {
        let (logical_id, state) = current
            .iter()
            .find(|(_, r)| r.resource_type == DISTRIBUTION_TYPE && r.id == distribution)
            .map(|(id, r)| (id.clone(), r.clone()))
            .ok_or_else(|| LocalError::UnresolvedReference(distribution.to_string()))?;

        let now = Utc::now();
        let invalidation = Invalidation {
            id: naming::invalidation_id(distribution, &now.to_rfc3339()),
            paths,
            create_time: now,
            status: "Completed".to_string(),
        };

        let mut history = state
            .get_attribute::<Vec<Invalidation>>(INVALIDATIONS_ATTR)
            .unwrap_or_default();
        history.push(invalidation.clone());

        let mut state = state;
        state.set_attribute(INVALIDATIONS_ATTR, serde_json::to_value(&history)?);
        current.add(logical_id, state);
        Ok(invalidation)
    }

    async fn delete_resource(&self, id: &str, current: &mut ProviderState) -> Result<String> {
        let state = current
            .get(id)
            .cloned()
            .ok_or_else(|| LocalError::Cloud(CloudError::ResourceNotFound(id.to_string())))?;

        let message = match state.resource_type.as_str() {
            BUCKET_TYPE => {
                let policy = state
                    .get_attribute::<String>("DeletionPolicy")
                    .unwrap_or_else(|| "Delete".to_string());
                if policy == "Retain" {
                    tracing::warn!(bucket = %state.id, "Bucket retained; objects stay on disk");
                    format!("retained bucket {}", state.id)
                } else {
                    let force = state.get_attribute::<bool>("AutoDeleteObjects").unwrap_or(false);
                    let removed = self.store.delete_bucket(&state.id, force).await?;
                    format!("deleted bucket {} ({} objects)", state.id, removed)
                }
            }
            _ => format!("deleted {} ({})", id, state.id),
        };

        current.remove(id);
        tracing::info!(resource = %id, "{}", message);
        Ok(message)
    }

    async fn write_outputs(&self, outputs: &BTreeMap<String, String>) -> Result<()> {
        let path = self.outputs_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, serde_json::to_string_pretty(outputs)?).await?;
        Ok(())
    }

    async fn run(&self, plan: &Plan) -> Result<ApplyResult> {
        let mut result = ApplyResult::new();
        let start = std::time::Instant::now();

        let lock = self.state.acquire_lock().await?;
        let (mut global, mut current) = self.load_state().await?;

        for action in &plan.actions {
            match self.apply_action(action, &mut current).await {
                Ok(message) => {
                    if action.action_type != ActionType::NoOp {
                        self.persist(&mut global, &current).await?;
                    }
                    result.add_success(action.id.clone(), message);
                }
                Err(e) => {
                    tracing::error!(action = %action.id, error = %e, "Action failed");
                    result.add_failure(action.id.clone(), e.to_string());
                    // Later actions depend on this one
                    break;
                }
            }
        }

        if !plan.outputs.is_empty() {
            let mut outputs = BTreeMap::new();
            for (name, value) in &plan.outputs {
                match resolve_string(value, &current) {
                    Ok(resolved) => {
                        outputs.insert(name.clone(), resolved);
                    }
                    Err(e) => tracing::warn!(output = %name, error = %e, "Output unresolved"),
                }
            }
            self.write_outputs(&outputs).await?;
            result.outputs = outputs;
        }

        lock.release().await?;
        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestEntry {
    sha256: String,
}

fn missing(resource: &ResourceConfig, property: &str) -> LocalError {
    LocalError::MissingProperty {
        resource: resource.id.clone(),
        property: property.to_string(),
    }
}

/// Whether a policy document grants anonymous `s3:GetObject`
fn allows_public_get(document: &Value) -> bool {
    let statements = match &document["Statement"] {
        Value::Array(items) => items.clone(),
        single @ Value::Object(_) => vec![single.clone()],
        _ => return false,
    };

    statements.iter().any(|statement| {
        let allow = statement["Effect"] == "Allow";
        let action = match &statement["Action"] {
            Value::String(a) => a == "s3:GetObject" || a == "s3:*",
            Value::Array(items) => items
                .iter()
                .any(|a| a == "s3:GetObject" || a == "s3:*"),
            _ => false,
        };
        let principal = match &statement["Principal"] {
            Value::String(p) => p == "*",
            Value::Object(map) => map.get("AWS").is_some_and(|p| p == "*"),
            _ => false,
        };
        allow && action && principal
    })
}

#[async_trait]
impl CloudProvider for LocalProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn display_name(&self) -> &str {
        "Local emulation"
    }

    async fn check_auth(&self) -> siteflow_cloud::Result<AuthStatus> {
        Ok(AuthStatus::ok(format!(
            "{} ({})",
            self.root.join(LOCAL_DIR).display(),
            self.region
        )))
    }

    async fn get_state(&self) -> siteflow_cloud::Result<ProviderState> {
        Ok(self.load_state().await?.1)
    }

    async fn plan(&self, desired: &ResourceSet) -> siteflow_cloud::Result<Plan> {
        let current = self.get_state().await?;
        plan_changes(desired, &current)
    }

    async fn apply(&self, plan: &Plan) -> siteflow_cloud::Result<ApplyResult> {
        Ok(self.run(plan).await?)
    }

    async fn outputs(&self) -> siteflow_cloud::Result<BTreeMap<String, String>> {
        let path = self.outputs_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn destroy(&self, resource_id: &str) -> siteflow_cloud::Result<()> {
        let current = self.get_state().await?;
        let state = current
            .get(resource_id)
            .ok_or_else(|| CloudError::ResourceNotFound(resource_id.to_string()))?;

        let plan = Plan::new(vec![Action::delete(
            state.resource_type.clone(),
            resource_id,
        )]);
        let result = self.run(&plan).await?;
        match result.failed.first() {
            Some(failure) => Err(CloudError::ApiError(
                failure.error.clone().unwrap_or_default(),
            )),
            None => Ok(()),
        }
    }

    async fn destroy_all(&self) -> siteflow_cloud::Result<ApplyResult> {
        let current = self.get_state().await?;
        let plan = plan_changes(&ResourceSet::new(), &current)?;
        let result = self.run(&plan).await?;

        if result.is_success() {
            let path = self.outputs_path();
            if path.exists() {
                fs::remove_file(&path).await?;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_public_get() {
        assert!(allows_public_get(&json!({
            "Statement": [{ "Action": "s3:GetObject", "Effect": "Allow", "Principal": { "AWS": "*" } }]
        })));
        assert!(allows_public_get(&json!({
            "Statement": { "Action": ["s3:GetObject"], "Effect": "Allow", "Principal": "*" }
        })));
        assert!(!allows_public_get(&json!({
            "Statement": [{ "Action": "s3:GetObject", "Effect": "Deny", "Principal": "*" }]
        })));
        assert!(!allows_public_get(&json!({
            "Statement": [{ "Action": "s3:PutObject", "Effect": "Allow", "Principal": "*" }]
        })));
    }

    #[tokio::test]
    async fn test_empty_provider() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(dir.path(), "demo");

        assert!(provider.check_auth().await.unwrap().authenticated);
        assert!(provider.get_state().await.unwrap().is_empty());
        assert!(provider.outputs().await.unwrap().is_empty());

        let plan = provider.plan(&ResourceSet::new()).await.unwrap();
        assert!(!plan.has_changes());
        assert!(matches!(
            provider.destroy("WebsiteBucket").await,
            Err(CloudError::ResourceNotFound(_))
        ));
    }
}
