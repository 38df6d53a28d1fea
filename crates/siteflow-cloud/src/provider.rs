//! The provider seam
//!
//! A [`ResourceSet`] is a synthesized template flattened for one provider.
//! Providers diff it against their recorded state, then apply the resulting
//! plan.

use crate::action::{ApplyResult, Plan};
use crate::error::Result;
use crate::state::ProviderState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Key used in the state file ("local", "aws")
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Resources recorded by the last apply
    async fn get_state(&self) -> Result<ProviderState>;

    async fn plan(&self, desired: &ResourceSet) -> Result<Plan>;

    async fn apply(&self, plan: &Plan) -> Result<ApplyResult>;

    /// Outputs of the last apply; empty when nothing is deployed
    async fn outputs(&self) -> Result<BTreeMap<String, String>>;

    /// Remove one resource by logical id
    async fn destroy(&self, resource_id: &str) -> Result<()>;

    /// Tear the whole site down, honoring each bucket's removal policy
    async fn destroy_all(&self) -> Result<ApplyResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,

    /// Account or caller identity, when known
    pub account_info: Option<String>,

    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Desired resources and outputs, keyed by logical id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSet {
    pub resources: BTreeMap<String, ResourceConfig>,

    /// Output values; may hold `Ref`/`Fn::GetAtt` expressions
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `resource`, replacing any resource with the same logical id
    pub fn add(&mut self, resource: ResourceConfig) {
        self.resources.insert(resource.id.clone(), resource);
    }

    pub fn add_output(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.outputs.insert(name.into(), value);
    }

    pub fn get(&self, id: &str) -> Option<&ResourceConfig> {
        self.resources.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// One template resource as a provider sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// CloudFormation type, or `Siteflow::ContentSync`
    pub resource_type: String,

    pub id: String,

    pub provider: String,

    /// The template entry: `Properties` plus policy attributes
    pub config: serde_json::Value,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Local directory a content sync reads from. Not fingerprinted: the
    /// manifest in `config` already covers what the directory holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
}

impl ResourceConfig {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        provider: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            provider: provider.into(),
            config,
            depends_on: Vec::new(),
            source_dir: None,
        }
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    /// Hex sha256 over type, config and dependencies.
    ///
    /// `serde_json::Value` maps are key-sorted, so equal configs hash equal
    /// whatever order they were built in.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::json!({
            "type": self.resource_type,
            "config": self.config,
            "depends_on": self.depends_on,
        });
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }
}
