//! Planned changes and their outcome
//!
//! A [`Plan`] lists one [`Action`] per logical resource in apply order. Each
//! create/update action owns the desired [`ResourceConfig`], so a provider can
//! apply a plan without the resource set it was computed from.

use crate::provider::ResourceConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    /// Applied fingerprint matches the desired one
    NoOp,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::NoOp => "no-op",
        }
    }

    /// Whether applying this action touches the provider
    pub fn is_change(&self) -> bool {
        *self != ActionType::NoOp
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// `<action-type>-<logical-id>`, unique within a plan
    pub id: String,
    pub action_type: ActionType,
    pub resource_type: String,
    /// Logical id in the template
    pub resource_id: String,
    /// Desired resource; `None` for deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<ResourceConfig>,
}

impl Action {
    pub fn for_resource(action_type: ActionType, resource: &ResourceConfig) -> Self {
        Self {
            id: format!("{}-{}", action_type, resource.id),
            action_type,
            resource_type: resource.resource_type.clone(),
            resource_id: resource.id.clone(),
            desired: Some(resource.clone()),
        }
    }

    /// Removal of a resource that is only known from state
    pub fn delete(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        let resource_id = resource_id.into();
        Self {
            id: format!("{}-{}", ActionType::Delete, resource_id),
            action_type: ActionType::Delete,
            resource_type: resource_type.into(),
            resource_id,
            desired: None,
        }
    }

    pub fn resource(&self) -> Option<ResourceConfig> {
        self.desired.clone()
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.desired.as_ref().map(ResourceConfig::fingerprint)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.action_type, self.resource_id, self.resource_type
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Dependencies before dependents; deletes last, dependents first
    pub actions: Vec<Action>,

    /// Desired template outputs, resolved by the provider after apply
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            outputs: BTreeMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_outputs(mut self, outputs: BTreeMap<String, serde_json::Value>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(|a| a.action_type.is_change())
    }

    pub fn action_for(&self, resource_id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.resource_id == resource_id)
    }

    pub fn summary(&self) -> PlanSummary {
        self.actions
            .iter()
            .fold(PlanSummary::default(), |mut summary, action| {
                match action.action_type {
                    ActionType::Create => summary.create += 1,
                    ActionType::Update => summary.update += 1,
                    ActionType::Delete => summary.delete += 1,
                    ActionType::NoOp => summary.unchanged += 1,
                }
                summary
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.unchanged
        )
    }
}

/// What happened to one action during apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: Vec<ActionOutcome>,
    pub failed: Vec<ActionOutcome>,

    /// Outputs resolved against the applied state
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionOutcome {
            action_id,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, action_id: String, error: String) {
        self.failed.push(ActionOutcome {
            action_id,
            message: String::new(),
            error: Some(error),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_carries_resource() {
        let resource = ResourceConfig::new("AWS::S3::Bucket", "Website", "local", json!({"a": 1}))
            .with_dependency("Other");
        let action = Action::for_resource(ActionType::Create, &resource);

        assert_eq!(action.id, "create-Website");
        assert_eq!(action.to_string(), "create Website (AWS::S3::Bucket)");
        assert_eq!(action.resource(), Some(resource.clone()));
        assert_eq!(action.fingerprint(), Some(resource.fingerprint()));
    }

    #[test]
    fn test_delete_action_has_no_resource() {
        let action = Action::delete("AWS::S3::Bucket", "Website");
        assert_eq!(action.id, "delete-Website");
        assert_eq!(action.action_type, ActionType::Delete);
        assert!(action.resource().is_none());
    }

    #[test]
    fn test_plan_summary() {
        let r = ResourceConfig::new("T", "A", "local", json!({}));
        let plan = Plan::new(vec![
            Action::for_resource(ActionType::Create, &r),
            Action::for_resource(ActionType::NoOp, &r),
            Action::delete("T", "B"),
        ]);

        assert!(plan.has_changes());
        assert_eq!(
            plan.summary().to_string(),
            "1 to create, 0 to update, 1 to delete, 1 unchanged"
        );
        assert!(!Plan::empty().has_changes());
    }

    #[test]
    fn test_noop_only_plan_has_no_changes() {
        let r = ResourceConfig::new("T", "A", "local", json!({}));
        let plan = Plan::new(vec![Action::for_resource(ActionType::NoOp, &r)]);
        assert!(!plan.has_changes());
        assert_eq!(plan.summary().unchanged, 1);
    }
}
