//! Diffing desired resources against provider state
//!
//! Providers share this planner so that every backend agrees on what counts
//! as a change. Ordering comes from the `depends_on` edges of the resource
//! graph: referenced resources are created first and deleted last.

use crate::action::{Action, ActionType, Plan};
use crate::error::{CloudError, Result};
use crate::provider::{ResourceConfig, ResourceSet};
use crate::state::{ProviderState, ResourceState};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute under which providers record the applied fingerprint
pub const FINGERPRINT_ATTR: &str = "fingerprint";

/// Attribute under which providers record a resource's dependencies
pub const DEPENDS_ON_ATTR: &str = "depends_on";

/// Order node ids so that every node comes after the nodes it depends on.
///
/// Ties are broken by id so the same graph always yields the same order.
/// With `strict`, an edge to an id outside `nodes` is an error; otherwise
/// such edges are ignored (used for state, where the target may already be
/// gone).
pub fn dependency_order(nodes: &BTreeMap<String, Vec<String>>, strict: bool) -> Result<Vec<String>> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (id, deps) in nodes {
        let mut edges = BTreeSet::new();
        for dep in deps {
            if nodes.contains_key(dep) {
                if dep != id {
                    edges.insert(dep.as_str());
                }
            } else if strict {
                return Err(CloudError::InvalidConfig(format!(
                    "{} depends on undeclared resource {}",
                    id, dep
                )));
            }
        }
        pending.insert(id.as_str(), edges);
    }

    let mut ordered = Vec::with_capacity(nodes.len());
    while !pending.is_empty() {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| *id)
            .collect();

        if ready.is_empty() {
            let remaining: Vec<&str> = pending.keys().copied().collect();
            return Err(CloudError::DependencyCycle(remaining.join(", ")));
        }

        for id in ready {
            pending.remove(id);
            for deps in pending.values_mut() {
                deps.remove(id);
            }
            ordered.push(id.to_string());
        }
    }

    Ok(ordered)
}

/// Desired resources in apply order
pub fn ordered_resources(desired: &ResourceSet) -> Result<Vec<&ResourceConfig>> {
    let mut nodes = BTreeMap::new();
    for resource in desired.iter() {
        if nodes
            .insert(resource.id.clone(), resource.depends_on.clone())
            .is_some()
        {
            return Err(CloudError::InvalidConfig(format!(
                "duplicate logical id {}",
                resource.id
            )));
        }
    }

    dependency_order(&nodes, true)?
        .iter()
        .map(|id| {
            desired
                .get(id)
                .ok_or_else(|| CloudError::ResourceNotFound(id.clone()))
        })
        .collect()
}

/// Compute the plan that converges `current` onto `desired`.
///
/// Creates and updates come first in dependency order, then deletes of
/// resources that are no longer declared, in reverse dependency order.
pub fn plan_changes(desired: &ResourceSet, current: &ProviderState) -> Result<Plan> {
    let mut actions = Vec::new();

    for resource in ordered_resources(desired)? {
        let action_type = match current.get(&resource.id) {
            None => ActionType::Create,
            Some(state)
                if applied_fingerprint(state).as_deref() == Some(resource.fingerprint().as_str()) =>
            {
                ActionType::NoOp
            }
            Some(_) => ActionType::Update,
        };
        tracing::debug!(resource = %resource.id, action = %action_type, "Planned resource");
        actions.push(Action::for_resource(action_type, resource));
    }

    let stale: BTreeMap<String, Vec<String>> = current
        .iter()
        .filter(|(id, _)| desired.get(id).is_none())
        .map(|(id, state)| {
            let deps = state
                .get_attribute::<Vec<String>>(DEPENDS_ON_ATTR)
                .unwrap_or_default();
            (id.clone(), deps)
        })
        .collect();

    let mut delete_order = dependency_order(&stale, false)?;
    delete_order.reverse();
    for id in delete_order {
        if let Some(state) = current.get(&id) {
            tracing::debug!(resource = %id, "Planned delete");
            actions.push(Action::delete(state.resource_type.clone(), id));
        }
    }

    Ok(Plan::new(actions).with_outputs(desired.outputs.clone()))
}

fn applied_fingerprint(state: &ResourceState) -> Option<String> {
    state.get_attribute::<String>(FINGERPRINT_ATTR)
}
