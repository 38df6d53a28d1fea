//! SiteFlow provider layer
//!
//! A synthesized template is flattened into a [`ResourceSet`],
//! diffed against recorded state by [`plan_changes`], and applied by a
//! [`CloudProvider`] as a [`Plan`].
//!
//! ```text
//! Template ──resource_set──▶ ResourceSet ──plan_changes(state)──▶ Plan
//!                                                                  │
//!                         .siteflow/state.json ◀──apply── CloudProvider
//! ```
//!
//! Providers live in their own crates (`siteflow-cloud-local`,
//! `siteflow-cloud-aws`) and share [`StateManager`] for bookkeeping.

pub mod action;
pub mod error;
pub mod provider;
pub mod reconcile;
pub mod state;
pub mod types;

pub use action::{Action, ActionOutcome, ActionType, ApplyResult, Plan, PlanSummary};
pub use error::{CloudError, Result};
pub use provider::{AuthStatus, CloudProvider, ResourceConfig, ResourceSet};
pub use reconcile::{dependency_order, ordered_resources, plan_changes};
pub use state::{
    GlobalState, ProviderState, ResourceState, ResourceStatus, StateLock, StateManager,
};
