//! Local provider for SiteFlow
//!
//! Implements the CloudProvider trait against an on-disk emulation of S3
//! and CloudFront, so a site can be planned, deployed and torn down without
//! an AWS account.
//!
//! # Features
//!
//! - Website buckets stored as directories, with deterministic names
//! - Bucket policies and public-read checks
//! - Distributions with HTTPS redirect, default root object and custom
//!   error responses, reachable through [`LocalProvider::fetch`]
//! - Content sync with upload, prune and invalidation records
//!
//! # Example
//!
//! ```ignore
//! use siteflow_cloud::CloudProvider;
//! use siteflow_cloud_local::LocalProvider;
//!
//! let provider = LocalProvider::new(".", "electron-orbital-viewer");
//! let plan = provider.plan(&resources).await?;
//! let result = provider.apply(&plan).await?;
//! println!("{}", result.outputs["CloudFrontURL"]);
//! ```

pub mod cdn;
pub mod error;
pub mod intrinsic;
pub mod naming;
pub mod provider;
pub mod store;

pub use cdn::Response;
pub use error::{LocalError, Result};
pub use provider::{DEFAULT_REGION, Invalidation, LocalProvider, PROVIDER_NAME};
pub use store::ObjectStore;
