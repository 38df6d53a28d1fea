//! AWS provider for SiteFlow
//!
//! Deploys the bucket, bucket policy and CloudFront distribution as a single
//! CloudFormation stack, then syncs site content to S3 and invalidates the
//! distribution cache.
//!
//! Credentials come from the default AWS chain (environment, profile, SSO,
//! instance role).

pub mod error;
pub mod provider;
pub mod stack;
pub mod sync;

pub use error::{AwsError, Result};
pub use provider::{AwsProvider, DEFAULT_REGION, PROVIDER_NAME};
pub use stack::{StackPhase, WaitOptions, classify, render_template};
pub use sync::{ContentSync, SyncReport};
