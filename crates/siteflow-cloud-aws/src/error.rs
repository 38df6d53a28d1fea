//! AWS provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("AWS credentials are not usable: {0}")]
    Credentials(String),

    #[error("CloudFormation request failed: {0}")]
    CloudFormation(String),

    #[error("Stack {stack} ended in {status}: {reason}")]
    StackFailed {
        stack: String,
        status: String,
        reason: String,
    },

    #[error("Stack {stack} did not settle within {waited_secs}s")]
    Timeout { stack: String, waited_secs: u64 },

    #[error("S3 request failed: {0}")]
    S3(String),

    #[error("CloudFront request failed: {0}")]
    CloudFront(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Asset {key} changed since synthesis (expected {expected}, found {actual})")]
    AssetChanged {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] siteflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for siteflow_cloud::CloudError {
    fn from(err: AwsError) -> Self {
        use siteflow_cloud::CloudError;
        match err {
            AwsError::Cloud(inner) => inner,
            AwsError::Io(inner) => CloudError::Io(inner),
            AwsError::Json(inner) => CloudError::Json(inner),
            AwsError::Credentials(msg) => CloudError::AuthenticationFailed(msg),
            e @ AwsError::Timeout { .. } => CloudError::Timeout(e.to_string()),
            AwsError::Unsupported(msg) => CloudError::InvalidConfig(msg),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}
