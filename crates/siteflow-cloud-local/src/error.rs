//! Local provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("Bucket {bucket} is not empty ({objects} objects); enable auto-delete-objects or empty it first")]
    BucketNotEmpty { bucket: String, objects: usize },

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Invalid intrinsic function: {0}")]
    InvalidIntrinsic(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResource(String),

    #[error("Missing property {property} on {resource}")]
    MissingProperty { resource: String, property: String },

    #[error("Asset {key} changed since synthesis (expected {expected}, found {actual})")]
    AssetChanged {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] siteflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, LocalError>;

impl From<LocalError> for siteflow_cloud::CloudError {
    fn from(err: LocalError) -> Self {
        match err {
            LocalError::Cloud(inner) => inner,
            LocalError::Io(inner) => siteflow_cloud::CloudError::Io(inner),
            LocalError::Json(inner) => siteflow_cloud::CloudError::Json(inner),
            other => siteflow_cloud::CloudError::ApiError(other.to_string()),
        }
    }
}
