//! Content sync against a real bucket and distribution
//!
//! Objects carry their SHA-256 in user metadata, so unchanged files are
//! skipped on the next deploy without downloading them.

use crate::error::{AwsError, Result};
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_s3::primitives::ByteStream;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use siteflow_cloud::types::{CONTENT_HASH_METADATA, object_path};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One file of the synthesized asset manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    pub sha256: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Counts reported after a sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub skipped: usize,
    pub pruned: usize,
}

pub struct ContentSync<'a> {
    s3: &'a aws_sdk_s3::Client,
    bucket: &'a str,
}

impl<'a> ContentSync<'a> {
    pub fn new(s3: &'a aws_sdk_s3::Client, bucket: &'a str) -> Self {
        Self { s3, bucket }
    }

    /// All keys in the bucket, following continuation tokens
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .s3
                .list_objects_v2()
                .bucket(self.bucket)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| AwsError::S3(format!("{:?}", e)))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(|k| k.to_string())),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    /// Hash recorded on an existing object, if any
    async fn remote_hash(&self, key: &str) -> Option<String> {
        let output = self
            .s3
            .head_object()
            .bucket(self.bucket)
            .key(key)
            .send()
            .await
            .ok()?;
        output
            .metadata()
            .and_then(|m| m.get(CONTENT_HASH_METADATA))
            .cloned()
    }

    async fn upload(&self, key: &str, body: Vec<u8>, entry: &ManifestEntry) -> Result<()> {
        let mut request = self
            .s3
            .put_object()
            .bucket(self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_metadata(Some(HashMap::from([(
                CONTENT_HASH_METADATA.to_string(),
                entry.sha256.clone(),
            )])));
        if let Some(content_type) = &entry.content_type {
            request = request.content_type(content_type);
        }
        request
            .send()
            .await
            .map_err(|e| AwsError::S3(format!("{:?}", e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.s3
            .delete_object()
            .bucket(self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AwsError::S3(format!("{:?}", e)))?;
        Ok(())
    }

    /// Upload every changed manifest entry from `source`, then optionally
    /// prune keys the manifest no longer names.
    pub async fn run(
        &self,
        source: &Path,
        manifest: &BTreeMap<String, ManifestEntry>,
        prune: bool,
    ) -> Result<SyncReport> {
        let existing = self.list_keys().await?;
        let mut report = SyncReport::default();

        for (key, entry) in manifest {
            if existing.contains(key)
                && self.remote_hash(key).await.as_deref() == Some(entry.sha256.as_str())
            {
                report.skipped += 1;
                continue;
            }

            let path = object_path(source, key);
            let body = tokio::fs::read(&path).await?;
            let actual = hex::encode(Sha256::digest(&body));
            if actual != entry.sha256 {
                return Err(AwsError::AssetChanged {
                    key: key.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }

            self.upload(key, body, entry).await?;
            tracing::debug!(bucket = self.bucket, key = %key, "Uploaded object");
            report.uploaded += 1;
        }

        if prune {
            for key in existing.iter().filter(|k| !manifest.contains_key(*k)) {
                self.delete(key).await?;
                tracing::debug!(bucket = self.bucket, key = %key, "Pruned object");
                report.pruned += 1;
            }
        }

        Ok(report)
    }

    /// Delete every object so the bucket itself can be removed
    pub async fn empty(&self) -> Result<usize> {
        let keys = self.list_keys().await?;
        for key in &keys {
            self.delete(key).await?;
        }
        tracing::info!(bucket = self.bucket, objects = keys.len(), "Bucket emptied");
        Ok(keys.len())
    }
}

/// Request a CloudFront invalidation, returning its id
pub async fn invalidate(
    cloudfront: &aws_sdk_cloudfront::Client,
    distribution_id: &str,
    paths: &[String],
) -> Result<String> {
    let caller_reference = format!("siteflow-{}", chrono::Utc::now().timestamp_millis());
    let paths = Paths::builder()
        .quantity(paths.len() as i32)
        .set_items(Some(paths.to_vec()))
        .build()
        .map_err(|e| AwsError::CloudFront(e.to_string()))?;
    let batch = InvalidationBatch::builder()
        .paths(paths)
        .caller_reference(caller_reference)
        .build()
        .map_err(|e| AwsError::CloudFront(e.to_string()))?;

    let output = cloudfront
        .create_invalidation()
        .distribution_id(distribution_id)
        .invalidation_batch(batch)
        .send()
        .await
        .map_err(|e| AwsError::CloudFront(format!("{:?}", e)))?;

    let id = output
        .invalidation()
        .map(|i| i.id().to_string())
        .unwrap_or_default();
    tracing::info!(distribution = distribution_id, invalidation = %id, "Invalidation created");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_entry_from_template() {
        let manifest: BTreeMap<String, ManifestEntry> = serde_json::from_value(json!({
            "index.html": { "Sha256": "abc", "Size": 10, "ContentType": "text/html" },
            "assets/app.js": { "Sha256": "def", "Size": 3 },
        }))
        .unwrap();

        assert_eq!(manifest["index.html"].content_type.as_deref(), Some("text/html"));
        assert!(manifest["assets/app.js"].content_type.is_none());
    }
}
