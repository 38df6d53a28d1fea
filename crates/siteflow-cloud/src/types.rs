//! Resource type names shared by the synthesizer and the providers

pub const BUCKET_TYPE: &str = "AWS::S3::Bucket";
pub const BUCKET_POLICY_TYPE: &str = "AWS::S3::BucketPolicy";
pub const DISTRIBUTION_TYPE: &str = "AWS::CloudFront::Distribution";

/// Post-deploy action: upload assets, prune, invalidate
pub const CONTENT_SYNC_TYPE: &str = "Siteflow::ContentSync";

/// Bucket tag marking that teardown may delete the bucket's objects
pub const AUTO_DELETE_TAG: &str = "siteflow:auto-delete-objects";

/// Object metadata key holding the content digest of an uploaded asset
pub const CONTENT_HASH_METADATA: &str = "siteflow-sha256";

/// Local file for an object key under `root`
pub fn object_path(root: &std::path::Path, key: &str) -> std::path::PathBuf {
    key.split('/').fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Whether a bucket's `Properties` carry the auto-delete tag
pub fn has_auto_delete_tag(properties: &serde_json::Value) -> bool {
    properties
        .get("Tags")
        .and_then(|tags| tags.as_array())
        .is_some_and(|tags| {
            tags.iter().any(|tag| {
                tag.get("Key").and_then(|k| k.as_str()) == Some(AUTO_DELETE_TAG)
                    && tag.get("Value").and_then(|v| v.as_str()) == Some("true")
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auto_delete_tag() {
        assert!(has_auto_delete_tag(&json!({
            "Tags": [{ "Key": AUTO_DELETE_TAG, "Value": "true" }]
        })));
        assert!(!has_auto_delete_tag(&json!({ "Tags": [] })));
        assert!(!has_auto_delete_tag(&json!({})));
    }

    #[test]
    fn test_object_path_splits_key() {
        let path = object_path(std::path::Path::new("/srv/dist"), "assets/js/app.js");
        assert_eq!(
            path,
            std::path::Path::new("/srv/dist")
                .join("assets")
                .join("js")
                .join("app.js")
        );
    }
}
