//! Deterministic physical names
//!
//! The same stack and logical id always map to the same bucket name and
//! distribution domain, so a redeploy lands on the resources it created.

use sha2::{Digest, Sha256};

const BUCKET_NAME_MAX: usize = 63;

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// `<stack>-<logical>-<hash8>`, lower-cased and clipped to S3's length limit
pub fn bucket_name(stack: &str, logical_id: &str) -> String {
    let hash = digest(&[stack, logical_id]);
    let prefix: String = format!("{}-{}", stack, logical_id)
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let budget = BUCKET_NAME_MAX - 9;
    let prefix = prefix
        .get(..budget.min(prefix.len()))
        .unwrap_or(&prefix)
        .trim_end_matches('-');
    format!("{}-{}", prefix, &hash[..8])
}

/// Distribution id in CloudFront's shape (`E` + 13 upper-case characters)
pub fn distribution_id(stack: &str, logical_id: &str) -> String {
    let hash = digest(&["distribution", stack, logical_id]);
    format!("E{}", hash[..13].to_ascii_uppercase())
}

/// `d<hash13>.cloudfront.net`
pub fn distribution_domain(stack: &str, logical_id: &str) -> String {
    let hash = digest(&["domain", stack, logical_id]);
    format!("d{}.cloudfront.net", &hash[..13])
}

pub fn website_host(bucket: &str, region: &str) -> String {
    format!("{}.s3-website-{}.amazonaws.com", bucket, region)
}

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{}", bucket)
}

/// Invalidation id, unique per distribution and request time
pub fn invalidation_id(distribution: &str, requested_at: &str) -> String {
    let hash = digest(&["invalidation", distribution, requested_at]);
    format!("I{}", hash[..13].to_ascii_uppercase())
}
