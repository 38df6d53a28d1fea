//! リソースグラフの合成
//!
//! [`Site`] とアセットマニフェストから CloudFormation 形式のテンプレートを作る。
//! コンテンツ同期は永続リソースではないため `Metadata` の
//! `Siteflow::Actions` に置き、プロバイダーが適用後に実行する。

use crate::assets::AssetManifest;
use crate::error::Result;
use crate::model::{INVALIDATION_PATHS, Site, VIEWER_PROTOCOL_POLICY};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use siteflow_cloud::{ResourceConfig, ResourceSet};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub use siteflow_cloud::types::{
    AUTO_DELETE_TAG, BUCKET_POLICY_TYPE, BUCKET_TYPE, CONTENT_SYNC_TYPE, DISTRIBUTION_TYPE,
};

pub const CLOUDFRONT_URL_OUTPUT: &str = "CloudFrontURL";
pub const BUCKET_URL_OUTPUT: &str = "BucketURL";

const TEMPLATE_VERSION: &str = "2010-09-09";
const ACTIONS_METADATA_KEY: &str = "Siteflow::Actions";
const SOURCE_PROPERTY: &str = "Source";

/// 合成済みテンプレート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,

    pub resources: BTreeMap<String, TemplateResource>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

/// テンプレート内の1リソース
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(default)]
    pub properties: Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

impl TemplateResource {
    fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Ref / Fn::GetAtt / DependsOn から辿れる論理ID
    pub fn references(&self) -> BTreeSet<String> {
        let mut refs: BTreeSet<String> = self.depends_on.iter().cloned().collect();
        collect_references(&self.properties, &mut refs);
        refs
    }

    /// プロバイダーに渡す設定（Type 以外）
    fn provider_config(&self) -> Value {
        let mut config = json!({ "Properties": self.properties });
        if let Some(policy) = &self.deletion_policy {
            config["DeletionPolicy"] = json!(policy);
        }
        if let Some(policy) = &self.update_replace_policy {
            config["UpdateReplacePolicy"] = json!(policy);
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Template {
    fn new(description: String) -> Self {
        Self {
            format_version: TEMPLATE_VERSION.to_string(),
            description: Some(description),
            metadata: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// 適用後に実行するアクション（コンテンツ同期）
    pub fn actions(&self) -> BTreeMap<String, TemplateResource> {
        self.metadata
            .get(ACTIONS_METADATA_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// 型で絞り込んだリソース
    pub fn find_resources(&self, resource_type: &str) -> Vec<(&String, &TemplateResource)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// プロバイダー向けのリソースセットに変換
    pub fn resource_set(&self, provider: &str) -> Result<ResourceSet> {
        let mut set = ResourceSet::new();
        let actions = self.actions();

        for (id, resource) in self.resources.iter().chain(actions.iter()) {
            let mut provider_config = resource.provider_config();
            // ソースパスは環境ごとに異なるためフィンガープリントから外す
            let source_dir = provider_config["Properties"]
                .as_object_mut()
                .and_then(|props| props.remove(SOURCE_PROPERTY))
                .and_then(|v| v.as_str().map(PathBuf::from));

            let mut config = ResourceConfig::new(
                resource.resource_type.clone(),
                id.clone(),
                provider,
                provider_config,
            );
            config.depends_on = resource.references().into_iter().collect();
            config.source_dir = source_dir;
            set.add(config);
        }

        for (name, output) in &self.outputs {
            set.add_output(name.clone(), output.value.clone());
        }

        // 参照先の存在と循環をここで検出する
        siteflow_cloud::ordered_resources(&set)?;
        Ok(set)
    }
}

/// サイト定義からテンプレートを合成
///
/// `source` はコンテンツ同期が読む解決済みのアセットディレクトリ。
pub fn synthesize(site: &Site, manifest: &AssetManifest, source: &Path) -> Result<Template> {
    let mut template = Template::new(format!("Static website {}", site.name));

    let bucket_id = site.bucket.id.as_str();
    let policy_id = format!("{}Policy", bucket_id);
    let distribution_id = site.distribution.id.as_str();

    template
        .resources
        .insert(bucket_id.to_string(), bucket_resource(site));

    if site.bucket.public_read {
        template
            .resources
            .insert(policy_id.clone(), bucket_policy_resource(bucket_id));
    }

    let mut distribution = distribution_resource(site);
    if site.bucket.public_read {
        // オリジンはウェブサイトエンドポイント。公開ポリシーが先に必要
        distribution.depends_on.push(policy_id);
    }
    template
        .resources
        .insert(distribution_id.to_string(), distribution);

    let sync = content_sync_action(site, manifest, source);
    let mut actions = BTreeMap::new();
    actions.insert(site.deployment.id.clone(), sync);
    template.metadata.insert(
        ACTIONS_METADATA_KEY.to_string(),
        serde_json::to_value(actions)?,
    );

    template.outputs.insert(
        CLOUDFRONT_URL_OUTPUT.to_string(),
        TemplateOutput {
            value: json!({
                "Fn::Join": ["", ["https://", { "Fn::GetAtt": [distribution_id, "DomainName"] }]]
            }),
            description: Some("CDN distribution URL".to_string()),
        },
    );
    template.outputs.insert(
        BUCKET_URL_OUTPUT.to_string(),
        TemplateOutput {
            value: json!({ "Fn::GetAtt": [bucket_id, "WebsiteURL"] }),
            description: Some("Bucket website endpoint".to_string()),
        },
    );

    Ok(template)
}

fn bucket_resource(site: &Site) -> TemplateResource {
    let bucket = &site.bucket;
    let block_policy = !bucket.public_read;

    let mut properties = json!({
        "WebsiteConfiguration": {
            "IndexDocument": bucket.index_document,
            "ErrorDocument": bucket.error_document,
        },
        "PublicAccessBlockConfiguration": {
            "BlockPublicAcls": true,
            "IgnorePublicAcls": true,
            "BlockPublicPolicy": block_policy,
            "RestrictPublicBuckets": block_policy,
        },
    });
    if bucket.auto_delete_objects {
        properties["Tags"] = json!([{ "Key": AUTO_DELETE_TAG, "Value": "true" }]);
    }

    let mut resource = TemplateResource::new(BUCKET_TYPE, properties);
    let policy = bucket.removal_policy.deletion_policy().to_string();
    resource.deletion_policy = Some(policy.clone());
    resource.update_replace_policy = Some(policy);
    resource
}

fn bucket_policy_resource(bucket_id: &str) -> TemplateResource {
    TemplateResource::new(
        BUCKET_POLICY_TYPE,
        json!({
            "Bucket": { "Ref": bucket_id },
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Action": "s3:GetObject",
                    "Effect": "Allow",
                    "Principal": { "AWS": "*" },
                    "Resource": {
                        "Fn::Join": ["", [{ "Fn::GetAtt": [bucket_id, "Arn"] }, "/*"]]
                    },
                }],
            },
        }),
    )
}

fn distribution_resource(site: &Site) -> TemplateResource {
    let bucket_id = site.bucket.id.as_str();
    let origin_id = format!("{}Origin", bucket_id);
    let policy = site.distribution.cache_policy;

    let error_responses: Vec<Value> = site
        .distribution
        .error_responses
        .iter()
        .map(|r| {
            json!({
                "ErrorCode": r.http_status,
                "ResponseCode": r.response_http_status,
                "ResponsePagePath": r.response_page_path,
            })
        })
        .collect();

    TemplateResource::new(
        DISTRIBUTION_TYPE,
        json!({
            "DistributionConfig": {
                "Enabled": true,
                "HttpVersion": "http2",
                "IPV6Enabled": true,
                "DefaultRootObject": site.default_root_object(),
                "Origins": [{
                    "Id": origin_id,
                    // http://<bucket>.s3-website-<region>.amazonaws.com → ホスト部分
                    "DomainName": {
                        "Fn::Select": [2, { "Fn::Split": ["/", { "Fn::GetAtt": [bucket_id, "WebsiteURL"] }] }]
                    },
                    "CustomOriginConfig": { "OriginProtocolPolicy": "http-only" },
                }],
                "DefaultCacheBehavior": {
                    "TargetOriginId": origin_id,
                    "ViewerProtocolPolicy": VIEWER_PROTOCOL_POLICY,
                    "CachePolicyId": policy.policy_id(),
                    "Compress": policy.compress(),
                },
                "CustomErrorResponses": error_responses,
            },
        }),
    )
}

fn content_sync_action(site: &Site, manifest: &AssetManifest, source: &Path) -> TemplateResource {
    TemplateResource::new(
        CONTENT_SYNC_TYPE,
        json!({
            "Source": source.display().to_string(),
            "DestinationBucket": { "Ref": site.bucket.id },
            "Distribution": { "Ref": site.distribution.id },
            "DistributionPaths": INVALIDATION_PATHS,
            "Prune": site.deployment.prune,
            "Manifest": manifest.to_value(),
        }),
    )
}

fn collect_references(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                refs.insert(target.clone());
            }
            if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(target)) = args.first() {
                    refs.insert(target.clone());
                }
            }
            for nested in map.values() {
                collect_references(nested, refs);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, refs);
            }
        }
        _ => {}
    }
}
