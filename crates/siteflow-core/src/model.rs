//! サイト定義モデル
//!
//! site.kdl から読み込まれる静的サイトの宣言。
//! バケット、ディストリビューション、コンテンツ同期の3つで構成される。

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// ビューアープロトコルポリシー（常にHTTPSへリダイレクト）
pub const VIEWER_PROTOCOL_POLICY: &str = "redirect-to-https";

/// デプロイ後に無効化するパス（常に全パス）
pub const INVALIDATION_PATHS: [&str; 1] = ["/*"];

pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";
pub const DEFAULT_SOURCE_DIR: &str = "dist";

/// 静的サイト全体の宣言
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// サイト名（スタック名・物理名のプレフィックス）
    pub name: String,

    /// リージョン（未指定時は AWS_REGION などプロバイダー側の既定値）
    pub region: Option<String>,

    /// スタック名（未指定時はサイト名）
    pub stack_name: Option<String>,

    pub bucket: BucketSpec,

    pub distribution: DistributionSpec,

    pub deployment: DeploymentSpec,
}

impl Site {
    /// デフォルト値でサイトを作成
    pub fn new(name: impl Into<String>) -> Self {
        let bucket = BucketSpec::default();
        let distribution = DistributionSpec::for_index(&bucket.index_document);
        Self {
            name: name.into(),
            region: None,
            stack_name: None,
            bucket,
            distribution,
            deployment: DeploymentSpec::default(),
        }
    }

    pub fn stack_name(&self) -> &str {
        self.stack_name.as_deref().unwrap_or(&self.name)
    }

    /// ルートオブジェクト（未指定ならインデックスドキュメント）
    pub fn default_root_object(&self) -> &str {
        self.distribution
            .default_root_object
            .as_deref()
            .unwrap_or(&self.bucket.index_document)
    }

    /// テアダウン時にバケットの中身まで消えるか
    pub fn destroys_content_on_teardown(&self) -> bool {
        self.bucket.removal_policy == RemovalPolicy::Destroy && self.bucket.auto_delete_objects
    }
}

/// ウェブサイトホスティング用バケット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    /// 論理ID
    pub id: String,

    pub index_document: String,

    pub error_document: String,

    /// 全オブジェクトへの s3:GetObject を公開するか
    pub public_read: bool,

    pub removal_policy: RemovalPolicy,

    /// テアダウン時にオブジェクトを自動削除するか（destroy 時のみ有効）
    pub auto_delete_objects: bool,
}

impl Default for BucketSpec {
    fn default() -> Self {
        Self {
            id: "WebsiteBucket".to_string(),
            index_document: DEFAULT_INDEX_DOCUMENT.to_string(),
            error_document: DEFAULT_INDEX_DOCUMENT.to_string(),
            public_read: true,
            removal_policy: RemovalPolicy::Retain,
            auto_delete_objects: false,
        }
    }
}

/// スタック削除時のバケットの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// バケットを残す（本番向け）
    #[default]
    Retain,
    /// バケットを削除する（本番非推奨）
    Destroy,
}

impl RemovalPolicy {
    /// CloudFormation の DeletionPolicy 値
    pub fn deletion_policy(&self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Destroy => "Delete",
        }
    }
}

impl FromStr for RemovalPolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "retain" => Ok(RemovalPolicy::Retain),
            "destroy" | "delete" => Ok(RemovalPolicy::Destroy),
            other => Err(FlowError::InvalidConfig(format!(
                "removal-policy は retain か destroy を指定してください: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Retain => write!(f, "retain"),
            RemovalPolicy::Destroy => write!(f, "destroy"),
        }
    }
}

/// CDNディストリビューション（ビヘイビアは常に1つ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    /// 論理ID
    pub id: String,

    pub cache_policy: CachePolicy,

    /// 未指定時はバケットのインデックスドキュメント
    pub default_root_object: Option<String>,

    pub error_responses: Vec<ErrorResponse>,
}

impl DistributionSpec {
    /// 404 をインデックスドキュメントの 200 に書き換える既定構成
    pub fn for_index(index_document: &str) -> Self {
        Self {
            id: "WebsiteDistribution".to_string(),
            cache_policy: CachePolicy::default(),
            default_root_object: None,
            error_responses: vec![ErrorResponse::spa_fallback(index_document)],
        }
    }
}

/// CloudFront マネージドキャッシュポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    #[default]
    CachingOptimized,
    CachingOptimizedForUncompressedObjects,
    CachingDisabled,
}

impl CachePolicy {
    /// マネージドポリシーID
    pub fn policy_id(&self) -> &'static str {
        match self {
            CachePolicy::CachingOptimized => "658327ea-f89d-4fab-a63d-7e88639e58f6",
            CachePolicy::CachingOptimizedForUncompressedObjects => {
                "b2884449-e4de-46a7-ac36-70bc7f1ddd6d"
            }
            CachePolicy::CachingDisabled => "4135ea2d-6df8-44a3-9df3-4b5a84be39ad",
        }
    }

    /// 圧縮を有効にするか
    pub fn compress(&self) -> bool {
        !matches!(self, CachePolicy::CachingOptimizedForUncompressedObjects)
    }
}

impl FromStr for CachePolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "caching-optimized" => Ok(CachePolicy::CachingOptimized),
            "caching-optimized-for-uncompressed-objects" => {
                Ok(CachePolicy::CachingOptimizedForUncompressedObjects)
            }
            "caching-disabled" => Ok(CachePolicy::CachingDisabled),
            other => Err(FlowError::InvalidConfig(format!(
                "未対応のキャッシュポリシー: {}",
                other
            ))),
        }
    }
}

/// エラーレスポンスの書き換え
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// オリジンが返すステータス
    pub http_status: u16,

    /// ビューアーに返すステータス
    pub response_http_status: u16,

    /// 代わりに返すページ
    pub response_page_path: String,
}

impl ErrorResponse {
    /// クライアントサイドルーティング用: 404 → 200 /index.html
    pub fn spa_fallback(index_document: &str) -> Self {
        Self {
            http_status: 404,
            response_http_status: 200,
            response_page_path: format!("/{}", index_document),
        }
    }
}

/// アセットのアップロードとキャッシュ無効化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// 論理ID
    pub id: String,

    /// ビルド済みアセットのディレクトリ（プロジェクトルートからの相対パス可）
    pub source: PathBuf,

    /// ソースに存在しないオブジェクトを削除するか
    pub prune: bool,
}

impl Default for DeploymentSpec {
    fn default() -> Self {
        Self {
            id: "DeployWebsite".to_string(),
            source: PathBuf::from(DEFAULT_SOURCE_DIR),
            prune: true,
        }
    }
}
