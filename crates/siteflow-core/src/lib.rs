//! SiteFlow Core
//!
//! 静的サイト定義（site.kdl）のパース、検証、テンプレート合成を提供します。
//!
//! 合成されるリソース:
//! - ウェブサイトホスティング用の S3 バケット（公開読み取りポリシー付き）
//! - HTTPS リダイレクトの CloudFront ディストリビューション
//! - アセットのアップロードと `/*` の無効化を行うコンテンツ同期
//! - `CloudFrontURL` / `BucketURL` 出力

pub mod assertions;
pub mod assets;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod synth;
pub mod validate;

pub use assertions::{AssertionError, object_like};
pub use assets::{AssetFile, AssetManifest, content_type_for};
pub use error::{FlowError, Result};
pub use loader::{LoadedSite, load_site};
pub use model::{
    BucketSpec, CachePolicy, DeploymentSpec, DistributionSpec, ErrorResponse, RemovalPolicy, Site,
};
pub use parser::{parse_site_file, parse_site_string};
pub use synth::{
    BUCKET_POLICY_TYPE, BUCKET_TYPE, BUCKET_URL_OUTPUT, CLOUDFRONT_URL_OUTPUT, CONTENT_SYNC_TYPE,
    DISTRIBUTION_TYPE, Template, TemplateOutput, TemplateResource, synthesize,
};
pub use validate::{resolve_asset_dir, validate_site};
