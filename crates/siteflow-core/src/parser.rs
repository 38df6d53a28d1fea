//! KDLパーサー
//!
//! site.kdl をパースして [`Site`] を生成します。
//!
//! ```kdl
//! site "electron-orbital-viewer" {
//!     region "us-east-1"
//!     bucket "ElectronOrbitalViewerBucket" {
//!         index-document "index.html"
//!         error-document "index.html"
//!         removal-policy "destroy"
//!         auto-delete-objects #true
//!     }
//!     distribution "ElectronOrbitalViewerDistribution" {
//!         error-response 404 status=200 page="/index.html"
//!     }
//!     deploy "DeployElectronOrbitalViewer" {
//!         source "dist"
//!     }
//! }
//! ```

use crate::error::{FlowError, Result};
use crate::model::{
    BucketSpec, DeploymentSpec, DistributionSpec, ErrorResponse, INVALIDATION_PATHS, Site,
    VIEWER_PROTOCOL_POLICY,
};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// KDLファイルをパースしてSiteを生成
pub fn parse_site_file<P: AsRef<Path>>(path: P) -> Result<Site> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| FlowError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    debug!(file = %path.display(), "Parsing site file");
    parse_site_string(&content)
}

/// KDL文字列をパース
pub fn parse_site_string(content: &str) -> Result<Site> {
    let doc: KdlDocument = content.parse()?;

    let mut sites = doc.nodes().iter().filter(|n| n.name().value() == "site");
    let node = sites
        .next()
        .ok_or_else(|| FlowError::InvalidConfig("site ノードがありません".to_string()))?;
    if sites.next().is_some() {
        return Err(FlowError::InvalidConfig(
            "site ノードは1つだけ定義してください".to_string(),
        ));
    }

    for other in doc.nodes().iter().filter(|n| n.name().value() != "site") {
        warn!(node = other.name().value(), "Ignoring unknown top-level node");
    }

    parse_site(node)
}

/// site ノードをパース
fn parse_site(node: &KdlNode) -> Result<Site> {
    let name = argument_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("site には名前が必要です".to_string()))?;

    let mut site = Site::new(name);
    let mut explicit_error_responses = false;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "region" => site.region = Some(required_string(child)?),
                "stack-name" | "stack_name" => site.stack_name = Some(required_string(child)?),
                "bucket" => site.bucket = parse_bucket(child)?,
                "distribution" => {
                    let (distribution, explicit) = parse_distribution(child)?;
                    site.distribution = distribution;
                    explicit_error_responses = explicit;
                }
                "deploy" => site.deployment = parse_deploy(child)?,
                other => warn!(node = other, "Ignoring unknown node in site"),
            }
        }
    }

    // error-response 未指定時はインデックスドキュメントへのフォールバックを使う
    if !explicit_error_responses {
        site.distribution.error_responses =
            vec![ErrorResponse::spa_fallback(&site.bucket.index_document)];
    }

    Ok(site)
}

/// bucket ノードをパース
pub fn parse_bucket(node: &KdlNode) -> Result<BucketSpec> {
    let mut bucket = BucketSpec::default();
    if let Some(id) = argument_string(node) {
        bucket.id = id;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "index-document" | "index_document" => {
                    bucket.index_document = required_string(child)?;
                }
                "error-document" | "error_document" => {
                    bucket.error_document = required_string(child)?;
                }
                "public-read" | "public_read" => bucket.public_read = required_bool(child)?,
                "removal-policy" | "removal_policy" => {
                    bucket.removal_policy = required_string(child)?.parse()?;
                }
                "auto-delete-objects" | "auto_delete_objects" => {
                    bucket.auto_delete_objects = required_bool(child)?;
                }
                other => warn!(node = other, "Ignoring unknown node in bucket"),
            }
        }
    }

    Ok(bucket)
}

/// distribution ノードをパース
///
/// 戻り値の bool は error-response が明示されたかどうか
pub fn parse_distribution(node: &KdlNode) -> Result<(DistributionSpec, bool)> {
    let mut distribution = DistributionSpec::for_index(crate::model::DEFAULT_INDEX_DOCUMENT);
    if let Some(id) = argument_string(node) {
        distribution.id = id;
    }

    let mut error_responses = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "cache-policy" | "cache_policy" => {
                    distribution.cache_policy = required_string(child)?.parse()?;
                }
                "default-root-object" | "default_root_object" => {
                    distribution.default_root_object = Some(required_string(child)?);
                }
                "error-response" | "error_response" => {
                    error_responses.push(parse_error_response(child)?);
                }
                "viewer-protocol" | "viewer_protocol" => {
                    // ビヘイビアは常にHTTPSリダイレクト。異なる値は受け付けない
                    let value = required_string(child)?;
                    if value != VIEWER_PROTOCOL_POLICY {
                        return Err(FlowError::InvalidConfig(format!(
                            "viewer-protocol は {} のみ指定できます: {}",
                            VIEWER_PROTOCOL_POLICY, value
                        )));
                    }
                }
                other => warn!(node = other, "Ignoring unknown node in distribution"),
            }
        }
    }

    let explicit = !error_responses.is_empty();
    if explicit {
        distribution.error_responses = error_responses;
    }
    Ok((distribution, explicit))
}

/// error-response ノードをパース
///
/// 例: error-response 404 status=200 page="/index.html"
fn parse_error_response(node: &KdlNode) -> Result<ErrorResponse> {
    let http_status = argument(node)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| {
            FlowError::InvalidConfig("error-response にはステータスコードが必要です".to_string())
        })?;

    let response_http_status = match property(node, "status") {
        Some(value) => value.as_integer().ok_or_else(|| {
            FlowError::InvalidConfig("error-response の status は整数で指定してください".to_string())
        })?,
        None => 200,
    };

    let response_page_path = match property(node, "page") {
        Some(value) => value
            .as_string()
            .ok_or_else(|| {
                FlowError::InvalidConfig(
                    "error-response の page は文字列で指定してください".to_string(),
                )
            })?
            .to_string(),
        None => format!("/{}", crate::model::DEFAULT_INDEX_DOCUMENT),
    };

    Ok(ErrorResponse {
        http_status: status_code(http_status)?,
        response_http_status: status_code(response_http_status)?,
        response_page_path,
    })
}

/// deploy ノードをパース
pub fn parse_deploy(node: &KdlNode) -> Result<DeploymentSpec> {
    let mut deployment = DeploymentSpec::default();
    if let Some(id) = argument_string(node) {
        deployment.id = id;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "source" => deployment.source = PathBuf::from(required_string(child)?),
                "prune" => deployment.prune = required_bool(child)?,
                "invalidate" | "invalidation-paths" | "distribution-paths" => {
                    // 無効化パスは常に全パス
                    let paths: Vec<&str> = child
                        .entries()
                        .iter()
                        .filter_map(|e| e.value().as_string())
                        .collect();
                    if paths != INVALIDATION_PATHS {
                        return Err(FlowError::InvalidConfig(format!(
                            "無効化パスは {:?} 固定です: {:?}",
                            INVALIDATION_PATHS, paths
                        )));
                    }
                }
                other => warn!(node = other, "Ignoring unknown node in deploy"),
            }
        }
    }

    Ok(deployment)
}

/// 最初の位置引数
fn argument(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

/// 名前付きプロパティ
fn property<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(name))
        .map(|e| e.value())
}

fn argument_string(node: &KdlNode) -> Option<String> {
    argument(node)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn required_string(node: &KdlNode) -> Result<String> {
    argument_string(node).ok_or_else(|| {
        FlowError::InvalidConfig(format!(
            "{} には文字列を指定してください",
            node.name().value()
        ))
    })
}

fn required_bool(node: &KdlNode) -> Result<bool> {
    argument(node).and_then(|v| v.as_bool()).ok_or_else(|| {
        FlowError::InvalidConfig(format!(
            "{} には #true か #false を指定してください",
            node.name().value()
        ))
    })
}

fn status_code(value: i128) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| FlowError::InvalidConfig(format!("不正なステータスコード: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CachePolicy, RemovalPolicy};

    #[test]
    fn test_parse_full_site() {
        let kdl = r#"
            site "electron-orbital-viewer" {
                region "us-east-1"
                bucket "ElectronOrbitalViewerBucket" {
                    index-document "index.html"
                    error-document "index.html"
                    public-read #true
                    removal-policy "destroy"
                    auto-delete-objects #true
                }
                distribution "ElectronOrbitalViewerDistribution" {
                    cache-policy "caching-optimized"
                    default-root-object "index.html"
                    error-response 404 status=200 page="/index.html"
                }
                deploy "DeployElectronOrbitalViewer" {
                    source "dist"
                    invalidate "/*"
                }
            }
        "#;

        let site = parse_site_string(kdl).unwrap();
        assert_eq!(site.name, "electron-orbital-viewer");
        assert_eq!(site.region, Some("us-east-1".to_string()));
        assert_eq!(site.bucket.id, "ElectronOrbitalViewerBucket");
        assert_eq!(site.bucket.removal_policy, RemovalPolicy::Destroy);
        assert!(site.bucket.auto_delete_objects);
        assert!(site.destroys_content_on_teardown());
        assert_eq!(site.distribution.id, "ElectronOrbitalViewerDistribution");
        assert_eq!(site.distribution.cache_policy, CachePolicy::CachingOptimized);
        assert_eq!(site.distribution.error_responses.len(), 1);
        assert_eq!(site.deployment.id, "DeployElectronOrbitalViewer");
        assert_eq!(site.deployment.source, PathBuf::from("dist"));
    }

    #[test]
    fn test_parse_minimal_site_uses_defaults() {
        let site = parse_site_string(r#"site "demo""#).unwrap();
        assert_eq!(site, Site::new("demo"));
    }

    #[test]
    fn test_fallback_follows_index_document() {
        let kdl = r#"
            site "demo" {
                distribution "Cdn"
                bucket {
                    index-document "app.html"
                }
            }
        "#;

        let site = parse_site_string(kdl).unwrap();
        assert_eq!(site.distribution.id, "Cdn");
        assert_eq!(
            site.distribution.error_responses,
            vec![ErrorResponse::spa_fallback("app.html")]
        );
        assert_eq!(site.default_root_object(), "app.html");
    }

    #[test]
    fn test_error_response_defaults() {
        let kdl = r#"
            site "demo" {
                distribution {
                    error-response 403
                    error-response 404 status=200 page="/404.html"
                }
            }
        "#;

        let site = parse_site_string(kdl).unwrap();
        let responses = &site.distribution.error_responses;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].http_status, 403);
        assert_eq!(responses[0].response_http_status, 200);
        assert_eq!(responses[0].response_page_path, "/index.html");
        assert_eq!(responses[1].response_page_path, "/404.html");
    }

    #[test]
    fn test_reject_plain_http_viewer_protocol() {
        let kdl = r#"
            site "demo" {
                distribution {
                    viewer-protocol "allow-all"
                }
            }
        "#;
        assert!(matches!(
            parse_site_string(kdl),
            Err(FlowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_reject_partial_invalidation() {
        let kdl = r#"
            site "demo" {
                deploy {
                    invalidate "/index.html"
                }
            }
        "#;
        assert!(matches!(
            parse_site_string(kdl),
            Err(FlowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_site_node() {
        assert!(matches!(
            parse_site_string(r#"project "demo""#),
            Err(FlowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_duplicate_site_node() {
        assert!(parse_site_string("site \"a\"\nsite \"b\"").is_err());
    }

    #[test]
    fn test_wrong_value_types() {
        let kdl = r#"
            site "demo" {
                bucket {
                    public-read "yes"
                }
            }
        "#;
        assert!(parse_site_string(kdl).is_err());

        let kdl = r#"
            site "demo" {
                bucket {
                    removal-policy "snapshot"
                }
            }
        "#;
        assert!(parse_site_string(kdl).is_err());
    }
}
