//! サイト定義の検証
//!
//! リモート呼び出しの前にローカルで検出できる誤りをすべてここで弾く。

use crate::error::{FlowError, Result};
use crate::model::{RemovalPolicy, Site};
use std::path::{Path, PathBuf};
use tracing::warn;

/// 構造上の検証（ファイルシステムには触れない）
pub fn validate_site(site: &Site) -> Result<()> {
    validate_site_name(&site.name)?;
    if let Some(stack_name) = &site.stack_name {
        validate_site_name(stack_name)?;
    }

    let mut ids = vec![
        site.bucket.id.as_str(),
        site.distribution.id.as_str(),
        site.deployment.id.as_str(),
    ];
    for id in &ids {
        validate_logical_id(id)?;
    }
    ids.sort_unstable();
    if ids.windows(2).any(|w| w[0] == w[1]) {
        return Err(invalid("bucket / distribution / deploy の論理IDが重複しています"));
    }

    validate_document("index-document", &site.bucket.index_document)?;
    validate_document("error-document", &site.bucket.error_document)?;
    if let Some(root) = &site.distribution.default_root_object {
        validate_document("default-root-object", root)?;
    }

    for response in &site.distribution.error_responses {
        if !(400..=599).contains(&response.http_status) {
            return Err(invalid(format!(
                "error-response のステータスは 400〜599 で指定してください: {}",
                response.http_status
            )));
        }
        if !(200..=599).contains(&response.response_http_status) {
            return Err(invalid(format!(
                "error-response の status は 200〜599 で指定してください: {}",
                response.response_http_status
            )));
        }
        if !response.response_page_path.starts_with('/') {
            return Err(invalid(format!(
                "error-response の page は / で始めてください: {}",
                response.response_page_path
            )));
        }
    }
    let mut codes: Vec<u16> = site
        .distribution
        .error_responses
        .iter()
        .map(|r| r.http_status)
        .collect();
    codes.sort_unstable();
    if codes.windows(2).any(|w| w[0] == w[1]) {
        return Err(invalid("error-response のステータスが重複しています"));
    }

    if site.bucket.auto_delete_objects && site.bucket.removal_policy != RemovalPolicy::Destroy {
        return Err(invalid(
            "auto-delete-objects には removal-policy \"destroy\" が必要です",
        ));
    }

    if !site.bucket.public_read {
        warn!(
            bucket = %site.bucket.id,
            "public-read is off: the website endpoint and the distribution origin will answer 403"
        );
    }
    if site.destroys_content_on_teardown() {
        warn!(
            bucket = %site.bucket.id,
            "Teardown deletes the bucket and all objects (not recommended for production)"
        );
    }

    Ok(())
}

/// アセットディレクトリを解決して存在を確認する
pub fn resolve_asset_dir(site: &Site, project_root: &Path) -> Result<PathBuf> {
    let source = &site.deployment.source;
    let dir = if source.is_absolute() {
        source.clone()
    } else {
        project_root.join(source)
    };

    if !dir.exists() {
        return Err(FlowError::AssetDirNotFound(dir));
    }
    if !dir.is_dir() {
        return Err(FlowError::AssetDirInvalid(dir));
    }
    // 指定の仕方（相対/絶対、`./`）に依らず同じパスにする
    let dir = std::fs::canonicalize(&dir)?;
    if !dir.join(&site.bucket.index_document).is_file() {
        warn!(
            dir = %dir.display(),
            index = %site.bucket.index_document,
            "Asset directory has no index document"
        );
    }

    Ok(dir)
}

/// スタック名の規則: 英字で始まり、英数字とハイフンのみ、128文字以内
fn validate_site_name(name: &str) -> Result<()> {
    let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let allowed = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !starts_with_letter || !allowed || name.len() > 128 {
        return Err(invalid(format!(
            "サイト名は英字で始まり英数字とハイフンのみ使用できます: {}",
            name
        )));
    }
    Ok(())
}

/// 論理IDの規則: 英数字のみ
fn validate_logical_id(id: &str) -> Result<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) || id.len() > 255 {
        return Err(invalid(format!("論理IDは英数字のみ使用できます: {:?}", id)));
    }
    Ok(())
}

fn validate_document(field: &str, document: &str) -> Result<()> {
    if document.is_empty() || document.starts_with('/') || document.split('/').any(|s| s == "..")
    {
        return Err(invalid(format!(
            "{} はバケット内の相対キーで指定してください: {:?}",
            field, document
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> FlowError {
    FlowError::InvalidConfig(message.into())
}
