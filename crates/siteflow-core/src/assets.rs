//! アセットマニフェスト
//!
//! ビルド済みディレクトリを走査し、オブジェクトキーごとのハッシュを記録する。
//! マニフェストが変わらなければコンテンツ同期は no-op になる。

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// アップロード対象の1ファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFile {
    /// オブジェクトキー（区切りは常に `/`）
    pub key: String,

    /// 内容の SHA-256（16進）
    pub sha256: String,

    pub size: u64,

    pub content_type: String,
}

/// ディレクトリ全体のマニフェスト
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// 走査したディレクトリ
    pub root: PathBuf,

    /// キー順に並んだファイル
    pub files: BTreeMap<String, AssetFile>,
}

impl AssetManifest {
    /// ディレクトリを再帰的に走査する
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.exists() {
            return Err(FlowError::AssetDirNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(FlowError::AssetDirInvalid(root.to_path_buf()));
        }

        // glob は `./` を落として返すため、正規化したパスで走査する
        let root = fs::canonicalize(root)?;
        let root_str = root
            .to_str()
            .ok_or_else(|| FlowError::AssetScan(format!("非UTF-8パス: {}", root.display())))?;
        let pattern = format!("{}/**/*", glob::Pattern::escape(root_str));

        let mut files = BTreeMap::new();
        let entries = glob::glob(&pattern).map_err(|e| FlowError::AssetScan(e.to_string()))?;
        for entry in entries {
            let path = entry.map_err(|e| FlowError::AssetScan(e.to_string()))?;
            if !path.is_file() {
                continue;
            }

            let key = object_key(&root, &path)?;
            let bytes = fs::read(&path)?;
            let file = AssetFile {
                sha256: hex::encode(Sha256::digest(&bytes)),
                size: bytes.len() as u64,
                content_type: content_type_for(&path).to_string(),
                key: key.clone(),
            };
            files.insert(key, file);
        }

        debug!(root = %root.display(), files = files.len(), "Scanned asset directory");
        Ok(Self { root, files })
    }

    pub fn get(&self, key: &str) -> Option<&AssetFile> {
        self.files.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetFile> {
        self.files.values()
    }

    /// テンプレートに埋め込む形式 `{ key: { Sha256, Size, ContentType } }`
    pub fn to_value(&self) -> serde_json::Value {
        let entries: serde_json::Map<String, serde_json::Value> = self
            .files
            .values()
            .map(|f| {
                (
                    f.key.clone(),
                    serde_json::json!({
                        "Sha256": f.sha256,
                        "Size": f.size,
                        "ContentType": f.content_type,
                    }),
                )
            })
            .collect();
        serde_json::Value::Object(entries)
    }
}

fn object_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| FlowError::AssetScan(e.to_string()))?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(segments.join("/"))
}

/// 拡張子から Content-Type を決める
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "wasm" => "application/wasm",
        "glb" => "model/gltf-binary",
        "gltf" => "model/gltf+json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, key: &str, content: &str) {
        let path = root.join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", "<html></html>");
        write(dir.path(), "assets/app.js", "console.log(1)");

        let manifest = AssetManifest::scan(dir.path()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains("index.html"));

        let app = manifest.get("assets/app.js").unwrap();
        assert_eq!(app.content_type, "text/javascript");
        assert_eq!(app.size, 14);
        assert!(manifest.root.is_absolute());
    }

    #[test]
    fn test_scan_keys_do_not_depend_on_path_spelling() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "dist/index.html", "<html></html>");
        write(dir.path(), "dist/assets/app.js", "console.log(1)");

        let plain = AssetManifest::scan(&dir.path().join("dist")).unwrap();
        let dotted = AssetManifest::scan(&dir.path().join(".").join("dist")).unwrap();
        let detour = AssetManifest::scan(&dir.path().join("dist/assets/..")).unwrap();

        assert_eq!(plain, dotted);
        assert_eq!(plain, detour);
        assert!(plain.contains("assets/app.js"));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", "v1");
        let first = AssetManifest::scan(dir.path()).unwrap();

        write(dir.path(), "index.html", "v2");
        let second = AssetManifest::scan(dir.path()).unwrap();

        assert_ne!(
            first.get("index.html").unwrap().sha256,
            second.get("index.html").unwrap().sha256
        );
        assert_eq!(AssetManifest::scan(dir.path()).unwrap(), second);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = AssetManifest::scan(&dir.path().join("dist"));
        assert!(matches!(result, Err(FlowError::AssetDirNotFound(_))));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "dist", "not a dir");
        let result = AssetManifest::scan(&dir.path().join("dist"));
        assert!(matches!(result, Err(FlowError::AssetDirInvalid(_))));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a/INDEX.HTML")), "text/html");
        assert_eq!(content_type_for(Path::new("a.wasm")), "application/wasm");
        assert_eq!(content_type_for(Path::new("LICENSE")), "application/octet-stream");
    }
}
