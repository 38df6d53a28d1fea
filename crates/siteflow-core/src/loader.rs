//! 統合ローダー
//!
//! サイト定義の読み込み、検証、アセット走査、合成を統合

use crate::assets::AssetManifest;
use crate::error::Result;
use crate::model::Site;
use crate::parser::parse_site_file;
use crate::synth::{Template, synthesize};
use crate::validate::{resolve_asset_dir, validate_site};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// プロジェクトディレクトリ（`.siteflow/site.kdl` の場合は1つ上）
const STATE_DIR_NAME: &str = ".siteflow";

/// 読み込み済みのサイト定義
#[derive(Debug, Clone)]
pub struct LoadedSite {
    pub site: Site,

    /// 読み込んだ定義ファイル
    pub file: PathBuf,

    /// 相対パスの基準ディレクトリ
    pub project_root: PathBuf,
}

impl LoadedSite {
    /// 解決済みのアセットディレクトリ
    pub fn asset_dir(&self) -> Result<PathBuf> {
        resolve_asset_dir(&self.site, &self.project_root)
    }

    /// アセットを走査してテンプレートを合成
    #[instrument(skip(self), fields(site = %self.site.name))]
    pub fn synthesize(&self) -> Result<Template> {
        let source = self.asset_dir()?;
        let manifest = AssetManifest::scan(&source)?;
        let template = synthesize(&self.site, &manifest, &source)?;
        info!(
            resources = template.resources.len(),
            assets = manifest.len(),
            "Synthesized template"
        );
        Ok(template)
    }
}

/// サイト定義ファイルを読み込んで検証する
///
/// 以下の処理を実行:
/// 1. KDLパース
/// 2. 構造検証
/// 3. プロジェクトルートの決定
#[instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn load_site<P: AsRef<Path>>(path: P) -> Result<LoadedSite> {
    let file = path.as_ref().to_path_buf();

    debug!("Step 1: Parsing site file");
    let site = parse_site_file(&file)?;

    debug!("Step 2: Validating site");
    validate_site(&site)?;

    let project_root = project_root_for(&file);
    info!(
        site = %site.name,
        project_root = %project_root.display(),
        "Site loaded successfully"
    );

    Ok(LoadedSite {
        site,
        file,
        project_root,
    })
}

fn project_root_for(file: &Path) -> PathBuf {
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if parent.file_name().is_some_and(|n| n == STATE_DIR_NAME) {
        if let Some(grandparent) = parent.parent() {
            if !grandparent.as_os_str().is_empty() {
                return grandparent.to_path_buf();
            }
            return PathBuf::from(".");
        }
    }
    parent
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const SITE: &str = r#"
site "demo" {
    deploy {
        source "public"
    }
}
"#;

    #[test]
    fn test_project_root_for() {
        assert_eq!(
            project_root_for(Path::new("/srv/app/site.kdl")),
            PathBuf::from("/srv/app")
        );
        assert_eq!(
            project_root_for(Path::new("/srv/app/.siteflow/site.kdl")),
            PathBuf::from("/srv/app")
        );
        assert_eq!(project_root_for(Path::new("site.kdl")), PathBuf::from("."));
        assert_eq!(
            project_root_for(Path::new(".siteflow/site.kdl")),
            PathBuf::from(".")
        );
    }

    #[test]
    fn test_load_and_synthesize() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".siteflow")).unwrap();
        fs::create_dir_all(dir.path().join("public")).unwrap();
        fs::write(dir.path().join("public/index.html"), "<html></html>").unwrap();
        let file = dir.path().join(".siteflow/site.kdl");
        fs::write(&file, SITE).unwrap();

        let loaded = load_site(&file).unwrap();
        assert_eq!(loaded.project_root, dir.path());
        assert_eq!(
            loaded.asset_dir().unwrap(),
            fs::canonicalize(dir.path().join("public")).unwrap()
        );

        let template = loaded.synthesize().unwrap();
        let sync = &template.actions()["DeployWebsite"];
        assert!(sync.properties["Manifest"].get("index.html").is_some());
    }

    #[test]
    #[serial]
    fn test_bare_relative_site_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("public/assets")).unwrap();
        fs::write(dir.path().join("public/index.html"), "<html></html>").unwrap();
        fs::write(dir.path().join("public/assets/app.js"), "console.log(1)").unwrap();
        fs::write(dir.path().join("site.kdl"), SITE).unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let relative = load_site("site.kdl").and_then(|loaded| loaded.synthesize());
        std::env::set_current_dir(original_dir).unwrap();

        let relative = relative.unwrap();
        let absolute = load_site(dir.path().join("site.kdl"))
            .unwrap()
            .synthesize()
            .unwrap();
        let manifest = &relative.actions()["DeployWebsite"].properties["Manifest"];
        assert!(manifest.get("assets/app.js").is_some());
        assert_eq!(relative, absolute);
    }

    #[test]
    fn test_synthesize_requires_asset_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("site.kdl");
        fs::write(&file, SITE).unwrap();

        let loaded = load_site(&file).unwrap();
        assert!(loaded.synthesize().is_err());
    }
}
