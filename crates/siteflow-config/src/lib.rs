pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// サイト定義ファイルの直接指定
pub const CONFIG_PATH_ENV: &str = "SITEFLOW_CONFIG_PATH";
/// 既定のプロバイダー（local / aws）
pub const PROVIDER_ENV: &str = "SITEFLOW_PROVIDER";
/// スタック名の上書き
pub const STACK_NAME_ENV: &str = "SITEFLOW_STACK_NAME";
/// リージョンの上書き
pub const REGION_ENV: &str = "AWS_REGION";
/// CloudFormation スタックの完了待ち上限（秒）
pub const STACK_TIMEOUT_ENV: &str = "SITEFLOW_STACK_TIMEOUT_SECS";

const CANDIDATES: [&str; 4] = ["site.local.kdl", ".site.local.kdl", "site.kdl", ".site.kdl"];

/// グローバル設定ディレクトリ（~/.config/siteflow）
pub fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("siteflow"))
}

/// カレントディレクトリを起点にサイト定義を探す
pub fn find_site_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_site_file_from(&current_dir)
}

/// 指定ディレクトリを起点にサイト定義を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 SITEFLOW_CONFIG_PATH (直接パス指定)
/// 2. 起点ディレクトリ: site.local.kdl, .site.local.kdl, site.kdl, .site.kdl
/// 3. ./.siteflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/siteflow/site.kdl (グローバル設定)
pub fn find_site_file_from(dir: &Path) -> Result<PathBuf> {
    // 1. 環境変数で直接指定（指定されたのに無ければエラー）
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(&config_path);
        if path.is_file() {
            return Ok(path);
        }
        return Err(ConfigError::ConfigPathMissing(config_path));
    }

    // 2. 起点ディレクトリ
    if let Some(path) = first_existing(dir) {
        return Ok(path);
    }

    // 3. ./.siteflow/
    let site_dir = dir.join(".siteflow");
    if site_dir.is_dir() {
        if let Some(path) = first_existing(&site_dir) {
            return Ok(path);
        }
    }

    // 4. グローバル設定
    if let Some(config_dir) = global_config_dir() {
        let global_config = config_dir.join("site.kdl");
        if global_config.is_file() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::SiteFileNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// 環境変数による上書き
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub stack_name: Option<String>,
    pub region: Option<String>,
    pub stack_timeout_secs: Option<u64>,
}

impl EnvOverrides {
    /// 空文字列は未指定として扱う
    pub fn from_env() -> Result<Self> {
        let stack_timeout_secs = non_empty_var(STACK_TIMEOUT_ENV)
            .map(|value| match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(secs),
                _ => Err(ConfigError::InvalidEnvValue {
                    name: STACK_TIMEOUT_ENV.to_string(),
                    value,
                }),
            })
            .transpose()?;

        Ok(Self {
            stack_name: non_empty_var(STACK_NAME_ENV),
            region: non_empty_var(REGION_ENV),
            stack_timeout_secs,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_global_config_dir() {
        if let Some(config_dir) = global_config_dir() {
            assert!(config_dir.ends_with("siteflow"));
        }
    }

    #[test]
    #[serial]
    fn test_find_site_file_in_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("site.kdl"), "// test").unwrap();

        let result = find_site_file_from(temp_dir.path()).unwrap();
        assert!(result.ends_with("site.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("site.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join(".site.local.kdl"), "// local").unwrap();

        let result = find_site_file_from(temp_dir.path()).unwrap();
        assert!(result.ends_with(".site.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_site_file_in_site_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let site_dir = temp_dir.path().join(".siteflow");
        fs::create_dir(&site_dir).unwrap();
        fs::write(site_dir.join("site.kdl"), "// in site dir").unwrap();

        let result = find_site_file_from(temp_dir.path()).unwrap();
        assert!(result.ends_with(".siteflow/site.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_site_file_from_cwd() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("site.kdl"), "// test").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_site_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("site.kdl"));
    }

    #[test]
    #[serial]
    fn test_env_var_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        }
        let found = find_site_file_from(temp_dir.path());

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, temp_dir.path().join("missing.kdl"));
        }
        let missing = find_site_file_from(temp_dir.path());

        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        assert_eq!(found.unwrap(), config_path);
        assert!(matches!(missing, Err(ConfigError::ConfigPathMissing(_))));
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let global = dirs::config_dir().map(|d| d.join("siteflow").join("site.kdl"));
        if global.is_some_and(|p| p.exists()) {
            return;
        }

        let result = find_site_file_from(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::SiteFileNotFound)));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var(STACK_NAME_ENV, "demo-staging");
            std::env::set_var(REGION_ENV, "  ");
        }
        let overrides = EnvOverrides::from_env().unwrap();
        unsafe {
            std::env::remove_var(STACK_NAME_ENV);
            std::env::remove_var(REGION_ENV);
        }

        assert_eq!(overrides.stack_name.as_deref(), Some("demo-staging"));
        assert_eq!(overrides.region, None);
        assert_eq!(overrides.stack_timeout_secs, None);
    }

    #[test]
    #[serial]
    fn test_stack_timeout_override() {
        unsafe {
            std::env::set_var(STACK_TIMEOUT_ENV, "3600");
        }
        let valid = EnvOverrides::from_env();
        unsafe {
            std::env::set_var(STACK_TIMEOUT_ENV, "half an hour");
        }
        let invalid = EnvOverrides::from_env();
        unsafe {
            std::env::set_var(STACK_TIMEOUT_ENV, "0");
        }
        let zero = EnvOverrides::from_env();
        unsafe {
            std::env::remove_var(STACK_TIMEOUT_ENV);
        }

        assert_eq!(valid.unwrap().stack_timeout_secs, Some(3600));
        assert!(matches!(
            invalid,
            Err(ConfigError::InvalidEnvValue { ref name, .. }) if name == STACK_TIMEOUT_ENV
        ));
        assert!(zero.is_err());
    }
}
