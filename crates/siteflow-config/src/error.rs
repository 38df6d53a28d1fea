use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "サイト定義が見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: site.local.kdl, .site.local.kdl, site.kdl, .site.kdl\n\
        - ./.siteflow/ ディレクトリ\n\
        - ~/.config/siteflow/site.kdl\n\
        または SITEFLOW_CONFIG_PATH 環境変数で直接指定できます"
    )]
    SiteFileNotFound,

    #[error("SITEFLOW_CONFIG_PATH が存在しないファイルを指しています: {0}")]
    ConfigPathMissing(String),

    #[error("環境変数 {name} の値が不正です: {value}")]
    InvalidEnvValue { name: String, value: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
