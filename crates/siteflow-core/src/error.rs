use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error(
        "アセットディレクトリが見つかりません: {0}\nヒント: Webアプリを先にビルドしてください (例: npm run build)"
    )]
    AssetDirNotFound(PathBuf),

    #[error("アセットパスがディレクトリではありません: {0}")]
    AssetDirInvalid(PathBuf),

    #[error("アセットの走査に失敗しました: {0}")]
    AssetScan(String),

    #[error("JSONシリアライズエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAMLシリアライズエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("リソースグラフエラー: {0}")]
    Graph(#[from] siteflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, FlowError>;
