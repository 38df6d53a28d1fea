mod commands;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "site")]
#[command(about = "静的サイトを、宣言ひとつで。S3 + CloudFront へのデプロイツール", long_about = None)]
struct Cli {
    /// サイト定義ファイル（省略時は自動検出）
    #[arg(short = 'f', long = "file", global = true)]
    file: Option<PathBuf>,

    /// 詳細なログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// デプロイ先のプロバイダー
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// ローカルエミュレーション（.siteflow/local）
    Local,
    /// AWS（CloudFormation + S3 + CloudFront）
    Aws,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TemplateFormat {
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// サイト定義を検証
    Validate,
    /// テンプレートを合成して出力
    Synth {
        /// 出力形式
        #[arg(long, value_enum, default_value = "json")]
        format: TemplateFormat,
        /// 出力先ファイル（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 変更内容を表示（適用はしない）
    Plan {
        /// プロバイダー (local, aws)
        #[arg(short, long, value_enum, env = siteflow_config::PROVIDER_ENV, default_value = "local")]
        provider: ProviderKind,
    },
    /// サイトをデプロイ
    /// インフラを作成・更新し、アセットをアップロードしてキャッシュを無効化
    Deploy {
        /// プロバイダー (local, aws)
        #[arg(short, long, value_enum, env = siteflow_config::PROVIDER_ENV, default_value = "local")]
        provider: ProviderKind,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// サイトを削除
    Destroy {
        /// プロバイダー (local, aws)
        #[arg(short, long, value_enum, env = siteflow_config::PROVIDER_ENV, default_value = "local")]
        provider: ProviderKind,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// デプロイ済みサイトのURLを表示
    Outputs {
        /// プロバイダー (local, aws)
        #[arg(short, long, value_enum, env = siteflow_config::PROVIDER_ENV, default_value = "local")]
        provider: ProviderKind,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr（stdout は synth の出力に使う）
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("siteflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let loaded = utils::load(cli.file.as_deref())?;

    match cli.command {
        Commands::Validate => commands::validate::handle(&loaded)?,
        Commands::Synth { format, output } => {
            commands::synth::handle(&loaded, format, output.as_deref())?
        }
        Commands::Plan { provider } => commands::plan::handle(&loaded, provider).await?,
        Commands::Deploy { provider, yes } => {
            commands::deploy::handle(&loaded, provider, yes).await?
        }
        Commands::Destroy { provider, yes } => {
            commands::destroy::handle(&loaded, provider, yes).await?
        }
        Commands::Outputs { provider } => commands::outputs::handle(&loaded, provider).await?,
        // 処理済み
        Commands::Version => {}
    }

    Ok(())
}
