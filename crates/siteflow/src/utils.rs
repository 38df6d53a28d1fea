use crate::ProviderKind;
use colored::Colorize;
use siteflow_cloud::{ActionType, ApplyResult, CloudProvider, Plan, ResourceSet};
use siteflow_cloud_aws::{AwsProvider, WaitOptions};
use siteflow_cloud_local::LocalProvider;
use siteflow_config::EnvOverrides;
use siteflow_core::LoadedSite;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// リージョン未指定時の既定値
const DEFAULT_REGION: &str = "us-east-1";

/// サイト定義を読み込み、環境変数の上書きを適用する
///
/// - `SITEFLOW_STACK_NAME` はサイト定義のスタック名より優先
/// - `AWS_REGION` はサイト定義にリージョンがない場合のみ使用
pub fn load(file: Option<&Path>) -> anyhow::Result<LoadedSite> {
    let path = match file {
        Some(path) => path.to_path_buf(),
        None => siteflow_config::find_site_file()?,
    };
    tracing::debug!(path = %path.display(), "Loading site file");

    let mut loaded = siteflow_core::load_site(&path)?;
    apply_overrides(&mut loaded, EnvOverrides::from_env()?);
    Ok(loaded)
}

fn apply_overrides(loaded: &mut LoadedSite, overrides: EnvOverrides) {
    if let Some(stack_name) = overrides.stack_name {
        tracing::info!(stack = %stack_name, "Stack name overridden by environment");
        loaded.site.stack_name = Some(stack_name);
    }
    if loaded.site.region.is_none() {
        loaded.site.region = overrides.region;
    }
}

pub fn region(loaded: &LoadedSite) -> &str {
    loaded.site.region.as_deref().unwrap_or(DEFAULT_REGION)
}

/// 読み込んだ設定ファイル情報を表示
pub fn print_loaded_site(loaded: &LoadedSite) {
    println!(
        "📄 サイト定義: {}",
        loaded.file.display().to_string().cyan()
    );
    println!(
        "   サイト: {}  スタック: {}  リージョン: {}",
        loaded.site.name.cyan(),
        loaded.site.stack_name().cyan(),
        region(loaded).cyan()
    );
}

/// テアダウンでコンテンツが消える設定なら警告
pub fn warn_destructive_teardown(loaded: &LoadedSite) {
    if loaded.site.destroys_content_on_teardown() {
        println!(
            "{}",
            format!(
                "⚠ 警告: removal-policy destroy + auto-delete-objects のため、site destroy でバケット {} と中身がすべて削除されます",
                loaded.site.bucket.id
            )
            .red()
            .bold()
        );
    }
}

/// プロバイダーを生成
pub async fn provider(
    loaded: &LoadedSite,
    kind: ProviderKind,
) -> anyhow::Result<Box<dyn CloudProvider>> {
    let stack_name = loaded.site.stack_name().to_string();
    let region = region(loaded).to_string();
    Ok(match kind {
        ProviderKind::Local => Box::new(
            LocalProvider::new(&loaded.project_root, stack_name).with_region(region),
        ),
        ProviderKind::Aws => {
            let wait = wait_options(&EnvOverrides::from_env()?);
            Box::new(
                AwsProvider::new(&loaded.project_root, stack_name, region)
                    .await
                    .with_wait_options(wait),
            )
        }
    })
}

/// スタック完了待ちの設定（`SITEFLOW_STACK_TIMEOUT_SECS` で上限を変更）
fn wait_options(overrides: &EnvOverrides) -> WaitOptions {
    let mut wait = WaitOptions::default();
    if let Some(secs) = overrides.stack_timeout_secs {
        wait.deadline = Duration::from_secs(secs);
    }
    wait
}

/// 認証を確認し、使えない場合はエラー
pub async fn ensure_auth(provider: &dyn CloudProvider) -> anyhow::Result<()> {
    let status = provider.check_auth().await?;
    if !status.authenticated {
        return Err(anyhow::anyhow!(
            "{} の認証に失敗しました: {}",
            provider.display_name(),
            status.error.unwrap_or_default()
        ));
    }
    if let Some(account) = status.account_info {
        println!("🔑 {}: {}", provider.display_name(), account.dimmed());
    }
    Ok(())
}

/// サイトを合成してプロバイダー向けのリソースセットにする
pub fn resource_set(loaded: &LoadedSite, provider: &dyn CloudProvider) -> anyhow::Result<ResourceSet> {
    let template = loaded.synthesize()?;
    Ok(template.resource_set(provider.name())?)
}

/// プランを表示
pub fn print_plan(plan: &Plan) {
    println!();
    for action in &plan.actions {
        let (marker, label) = match action.action_type {
            ActionType::Create => ("+".green(), "作成".green()),
            ActionType::Update => ("~".yellow(), "更新".yellow()),
            ActionType::Delete => ("-".red(), "削除".red()),
            ActionType::NoOp => ("=".dimmed(), "変更なし".dimmed()),
        };
        println!(
            "  {} {} ({}) {}",
            marker,
            action.resource_id.bold(),
            action.resource_type.dimmed(),
            label
        );
    }
    println!();
    println!("プラン: {}", plan.summary());
}

/// 適用結果を表示し、失敗があればエラーにする
pub fn report_result(result: &ApplyResult) -> anyhow::Result<()> {
    for success in &result.succeeded {
        println!("  {} {}", "✓".green(), success.message);
    }
    for failure in &result.failed {
        eprintln!(
            "  {} {}: {}",
            "✗".red(),
            failure.action_id,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!(
        "{}",
        format!("({:.1}秒)", result.duration_ms as f64 / 1000.0).dimmed()
    );

    if !result.is_success() {
        return Err(anyhow::anyhow!(
            "{}件のアクションが失敗しました",
            result.failed.len()
        ));
    }
    Ok(())
}

/// 出力値を表示
pub fn print_outputs(outputs: &BTreeMap<String, String>) {
    if outputs.is_empty() {
        println!("{}", "出力はまだありません（未デプロイ）".yellow());
        return;
    }
    println!();
    println!("出力:");
    for (name, value) in outputs {
        println!("  {} = {}", name.cyan(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteflow_core::Site;
    use std::path::PathBuf;

    fn loaded(site: Site) -> LoadedSite {
        LoadedSite {
            site,
            file: PathBuf::from("site.kdl"),
            project_root: PathBuf::from("."),
        }
    }

    #[test]
    fn test_stack_name_override_wins() {
        let mut site = loaded(Site::new("orbitals"));
        apply_overrides(
            &mut site,
            EnvOverrides {
                stack_name: Some("orbitals-staging".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(site.site.stack_name(), "orbitals-staging");
        assert_eq!(region(&site), DEFAULT_REGION);
    }

    #[test]
    fn test_region_override_only_fills_missing_region() {
        let mut declared = Site::new("orbitals");
        declared.region = Some("eu-west-1".to_string());
        let mut declared = loaded(declared);
        apply_overrides(
            &mut declared,
            EnvOverrides {
                region: Some("ap-northeast-1".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(region(&declared), "eu-west-1");

        let mut open = loaded(Site::new("orbitals"));
        apply_overrides(
            &mut open,
            EnvOverrides {
                region: Some("ap-northeast-1".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(region(&open), "ap-northeast-1");
    }

    #[test]
    fn test_stack_timeout_sets_wait_deadline() {
        let default = wait_options(&EnvOverrides::default());
        assert_eq!(default.deadline, WaitOptions::default().deadline);

        let hour = wait_options(&EnvOverrides {
            stack_timeout_secs: Some(3600),
            ..Default::default()
        });
        assert_eq!(hour.deadline, Duration::from_secs(3600));
        assert_eq!(hour.poll_interval, WaitOptions::default().poll_interval);
    }
}
