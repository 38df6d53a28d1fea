use crate::ProviderKind;
use crate::utils;
use colored::Colorize;
use siteflow_core::LoadedSite;

pub async fn handle(loaded: &LoadedSite, kind: ProviderKind, yes: bool) -> anyhow::Result<()> {
    println!("{}", "🚀 デプロイを準備中...".blue().bold());
    utils::print_loaded_site(loaded);
    utils::warn_destructive_teardown(loaded);

    let provider = utils::provider(loaded, kind).await?;
    utils::ensure_auth(provider.as_ref()).await?;

    let desired = utils::resource_set(loaded, provider.as_ref())?;
    let plan = provider.plan(&desired).await?;
    utils::print_plan(&plan);

    if !plan.has_changes() {
        println!("{}", "✓ 変更はありません".green());
        utils::print_outputs(&provider.outputs().await?);
        return Ok(());
    }

    // 確認（--yesが指定されていない場合）
    if !yes {
        println!();
        println!("{}", "⚠ 上記の変更が適用されます".yellow());
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    println!();
    println!("{}", "適用中...".blue());
    let result = provider.apply(&plan).await?;
    utils::report_result(&result)?;

    println!();
    println!("{}", "✓ デプロイが完了しました".green().bold());
    utils::print_outputs(&result.outputs);
    Ok(())
}
