use crate::ProviderKind;
use crate::utils;
use colored::Colorize;
use siteflow_core::{LoadedSite, RemovalPolicy};

pub async fn handle(loaded: &LoadedSite, kind: ProviderKind, yes: bool) -> anyhow::Result<()> {
    utils::print_loaded_site(loaded);
    let bucket = &loaded.site.bucket;

    println!();
    match bucket.removal_policy {
        RemovalPolicy::Retain => {
            println!(
                "{}",
                format!(
                    "ℹ バケット {} は削除ポリシー retain のため残ります（中身も保持）",
                    bucket.id
                )
                .cyan()
            );
        }
        RemovalPolicy::Destroy if bucket.auto_delete_objects => {
            println!(
                "{}",
                format!(
                    "⚠ 警告: バケット {} とその中身がすべて削除されます（removal-policy destroy + auto-delete-objects）",
                    bucket.id
                )
                .red()
                .bold()
            );
        }
        RemovalPolicy::Destroy => {
            println!(
                "{}",
                format!(
                    "⚠ バケット {} は削除されます。中身が残っている場合は削除に失敗します",
                    bucket.id
                )
                .yellow()
            );
        }
    }

    let provider = utils::provider(loaded, kind).await?;
    let state = provider.get_state().await?;
    if state.is_empty() {
        println!("{}", "削除するリソースはありません".dimmed());
        return Ok(());
    }

    println!();
    println!("削除対象: {}個のリソース", state.len());
    for (id, resource) in state.iter() {
        println!("  {} {} ({})", "-".red(), id.bold(), resource.id.dimmed());
    }

    // 確認（--yesが指定されていない場合）
    if !yes {
        println!();
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    utils::ensure_auth(provider.as_ref()).await?;
    println!();
    println!("{}", "削除中...".blue());
    let result = provider.destroy_all().await?;
    utils::report_result(&result)?;

    println!();
    println!("{}", "✓ サイトを削除しました".green().bold());
    Ok(())
}
