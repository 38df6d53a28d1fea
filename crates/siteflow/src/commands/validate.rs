use colored::Colorize;
use siteflow_core::LoadedSite;

pub fn handle(loaded: &LoadedSite) -> anyhow::Result<()> {
    println!("{}", "サイト定義を検証中...".blue());
    crate::utils::print_loaded_site(loaded);

    let site = &loaded.site;
    let asset_dir = match loaded.asset_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ アセットディレクトリのエラー".red().bold());
            eprintln!("  {}", e);
            return Err(e.into());
        }
    };

    println!("{}", "✓ サイト定義は正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!(
        "  バケット: {} (index: {}, error: {})",
        site.bucket.id.cyan(),
        site.bucket.index_document,
        site.bucket.error_document
    );
    println!(
        "    公開読み取り: {}  削除ポリシー: {}  自動削除: {}",
        if site.bucket.public_read { "有効" } else { "無効" },
        site.bucket.removal_policy,
        if site.bucket.auto_delete_objects { "有効" } else { "無効" }
    );
    println!(
        "  ディストリビューション: {} (ルート: {})",
        site.distribution.id.cyan(),
        site.default_root_object()
    );
    for response in &site.distribution.error_responses {
        println!(
            "    {} → {} {}",
            response.http_status, response.response_http_status, response.response_page_path
        );
    }
    println!(
        "  コンテンツ同期: {} ({})",
        site.deployment.id.cyan(),
        asset_dir.display()
    );

    Ok(())
}
