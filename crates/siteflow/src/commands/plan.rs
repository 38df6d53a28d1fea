use crate::ProviderKind;
use crate::utils;
use colored::Colorize;
use siteflow_core::LoadedSite;

pub async fn handle(loaded: &LoadedSite, kind: ProviderKind) -> anyhow::Result<()> {
    utils::print_loaded_site(loaded);
    utils::warn_destructive_teardown(loaded);
    let provider = utils::provider(loaded, kind).await?;
    utils::ensure_auth(provider.as_ref()).await?;

    let desired = utils::resource_set(loaded, provider.as_ref())?;
    let plan = provider.plan(&desired).await?;
    utils::print_plan(&plan);

    if !plan.has_changes() {
        println!("{}", "✓ 変更はありません".green());
    }
    Ok(())
}
