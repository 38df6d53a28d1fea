use crate::ProviderKind;
use crate::utils;
use siteflow_core::LoadedSite;

pub async fn handle(loaded: &LoadedSite, kind: ProviderKind) -> anyhow::Result<()> {
    let provider = utils::provider(loaded, kind).await?;
    let outputs = provider.outputs().await?;
    utils::print_outputs(&outputs);
    Ok(())
}
