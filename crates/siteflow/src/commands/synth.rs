use crate::TemplateFormat;
use colored::Colorize;
use siteflow_core::LoadedSite;
use std::path::Path;

pub fn handle(
    loaded: &LoadedSite,
    format: TemplateFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let template = loaded.synthesize()?;
    let rendered = match format {
        TemplateFormat::Json => template.to_json()?,
        TemplateFormat::Yaml => template.to_yaml()?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            eprintln!(
                "{} テンプレートを書き出しました: {}",
                "✓".green(),
                path.display().to_string().cyan()
            );
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
