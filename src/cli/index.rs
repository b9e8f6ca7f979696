use anyhow::{anyhow, Result};

use super::args::IndexCliArgs;
use crate::app;
use crate::config::Config;
use crate::index::DeliveryIndex;

pub async fn handle_index_command(config: &Config, args: IndexCliArgs) -> Result<()> {
    let projects = app::load_projects(config)?;
    let project = projects
        .get(&args.project)
        .ok_or_else(|| anyhow!("Unknown project: {}", args.project))?;
    let index = DeliveryIndex::new(config.display.tz()?);

    if let Some(key) = args.key {
        let refs = index.lookup(project, &key).await;
        if refs.is_empty() {
            println!("Nothing recorded under '{}'.", key);
        } else {
            let ids: Vec<String> = refs.iter().map(|r| r.to_string()).collect();
            println!("{}", ids.join(", "));
        }
        return Ok(());
    }

    let entries = index.entries(project).await;
    if entries.is_empty() {
        println!(
            "No deliveries recorded for {} ({}).",
            project.name,
            project.index_file.display()
        );
        return Ok(());
    }

    println!(
        "{} entr(ies) in {}:\n",
        entries.len(),
        project.index_file.display()
    );
    for entry in entries {
        let recorded = entry
            .recorded_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>8}  {:<16}  {:<24}  {}",
            entry.message_id.to_string(),
            recorded,
            entry.recording_id.as_deref().unwrap_or("-"),
            entry.key
        );
    }

    Ok(())
}
