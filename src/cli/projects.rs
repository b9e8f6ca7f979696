use anyhow::Result;

use crate::app;
use crate::config::Config;

pub fn handle_projects_command(config: &Config) -> Result<()> {
    let projects = app::load_projects(config)?;

    if projects.is_empty() {
        println!("No projects configured. Add [[projects]] entries to the config file.");
        return Ok(());
    }

    println!("{} project(s):\n", projects.len());
    for project in projects.iter() {
        let thread = project
            .channel
            .thread_id
            .map(|t| format!(" (thread {})", t))
            .unwrap_or_default();
        println!("  {} [{}]", project.name, project.slug);
        println!("    channel: {}{}", project.channel.chat_id, thread);
        println!("    index:   {}", project.index_file.display());
    }

    Ok(())
}
