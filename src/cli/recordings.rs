use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};

use super::args::RecordingsCliArgs;
use crate::app;
use crate::config::Config;
use crate::zoom::EmptyListingPolicy;

pub async fn handle_recordings_command(config: &Config, args: RecordingsCliArgs) -> Result<()> {
    let projects = app::load_projects(config)?;
    let project = projects
        .get(&args.project)
        .ok_or_else(|| anyhow!("Unknown project: {}", args.project))?;
    let tz = config.display.tz()?;

    let (default_from, default_to) = config.listing.date_range(Utc::now().date_naive());
    let from = parse_date(args.from.as_deref())?.unwrap_or(default_from);
    let to = parse_date(args.to.as_deref())?.unwrap_or(default_to);

    let zoom = app::zoom_client(config)?;
    let meetings = zoom
        .fetch_recordings(project, from, to, EmptyListingPolicy::default())
        .await?;

    if meetings.is_empty() {
        println!("No finished recordings for {} between {} and {}.", project.name, from, to);
        return Ok(());
    }

    println!("{} recording(s) for {}:\n", meetings.len(), project.name);
    for (i, meeting) in meetings.iter().enumerate() {
        let size = meeting
            .file_size
            .map(|b| format!(" ({:.1} MB)", b as f64 / (1024.0 * 1024.0)))
            .unwrap_or_default();
        println!("{:>3}. {}{}", i + 1, meeting.display_key(tz), size);
        println!("     {}", meeting.artifact_file_name());
    }

    Ok(())
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(|value| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
    })
    .transpose()
}
