use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "zoomrelay")]
#[command(about = "Relay Zoom cloud recordings to Telegram", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the Telegram bot (the default)
    Run,
    /// List configured projects
    Projects,
    /// List a project's recordings the way /recs shows them
    Recordings(RecordingsCliArgs),
    /// Show a project's delivery index
    Index(IndexCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct RecordingsCliArgs {
    /// Project name
    pub project: String,
    /// Start date (YYYY-MM-DD), defaults to the configured lookback
    #[arg(long)]
    pub from: Option<String>,
    /// End date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct IndexCliArgs {
    /// Project name
    pub project: String,
    /// Only show message ids recorded under this display key
    #[arg(short, long)]
    pub key: Option<String>,
}
