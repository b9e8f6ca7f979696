use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zoomrelay::{
    app,
    cli::{
        handle_index_command, handle_projects_command, handle_recordings_command, Cli, CliCommand,
    },
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Some(CliCommand::Version) = cli.command {
        println!("zoomrelay {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(CliCommand::Projects) => handle_projects_command(&config),
        Some(CliCommand::Recordings(args)) => handle_recordings_command(&config, args).await,
        Some(CliCommand::Index(args)) => handle_index_command(&config, args).await,
        Some(CliCommand::Run) | Some(CliCommand::Version) | None => app::run_service(config).await,
    }
}
