use anyhow::{Context, Result};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use teloxide::prelude::Requester;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bot::{self, BotContext, TelegramMessenger};
use crate::config::{resolve_required, Config};
use crate::delivery::Deliverer;
use crate::global;
use crate::index::DeliveryIndex;
use crate::project::ProjectRegistry;
use crate::session::SessionStore;
use crate::zoom::ZoomClient;

/// Resolves the configured projects, including their `env:` credentials.
pub fn load_projects(config: &Config) -> Result<ProjectRegistry> {
    let index_dir = global::index_dir()?;
    ProjectRegistry::from_configs(&config.projects, &index_dir)
}

pub fn zoom_client(config: &Config) -> Result<ZoomClient> {
    Ok(ZoomClient::new(config.zoom.clone())?
        .with_page_size(config.listing.page_size)
        .with_download_timeout(config.delivery.download_timeout()))
}

pub async fn run_service(config: Config) -> Result<()> {
    info!("Starting zoomrelay {}", env!("CARGO_PKG_VERSION"));

    let projects = load_projects(&config)?;
    if projects.is_empty() {
        warn!("No projects configured, /recs will have nothing to offer");
    }
    for project in projects.iter() {
        info!(
            "Project {} -> channel {} (index {:?})",
            project.name, project.channel.chat_id, project.index_file
        );
    }

    let tz = config.display.tz()?;
    let token: Secret<String> = Secret::new(
        resolve_required("telegram.token", &config.telegram.token)
            .context("Telegram bot token is not configured")?,
    );
    let bot = bot::build_bot(&config.telegram, token.expose_secret())?;
    let me = bot.get_me().await.context("Failed to reach Telegram")?;

    let downloads_dir = config.delivery.downloads_dir()?;
    tokio::fs::create_dir_all(&downloads_dir)
        .await
        .with_context(|| format!("Failed to create downloads directory {:?}", downloads_dir))?;
    info!("Recordings are stored in {:?}", downloads_dir);

    let zoom = Arc::new(zoom_client(&config)?);
    let index = Arc::new(DeliveryIndex::new(tz));
    let deliverer = Arc::new(Deliverer::new(
        Arc::new(TelegramMessenger::new(bot.clone())),
        zoom.clone(),
        index,
        downloads_dir,
    ));

    let ctx = Arc::new(BotContext {
        bot,
        bot_username: me.username.clone(),
        projects,
        zoom,
        deliverer,
        sessions: SessionStore::from_config(&config.session),
        listing: config.listing.clone(),
        tz,
    });

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    bot::run(ctx, cancel).await?;

    info!("zoomrelay stopped");
    Ok(())
}
