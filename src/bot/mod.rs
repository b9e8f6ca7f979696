//! Telegram front end: long polling, commands and inline keyboards.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use teloxide::{
    prelude::*,
    types::{AllowedUpdate, BotCommand, UpdateKind},
    ApiError, RequestError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TelegramConfig;
use crate::lock::KeyedLocks;

pub mod command;
pub mod handlers;
mod messenger;

pub use handlers::BotContext;
pub use messenger::TelegramMessenger;

const POLL_TIMEOUT_SECS: u32 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Builds the bot client from config.
///
/// The HTTP timeout must outlast both long polling and large uploads.
pub fn build_bot(config: &TelegramConfig, token: &str) -> Result<Bot> {
    let timeout =
        Duration::from_secs(config.request_timeout_secs.max(u64::from(POLL_TIMEOUT_SECS) + 15));
    let client = teloxide::net::default_reqwest_settings()
        .timeout(timeout)
        .build()
        .context("Failed to create Telegram HTTP client")?;

    let mut bot = Bot::with_client(token, client);
    if let Some(api_url) = config.api_url.as_deref().filter(|u| !u.trim().is_empty()) {
        let url = reqwest::Url::parse(api_url)
            .with_context(|| format!("Invalid Telegram API URL: {}", api_url))?;
        info!("Using Telegram Bot API at {}", url);
        bot = bot.set_api_url(url);
    }
    Ok(bot)
}

/// Polls for updates until `cancel` fires.
pub async fn run(ctx: Arc<BotContext>, cancel: CancellationToken) -> Result<()> {
    let bot = ctx.bot.clone();

    bot.delete_webhook()
        .await
        .context("Failed to clear Telegram webhook")?;

    let commands = vec![
        BotCommand::new("start", "Welcome message"),
        BotCommand::new("recs", "Browse recordings"),
        BotCommand::new("help", "Show available commands"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("Failed to register bot commands: {}", e);
    }

    info!(
        "Telegram bot @{} polling",
        ctx.bot_username.as_deref().unwrap_or("unknown")
    );

    // Updates for one chat run one at a time; different chats run concurrently.
    let gates: Arc<KeyedLocks<i64>> = Arc::new(KeyedLocks::new());
    let mut offset: i32 = 0;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Telegram polling stopped");
                return Ok(());
            }
            result = bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                .send() => result,
        };

        let updates = match result {
            Ok(updates) => updates,
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                anyhow::bail!("Another bot instance is already polling with this token");
            }
            Err(e) => {
                warn!("Telegram getUpdates failed: {}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        debug!("Got {} Telegram update(s)", updates.len());
        for update in updates {
            offset = update.id.as_offset();

            let chat_id = match &update.kind {
                UpdateKind::Message(msg) => msg.chat.id.0,
                UpdateKind::CallbackQuery(query) => match &query.message {
                    Some(message) => message.chat().id.0,
                    None => continue,
                },
                other => {
                    debug!("Ignoring update: {:?}", other);
                    continue;
                }
            };

            let ctx = Arc::clone(&ctx);
            let gates = Arc::clone(&gates);
            tokio::spawn(async move {
                let _turn = gates.lock(chat_id).await;
                let result = match update.kind {
                    UpdateKind::Message(msg) => handlers::handle_message(&ctx, msg).await,
                    UpdateKind::CallbackQuery(query) => {
                        handlers::handle_callback_query(&ctx, query).await
                    }
                    _ => Ok(()),
                };
                if let Err(e) = result {
                    error!("Error handling update for chat {}: {:#}", chat_id, e);
                }
            });
        }
    }
}
