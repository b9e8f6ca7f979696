use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use teloxide::{
    payloads::SendMessageSetters,
    prelude::*,
    types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup},
};
use tracing::{error, info, warn};

use super::command::{CallbackAction, Command};
use super::messenger::message_to;
use crate::config::ListingConfig;
use crate::delivery::{ArtifactOrigin, ChatRef, Deliverer, DeliveryOutcome};
use crate::meeting::MeetingDescriptor;
use crate::project::ProjectRegistry;
use crate::session::{DeliveryMode, SelectionError, SessionStore};
use crate::zoom::{EmptyListingPolicy, ZoomClient, ZoomError};

/// Telegram rejects longer messages.
const MAX_MESSAGE_LEN: usize = 4096;
const NUMBERS_PER_ROW: usize = 4;

pub const START_TEXT: &str = "Hi! I'm your Zoom recordings assistant 👋\n\n\
I fetch meeting recordings from Zoom and post them where you need them, \
reusing copies that were already posted so you don't wait for downloads twice 😎\n\n\
Send /recs to see the available recordings.";

pub const HELP_TEXT: &str = "/start - Welcome message and a short description\n\n\
/recs - Choose a project, then a recording. Recordings that were already posted are \
sent right away; others are downloaded from Zoom first, which can take a while\n\n\
/help - This message";

const CHOOSE_PROJECT_TEXT: &str = "Whose recordings do you want?";
const NO_PROJECTS_TEXT: &str = "No projects are configured.";
const UNKNOWN_PROJECT_TEXT: &str = "Unknown project. Use /recs to pick one again.";
const LISTING_FAILED_TEXT: &str = "Couldn't fetch recordings right now, please try again later.";
const SIGN_IN_FAILED_TEXT: &str = "Couldn't sign in to this project's Zoom account. \
Please ask an administrator to check its credentials.";
const NO_RECORDINGS_TEXT: &str = "No finished recordings found for this project yet.";
const CHOOSE_MODE_TEXT: &str = "Where should the recording go?";
const CHOOSE_RECORDING_TEXT: &str = "Which recording do you want?";
const INVALID_SELECTION_TEXT: &str = "Invalid selection. Use /recs to list recordings again.";
const STALE_SELECTION_TEXT: &str =
    "That list is out of date. Use /recs to list recordings again.";

/// Everything update handlers need.
pub struct BotContext {
    pub bot: Bot,
    pub bot_username: Option<String>,
    pub projects: ProjectRegistry,
    pub zoom: Arc<ZoomClient>,
    pub deliverer: Arc<Deliverer>,
    pub sessions: SessionStore,
    pub listing: ListingConfig,
    pub tz: Tz,
}

pub async fn handle_message(ctx: &BotContext, msg: Message) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(command) = Command::parse(text, ctx.bot_username.as_deref()) else {
        return Ok(());
    };

    let chat = ChatRef {
        chat_id: msg.chat.id.0,
        thread_id: msg.thread_id.map(|t| t.0 .0),
    };
    info!("Command {:?} from chat {}", command, chat.chat_id);

    match command {
        Command::Start => send_text(ctx, &chat, START_TEXT).await,
        Command::Help => send_text(ctx, &chat, HELP_TEXT).await,
        Command::Recs => {
            if ctx.projects.is_empty() {
                send_text(ctx, &chat, NO_PROJECTS_TEXT).await;
            } else {
                send_keyboard(ctx, &chat, CHOOSE_PROJECT_TEXT, project_keyboard(&ctx.projects))
                    .await;
            }
        }
    }
    Ok(())
}

pub async fn handle_callback_query(ctx: &BotContext, query: CallbackQuery) -> Result<()> {
    // Dismiss the spinner first; delivery can take minutes.
    if let Err(e) = ctx.bot.answer_callback_query(&query.id).await {
        warn!("Failed to answer callback query: {}", e);
    }

    let Some(message) = query.message.as_ref() else {
        return Ok(());
    };
    let chat = ChatRef {
        chat_id: message.chat().id.0,
        thread_id: message
            .regular_message()
            .and_then(|m| m.thread_id)
            .map(|t| t.0 .0),
    };

    let Some(action) = query.data.as_deref().and_then(CallbackAction::parse) else {
        warn!("Ignoring unknown callback data {:?}", query.data);
        return Ok(());
    };

    match action {
        CallbackAction::Project(slug) => list_recordings(ctx, &chat, &slug).await,
        CallbackAction::Mode { generation, mode } => {
            choose_mode(ctx, &chat, generation, mode).await
        }
        CallbackAction::Select { generation, index } => {
            deliver_selection(ctx, &chat, generation, index).await
        }
    }
    Ok(())
}

async fn list_recordings(ctx: &BotContext, chat: &ChatRef, slug: &str) {
    let Some(project) = ctx.projects.get(slug) else {
        send_text(ctx, chat, UNKNOWN_PROJECT_TEXT).await;
        return;
    };

    let (from, to) = ctx.listing.date_range(Utc::now().date_naive());
    let meetings = match ctx
        .zoom
        .fetch_recordings(project, from, to, EmptyListingPolicy::from(&ctx.listing))
        .await
    {
        Ok(meetings) => meetings,
        Err(e) => {
            error!("Listing recordings for {} failed: {}", project.name, e);
            send_text(ctx, chat, listing_error_text(&e)).await;
            return;
        }
    };

    if meetings.is_empty() {
        send_text(ctx, chat, NO_RECORDINGS_TEXT).await;
        return;
    }

    let chunks = format_listing(&meetings, ctx.tz);
    let state = ctx
        .sessions
        .begin_browsing(chat.chat_id, project, meetings);

    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.iter().enumerate() {
        if i == last {
            send_keyboard(ctx, chat, chunk, mode_keyboard(state.generation)).await;
        } else {
            send_text(ctx, chat, chunk).await;
        }
    }
}

async fn choose_mode(ctx: &BotContext, chat: &ChatRef, generation: u64, mode: DeliveryMode) {
    match ctx.sessions.set_delivery_mode(chat.chat_id, generation, mode) {
        Ok(state) => {
            send_keyboard(
                ctx,
                chat,
                CHOOSE_RECORDING_TEXT,
                number_keyboard(state.generation, state.meetings.len()),
            )
            .await
        }
        Err(e) => send_text(ctx, chat, selection_error_text(&e)).await,
    }
}

async fn deliver_selection(ctx: &BotContext, chat: &ChatRef, generation: u64, index: usize) {
    let selection = match ctx.sessions.select(chat.chat_id, generation, index) {
        Ok(selection) => selection,
        Err(e) => {
            warn!("Rejected selection from chat {}: {}", chat.chat_id, e);
            send_text(ctx, chat, selection_error_text(&e)).await;
            return;
        }
    };

    let Some(project) = ctx.projects.get(&selection.project) else {
        send_text(ctx, chat, UNKNOWN_PROJECT_TEXT).await;
        return;
    };

    let destination = match selection.delivery_mode {
        DeliveryMode::Direct => *chat,
        DeliveryMode::Channel => project.channel,
    };

    info!(
        "Delivering recording {} of {} to chat {}",
        selection.meeting.recording_id, project.name, destination.chat_id
    );
    match ctx
        .deliverer
        .deliver(chat, project, &selection.meeting, &destination)
        .await
    {
        Ok(outcome) => send_text(ctx, chat, &outcome_text(&outcome)).await,
        Err(e) => {
            error!(
                "Delivery of recording {} failed: {}",
                selection.meeting.recording_id, e
            );
            send_text(ctx, chat, e.user_message()).await;
        }
    }
}

/// Retrying cannot fix rejected credentials, so those get their own text.
fn listing_error_text(err: &ZoomError) -> &'static str {
    match err {
        ZoomError::Auth { .. } => SIGN_IN_FAILED_TEXT,
        _ => LISTING_FAILED_TEXT,
    }
}

fn selection_error_text(err: &SelectionError) -> &'static str {
    match err {
        SelectionError::Stale => STALE_SELECTION_TEXT,
        SelectionError::NoSession | SelectionError::OutOfRange { .. } => INVALID_SELECTION_TEXT,
    }
}

pub fn outcome_text(outcome: &DeliveryOutcome) -> String {
    match outcome {
        DeliveryOutcome::Forwarded { forwarded, .. } => {
            format!("Recordings sent! ({} file(s))", forwarded)
        }
        DeliveryOutcome::AlreadyPosted { .. } => {
            "This recording is already in the project channel.".to_string()
        }
        DeliveryOutcome::Uploaded {
            origin: ArtifactOrigin::Local,
            file_name,
            ..
        } => format!("Recording {} was already downloaded, sent it again.", file_name),
        DeliveryOutcome::Uploaded { file_name, .. } => {
            format!("Recording {} downloaded and sent.", file_name)
        }
    }
}

/// Numbered listing of `meetings`, split into messages Telegram accepts.
pub fn format_listing(meetings: &[MeetingDescriptor], tz: Tz) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::from("Available recordings:\n\n");
    for (i, meeting) in meetings.iter().enumerate() {
        let line = format!("{}. {}\n", i + 1, meeting.display_key(tz));
        if current.chars().count() + line.chars().count() > MAX_MESSAGE_LEN {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub fn project_keyboard(projects: &ProjectRegistry) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = projects
        .iter()
        .map(|p| {
            vec![InlineKeyboardButton::callback(
                p.name.clone(),
                CallbackAction::Project(p.slug.clone()).encode(),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

pub fn mode_keyboard(generation: u64) -> InlineKeyboardMarkup {
    let button = |label: &str, mode| {
        InlineKeyboardButton::callback(
            label.to_string(),
            CallbackAction::Mode { generation, mode }.encode(),
        )
    };
    InlineKeyboardMarkup::new(vec![vec![
        button("Send to me", DeliveryMode::Direct),
        button("Post to channel", DeliveryMode::Channel),
    ]])
}

pub fn number_keyboard(generation: u64, count: usize) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = (0..count)
        .map(|index| {
            InlineKeyboardButton::callback(
                (index + 1).to_string(),
                CallbackAction::Select { generation, index }.encode(),
            )
        })
        .collect();
    let rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .chunks(NUMBERS_PER_ROW)
        .map(|row| row.to_vec())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

async fn send_text(ctx: &BotContext, chat: &ChatRef, text: &str) {
    if let Err(e) = message_to(&ctx.bot, chat, text).await {
        warn!("Failed to send message to chat {}: {}", chat.chat_id, e);
    }
}

async fn send_keyboard(
    ctx: &BotContext,
    chat: &ChatRef,
    text: &str,
    keyboard: InlineKeyboardMarkup,
) {
    let req = message_to(&ctx.bot, chat, text).reply_markup(keyboard);
    if let Err(e) = req.await {
        warn!("Failed to send keyboard to chat {}: {}", chat.chat_id, e);
    }
}
