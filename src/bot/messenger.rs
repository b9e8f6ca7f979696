use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use teloxide::{
    payloads::{CopyMessageSetters, SendDocumentSetters, SendMessageSetters},
    prelude::*,
    types::{ChatId, InputFile, MessageId, ThreadId},
};
use tracing::{debug, info};

use crate::delivery::{ChatRef, MessageRef, Messenger};

/// [`Messenger`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn thread(chat: &ChatRef) -> Option<ThreadId> {
    chat.thread_id.map(|id| ThreadId(MessageId(id)))
}

/// A `sendMessage` request aimed at `chat`, including its forum topic.
pub(super) fn message_to(
    bot: &Bot,
    chat: &ChatRef,
    text: &str,
) -> <Bot as Requester>::SendMessage {
    let req = bot.send_message(ChatId(chat.chat_id), text);
    match thread(chat) {
        Some(thread_id) => req.message_thread_id(thread_id),
        None => req,
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, to: &ChatRef, text: &str) -> Result<()> {
        message_to(&self.bot, to, text).await?;
        debug!("Sent text to chat {}", to.chat_id);
        Ok(())
    }

    async fn send_document(
        &self,
        to: &ChatRef,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageRef> {
        info!("Uploading {:?} to chat {}", path, to.chat_id);
        let mut req = self
            .bot
            .send_document(ChatId(to.chat_id), InputFile::file(path.to_path_buf()));
        if let Some(thread_id) = thread(to) {
            req = req.message_thread_id(thread_id);
        }
        if let Some(caption) = caption {
            req = req.caption(caption);
        }
        let message = req.await?;
        info!(
            "Uploaded {:?} to chat {} as message {}",
            path, to.chat_id, message.id.0
        );
        Ok(MessageRef(message.id.0))
    }

    async fn copy_message(
        &self,
        from: &ChatRef,
        message: MessageRef,
        to: &ChatRef,
    ) -> Result<MessageRef> {
        let mut req = self.bot.copy_message(
            ChatId(to.chat_id),
            ChatId(from.chat_id),
            MessageId(message.0),
        );
        if let Some(thread_id) = thread(to) {
            req = req.message_thread_id(thread_id);
        }
        let copied = req.await?;
        debug!(
            "Copied message {} from chat {} to chat {}",
            message, from.chat_id, to.chat_id
        );
        Ok(MessageRef(copied.0))
    }
}
