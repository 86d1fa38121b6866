//! Telegram client using teloxide.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, MessageId, ReplyParameters};
use tracing::{debug, info};

use crate::error::RelayError;
use crate::relay::ledger::Ledger;
use crate::relay::platform::{MessageSnapshot, Platform};

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
    /// Answers message lookups, which the Bot API does not offer.
    ledger: Arc<Ledger>,
}

impl TelegramClient {
    pub fn new(bot: Bot, ledger: Arc<Ledger>) -> Self {
        Self { bot, ledger }
    }
}

#[async_trait]
impl Platform for TelegramClient {
    async fn reply(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<(), RelayError> {
        self.bot
            .send_message(chat_id, text)
            .reply_parameters(ReplyParameters::new(message_id))
            .await?;
        Ok(())
    }

    async fn forward_message(&self, to: ChatId, from_chat: ChatId, message_id: MessageId) -> Result<(), RelayError> {
        info!("↪️ Forwarding message {} from chat {} to {}", message_id.0, from_chat.0, to.0);
        self.bot.forward_message(to, from_chat, message_id).await?;
        Ok(())
    }

    async fn send_voice(&self, to: ChatId, file_id: &FileId, caption: &str) -> Result<MessageId, RelayError> {
        info!("🔊 Sending voice to chat {}", to.0);
        let msg = self
            .bot
            .send_voice(to, InputFile::file_id(file_id.clone()))
            .caption(caption)
            .await?;
        Ok(msg.id)
    }

    async fn download_file(&self, file_id: &FileId) -> Result<Vec<u8>, RelayError> {
        let file = self.bot.get_file(file_id.clone()).await?;

        let mut data = Vec::new();
        self.bot.download_file(&file.path, &mut data).await?;

        info!("📥 Downloaded voice ({} bytes)", data.len());
        Ok(data)
    }

    async fn fetch_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<MessageSnapshot, RelayError> {
        let snapshot = self.ledger.snapshot(chat_id, message_id)?;
        debug!(
            "Message {} in chat {}: voice={}, {} reaction kind(s)",
            message_id.0,
            chat_id.0,
            snapshot.voice.is_some(),
            snapshot.reactions.len()
        );
        Ok(snapshot)
    }
}
