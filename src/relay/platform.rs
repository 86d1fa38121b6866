//! The chat platform as seen by the relay handlers.

use async_trait::async_trait;
use teloxide::types::{ChatId, FileId, Message, MessageId, UserId};

use crate::error::RelayError;

/// Who sent an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub id: UserId,
    pub first_name: String,
    pub username: Option<String>,
}

impl Sender {
    /// Caption attached to clips relayed to the administrator.
    pub fn caption(&self) -> String {
        match &self.username {
            Some(username) => format!("From: {} (@{})", self.first_name, username),
            None => format!("From: {}", self.first_name),
        }
    }
}

/// A voice clip as delivered by Telegram. `file_id` can be re-sent without re-uploading.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceAttachment {
    pub file_id: FileId,
    pub duration_secs: u32,
}

/// Inbound message reduced to what the handlers need.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Sender,
}

impl Inbound {
    /// `None` for messages without a user author (channel posts, service messages).
    pub fn from_message(msg: &Message) -> Option<Self> {
        let user = msg.from.as_ref()?;
        Some(Self {
            chat_id: msg.chat.id,
            message_id: msg.id,
            sender: Sender {
                id: user.id,
                first_name: user.first_name.clone(),
                username: user.username.clone(),
            },
        })
    }
}

impl VoiceAttachment {
    pub fn from_message(msg: &Message) -> Option<Self> {
        msg.voice().map(|voice| Self {
            file_id: voice.file.id.clone(),
            duration_secs: voice.duration.seconds(),
        })
    }
}

/// Aggregate count of one reaction symbol on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEntry {
    pub emoji: String,
    pub count: u32,
}

/// A message as last known to the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSnapshot {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub voice: Option<FileId>,
    pub reactions: Vec<ReactionEntry>,
}

impl MessageSnapshot {
    /// Sum of all entries for `emoji`.
    pub fn count_of(&self, emoji: &str) -> u32 {
        self.reactions
            .iter()
            .filter(|r| r.emoji == emoji)
            .map(|r| r.count)
            .sum()
    }
}

/// Outbound operations the handlers rely on.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Reply to `message_id` in `chat_id`.
    async fn reply(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<(), RelayError>;

    /// Forward a message, keeping its original attribution.
    async fn forward_message(
        &self,
        to: ChatId,
        from_chat: ChatId,
        message_id: MessageId,
    ) -> Result<(), RelayError>;

    /// Send an already uploaded voice clip by reference. Returns the new message id.
    async fn send_voice(&self, to: ChatId, file_id: &FileId, caption: &str) -> Result<MessageId, RelayError>;

    async fn download_file(&self, file_id: &FileId) -> Result<Vec<u8>, RelayError>;

    async fn fetch_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<MessageSnapshot, RelayError>;
}
