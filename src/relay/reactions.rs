//! Reaction threshold notifier.
//!
//! Each reaction update on a known voice message is written to the ledger, then the like count of the
//! affected message is recomputed from scratch. Once it reaches the threshold the
//! message is forwarded to the administrator. The ledger's notification claim is
//! taken before forwarding, so repeated or concurrent updates forward at most once,
//! and a count that jumps past the threshold still fires.

use teloxide::types::{
    ChatId, MaybeAnonymousUser, MessageId, MessageReactionCountUpdated, MessageReactionUpdated, ReactionType,
};
use tracing::{debug, info, warn};

use crate::error::{RelayError, log_failure};
use crate::relay::Relay;
use crate::relay::platform::ReactionEntry;

/// What a reaction update led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// The like symbol was not newly added.
    Ignored,
    /// The message carries no voice clip.
    NotVoice,
    BelowThreshold(u32),
    AlreadyNotified(u32),
    Notified(u32),
    /// Failed; logged and dropped.
    Dropped,
}

/// One reactor changed their reactions on a message.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionChange {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// User id, or the id of the chat reacting on behalf of an anonymous admin.
    pub reactor_id: i64,
    pub old: Vec<String>,
    pub new: Vec<String>,
}

impl ReactionChange {
    /// Symbols present in `new` but not in `old`.
    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.new
            .iter()
            .filter(|emoji| !self.old.contains(emoji))
            .map(String::as_str)
    }
}

/// Totals changed on a message with anonymous reactions.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionCountChange {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub counts: Vec<ReactionEntry>,
}

impl ReactionCountChange {
    pub fn count_of(&self, emoji: &str) -> u32 {
        self.counts.iter().filter(|c| c.emoji == emoji).map(|c| c.count).sum()
    }
}

/// Ledger key of a reaction type. Custom emoji are keyed by id; paid reactions carry no symbol.
fn symbol(reaction: &ReactionType) -> Option<String> {
    match reaction {
        ReactionType::Emoji { emoji } => Some(emoji.clone()),
        ReactionType::CustomEmoji { custom_emoji_id } => Some(format!("custom:{}", custom_emoji_id.0)),
        _ => None,
    }
}

fn symbols(reactions: &[ReactionType]) -> Vec<String> {
    reactions.iter().filter_map(symbol).collect()
}

impl ReactionChange {
    pub fn from_update(update: &MessageReactionUpdated) -> Self {
        // Anonymous admins react as the chat they speak for.
        let reactor_id = match &update.actor {
            MaybeAnonymousUser::User(user) => user.id.0 as i64,
            MaybeAnonymousUser::Chat(chat) => chat.id.0,
        };
        Self {
            chat_id: update.chat.id,
            message_id: update.message_id,
            reactor_id,
            old: symbols(&update.old_reaction),
            new: symbols(&update.new_reaction),
        }
    }
}

impl ReactionCountChange {
    pub fn from_update(update: &MessageReactionCountUpdated) -> Self {
        let counts = update
            .reactions
            .iter()
            .filter_map(|r| {
                symbol(&r.r#type).map(|emoji| ReactionEntry {
                    emoji,
                    count: u32::try_from(r.total_count).unwrap_or(u32::MAX),
                })
            })
            .collect();
        Self { chat_id: update.chat.id, message_id: update.message_id, counts }
    }
}

impl Relay {
    /// Handle a per-reactor update. Never fails; errors are logged and the event dropped.
    pub async fn handle_reaction(&self, change: &ReactionChange) -> ReactionOutcome {
        match self.process_reaction(change).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log_failure(
                    &e,
                    &format!("Reaction on message {} in chat {}", change.message_id.0, change.chat_id.0),
                );
                ReactionOutcome::Dropped
            }
        }
    }

    /// Handle an anonymous totals update. Never fails; errors are logged and the event dropped.
    pub async fn handle_reaction_count(&self, change: &ReactionCountChange) -> ReactionOutcome {
        match self.process_reaction_count(change).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log_failure(
                    &e,
                    &format!("Reaction count on message {} in chat {}", change.message_id.0, change.chat_id.0),
                );
                ReactionOutcome::Dropped
            }
        }
    }

    async fn process_reaction(&self, change: &ReactionChange) -> Result<ReactionOutcome, RelayError> {
        self.ledger
            .set_user_reactions(change.chat_id, change.message_id, change.reactor_id, &change.new)?;

        let like = self.config.like_emoji.as_str();
        if !change.added().any(|emoji| emoji == like) {
            return Ok(ReactionOutcome::Ignored);
        }
        self.check_threshold(change.chat_id, change.message_id).await
    }

    async fn process_reaction_count(&self, change: &ReactionCountChange) -> Result<ReactionOutcome, RelayError> {
        let like = self.config.like_emoji.as_str();
        let previous = self.ledger.anonymous_count(change.chat_id, change.message_id, like)?;
        self.ledger
            .set_anonymous_counts(change.chat_id, change.message_id, &change.counts)?;

        if change.count_of(like) <= previous {
            return Ok(ReactionOutcome::Ignored);
        }
        self.check_threshold(change.chat_id, change.message_id).await
    }

    async fn check_threshold(&self, chat_id: ChatId, message_id: MessageId) -> Result<ReactionOutcome, RelayError> {
        let message = self.platform.fetch_message(chat_id, message_id).await?;
        if message.voice.is_none() {
            debug!("Message {} in chat {} has no voice, ignoring like", message_id.0, chat_id.0);
            return Ok(ReactionOutcome::NotVoice);
        }

        let likes = message.count_of(&self.config.like_emoji);
        info!("👍 Voice message {} in chat {} has {} like(s)", message_id.0, chat_id.0, likes);

        if likes < self.config.like_threshold {
            return Ok(ReactionOutcome::BelowThreshold(likes));
        }
        if !self.ledger.claim_notification(chat_id, message_id)? {
            debug!("Message {} in chat {} already sent to admin", message_id.0, chat_id.0);
            return Ok(ReactionOutcome::AlreadyNotified(likes));
        }

        info!("🏆 {} likes reached, forwarding message {} to admin", likes, message_id.0);
        if let Err(e) = self
            .platform
            .forward_message(self.config.admin_chat(), chat_id, message_id)
            .await
        {
            // Give the next like a chance to retry.
            if let Err(release) = self.ledger.release_notification(chat_id, message_id) {
                warn!("Failed to release notification claim for message {}: {}", message_id.0, release);
            }
            return Err(e);
        }

        Ok(ReactionOutcome::Notified(likes))
    }
}
