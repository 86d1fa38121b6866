//! Relay module - passes user voice clips and texts on to the administrator.

pub mod intake;
pub mod ledger;
pub mod platform;
pub mod reactions;
pub mod replies;
pub mod storage;
pub mod telegram;
pub mod text;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::log_failure;

pub use ledger::Ledger;
pub use platform::{Inbound, Platform, VoiceAttachment};
pub use reactions::{ReactionChange, ReactionCountChange};
pub use storage::VoiceStore;
pub use telegram::TelegramClient;

/// Shared handler state. Every handler is its own error boundary.
pub struct Relay {
    config: Arc<Config>,
    platform: Arc<dyn Platform>,
    ledger: Arc<Ledger>,
    store: VoiceStore,
}

impl Relay {
    pub fn new(config: Arc<Config>, platform: Arc<dyn Platform>, ledger: Arc<Ledger>, store: VoiceStore) -> Self {
        Self { config, platform, ledger, store }
    }

    /// `/start`: explain what the bot does.
    pub async fn handle_start(&self, inbound: &Inbound) {
        info!("👋 /start from {} ({})", inbound.sender.first_name, inbound.sender.id);
        let greeting = replies::greeting(self.config.max_voice_secs);
        if let Err(e) = self.platform.reply(inbound.chat_id, inbound.message_id, &greeting).await {
            log_failure(&e, "Failed to send greeting");
        }
    }
}
