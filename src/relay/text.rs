//! Text relay: forward user texts to the administrator.

use tracing::info;

use crate::error::log_failure;
use crate::relay::Relay;
use crate::relay::platform::Inbound;
use crate::relay::replies;

impl Relay {
    /// Forward a text to the administrator and acknowledge it, whatever the forward's outcome.
    pub async fn handle_text(&self, inbound: &Inbound, text: &str) {
        let sender = &inbound.sender;
        let preview: String = text.chars().take(100).collect();
        info!("💬 Text from {} ({}): \"{}\"", sender.first_name, sender.id, preview);

        if !self.config.is_admin(sender.id) {
            info!("Forwarding message {} to admin", inbound.message_id.0);
            if let Err(e) = self
                .platform
                .forward_message(self.config.admin_chat(), inbound.chat_id, inbound.message_id)
                .await
            {
                log_failure(
                    &e,
                    &format!("Failed to forward message {} from chat {}", inbound.message_id.0, inbound.chat_id.0),
                );
            }
        }

        if let Err(e) = self.platform.reply(inbound.chat_id, inbound.message_id, replies::TEXT_RECEIVED).await {
            log_failure(&e, &format!("Failed to acknowledge {}", sender.id));
        }
    }
}
