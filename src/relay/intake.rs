//! Voice clip intake: validate, store, relay to the administrator.

use std::path::PathBuf;

use chrono::Local;
use tracing::info;

use crate::error::{RelayError, log_failure};
use crate::relay::Relay;
use crate::relay::platform::{Inbound, VoiceAttachment};
use crate::relay::replies;

impl Relay {
    /// Handle an inbound voice clip. The sender gets one reply unless the failure policy says otherwise.
    pub async fn handle_voice(&self, inbound: &Inbound, voice: &VoiceAttachment) {
        let sender = &inbound.sender;
        info!("🎙️ Voice from {} ({}), {}s", sender.first_name, sender.id, voice.duration_secs);

        let reply = match self.accept_voice(inbound, voice).await {
            Ok(path) => {
                info!("Voice from {} saved as {:?}", sender.id, path);
                replies::VOICE_ACCEPTED.to_string()
            }
            Err(e) => {
                log_failure(
                    &e,
                    &format!("Voice {} from {} in chat {}", voice.file_id.0, sender.id, inbound.chat_id.0),
                );
                if !e.kind().policy().notify_sender {
                    return;
                }
                e.user_message()
            }
        };

        if let Err(e) = self.platform.reply(inbound.chat_id, inbound.message_id, &reply).await {
            log_failure(&e, &format!("Failed to reply to {}", sender.id));
        }
    }

    async fn accept_voice(&self, inbound: &Inbound, voice: &VoiceAttachment) -> Result<PathBuf, RelayError> {
        let limit = self.config.max_voice_secs;
        if voice.duration_secs > limit {
            return Err(RelayError::VoiceTooLong { duration: voice.duration_secs, limit });
        }

        let data = self.platform.download_file(&voice.file_id).await?;
        let path = self.store.save(&data, Local::now()).await?;
        self.ledger
            .record_voice(inbound.chat_id, inbound.message_id, &voice.file_id, inbound.sender.id)?;

        if !self.config.is_admin(inbound.sender.id) {
            let admin_chat = self.config.admin_chat();
            info!("📤 Relaying voice from {} to admin", inbound.sender.id);
            // Re-send by file_id: no re-upload of the downloaded copy.
            let relayed = self
                .platform
                .send_voice(admin_chat, &voice.file_id, &inbound.sender.caption())
                .await?;
            // The admin already has the clip; only likes on this copy are lost.
            if let Err(e) = self
                .ledger
                .record_voice(admin_chat, relayed, &voice.file_id, inbound.sender.id)
            {
                log_failure(
                    &RelayError::from(e),
                    &format!("Failed to record relayed copy {} of {}", relayed.0, voice.file_id.0),
                );
            }
        }

        Ok(path)
    }
}
