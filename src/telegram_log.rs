//! Mirrors warnings and errors from the relay into the administrator's chat.

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram caps message text at 4096 characters.
const MAX_LOG_CHARS: usize = 4000;

pub struct AdminLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl AdminLogLayer {
    /// Must be called inside a tokio runtime: spawns the sender task.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                // Not logged through tracing, or a failing send would feed itself.
                if let Err(e) = bot.send_message(chat_id, truncate(&text)).await {
                    eprintln!("Failed to mirror log to admin: {e}");
                }
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_LOG_CHARS {
        let truncated: String = text.chars().take(MAX_LOG_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

/// Only this crate's events are mirrored; teloxide's own warnings would loop on send failures.
fn is_mirrored(level: Level, target: &str) -> bool {
    level <= Level::WARN && target.starts_with(env!("CARGO_CRATE_NAME"))
}

impl<S: Subscriber> Layer<S> for AdminLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if !is_mirrored(level, metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let prefix = if level == Level::ERROR { "❌" } else { "⚠️" };
        if self.tx.send(format!("{prefix} {}", visitor.message)).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_own_warnings_and_errors_are_mirrored() {
        assert!(is_mirrored(Level::WARN, "voice_relay::relay::intake"));
        assert!(is_mirrored(Level::ERROR, "voice_relay"));
        assert!(!is_mirrored(Level::INFO, "voice_relay::relay::intake"));
        assert!(!is_mirrored(Level::WARN, "teloxide::dispatching"));
    }

    #[test]
    fn test_truncate_long_text() {
        let long = "é".repeat(MAX_LOG_CHARS + 10);
        let out = truncate(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), MAX_LOG_CHARS + 3);
        assert_eq!(truncate("short"), "short");
    }
}
