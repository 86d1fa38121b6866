//! Recording fake of the chat platform for handler tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use teloxide::types::{ChatId, FileId, MessageId, UserId};

use crate::config::Config;
use crate::error::RelayError;
use crate::relay::platform::{Inbound, MessageSnapshot, Platform, ReactionEntry, Sender};
use crate::relay::{Ledger, Relay, VoiceStore};

pub const ADMIN: UserId = UserId(1000);
pub const ADMIN_CHAT: ChatId = ChatId(1000);

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Reply { chat_id: ChatId, message_id: MessageId, text: String },
    Forward { to: ChatId, from_chat: ChatId, message_id: MessageId },
    SendVoice { to: ChatId, file_id: FileId, caption: String },
    Download { file_id: FileId },
    Fetch { chat_id: ChatId, message_id: MessageId },
}

#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    snapshots: Mutex<HashMap<(ChatId, MessageId), MessageSnapshot>>,
    next_message_id: AtomicI32,
    /// Answers lookups not pinned with `set_message`, the way `TelegramClient` does.
    ledger: Option<Arc<Ledger>>,
    pub fail_forward: AtomicBool,
    pub fail_send_voice: AtomicBool,
    pub fail_download: AtomicBool,
    pub fail_fetch: AtomicBool,
}

impl FakePlatform {
    pub fn backed_by(ledger: Arc<Ledger>) -> Self {
        Self { ledger: Some(ledger), ..Self::default() }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn forwards(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| matches!(c, Call::Forward { .. })).collect()
    }

    pub fn sent_voices(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| matches!(c, Call::SendVoice { .. })).collect()
    }

    pub fn replies(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Reply { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Pin what `fetch_message` reports: a message with `likes` thumbs-up.
    pub fn set_message(&self, chat_id: ChatId, message_id: MessageId, voice: bool, likes: u32) {
        let snapshot = MessageSnapshot {
            chat_id,
            message_id,
            voice: voice.then(|| FileId("voice-file".into())),
            reactions: vec![ReactionEntry { emoji: "👍".into(), count: likes }],
        };
        self.snapshots.lock().unwrap().insert((chat_id, message_id), snapshot);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn injected(what: &str) -> RelayError {
    RelayError::Storage(std::io::Error::other(format!("injected {what} failure")))
}

#[async_trait]
impl Platform for FakePlatform {
    async fn reply(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<(), RelayError> {
        self.record(Call::Reply { chat_id, message_id, text: text.to_string() });
        Ok(())
    }

    async fn forward_message(&self, to: ChatId, from_chat: ChatId, message_id: MessageId) -> Result<(), RelayError> {
        self.record(Call::Forward { to, from_chat, message_id });
        if self.fail_forward.load(Ordering::SeqCst) {
            return Err(injected("forward"));
        }
        Ok(())
    }

    async fn send_voice(&self, to: ChatId, file_id: &FileId, caption: &str) -> Result<MessageId, RelayError> {
        self.record(Call::SendVoice { to, file_id: file_id.clone(), caption: caption.to_string() });
        if self.fail_send_voice.load(Ordering::SeqCst) {
            return Err(injected("send_voice"));
        }
        Ok(MessageId(5000 + self.next_message_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn download_file(&self, file_id: &FileId) -> Result<Vec<u8>, RelayError> {
        self.record(Call::Download { file_id: file_id.clone() });
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(injected("download"));
        }
        Ok(b"OggS-fake-payload".to_vec())
    }

    async fn fetch_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<MessageSnapshot, RelayError> {
        self.record(Call::Fetch { chat_id, message_id });
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(injected("fetch"));
        }
        let pinned = self.snapshots.lock().unwrap().get(&(chat_id, message_id)).cloned();
        match (pinned, &self.ledger) {
            (Some(snapshot), _) => Ok(snapshot),
            (None, Some(ledger)) => Ok(ledger.snapshot(chat_id, message_id)?),
            (None, None) => Ok(MessageSnapshot { chat_id, message_id, voice: None, reactions: vec![] }),
        }
    }
}

pub fn test_config(audio_dir: &Path) -> Config {
    Config {
        telegram_bot_token: "123456789:ABCdef".to_string(),
        admin_id: ADMIN,
        data_dir: audio_dir.to_path_buf(),
        audio_dir: audio_dir.to_path_buf(),
        max_voice_secs: 10,
        like_threshold: 30,
        like_emoji: "👍".to_string(),
        mirror_logs_to_admin: false,
    }
}

pub struct Harness {
    pub relay: Relay,
    pub platform: Arc<FakePlatform>,
    pub ledger: Arc<Ledger>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        let platform = Arc::new(FakePlatform::backed_by(ledger.clone()));
        let store = VoiceStore::open(dir.path()).await.unwrap();
        let relay = Relay::new(
            Arc::new(test_config(dir.path())),
            platform.clone(),
            ledger.clone(),
            store,
        );
        Self { relay, platform, ledger, dir }
    }

    /// Files written to the audio directory.
    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.dir.path()).unwrap().count()
    }
}

pub fn inbound_from(user: UserId) -> Inbound {
    Inbound {
        chat_id: ChatId(user.0 as i64),
        message_id: MessageId(42),
        sender: Sender { id: user, first_name: "Alice".into(), username: Some("alice".into()) },
    }
}
