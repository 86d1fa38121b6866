//! Persistent SQLite ledger of voice messages, reactions and sent notifications.
//!
//! The Bot API offers no way to look a message up, so the relay keeps its own
//! record of which messages carry voice clips and who reacted to them. The
//! `notifications` table is the at-most-once guard for threshold forwards.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use teloxide::types::{ChatId, FileId, MessageId, UserId};
use tracing::{debug, info};

use crate::relay::platform::{MessageSnapshot, ReactionEntry};

pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let ledger = Self::init(Connection::open(path)?)?;
        let (voices, notified) = ledger.counts()?;
        info!("Loaded ledger from {:?} ({} voice messages, {} notified)", path, voices, notified);
        Ok(ledger)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS voice_messages (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                file_id TEXT NOT NULL,
                sender_id INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            );

            CREATE TABLE IF NOT EXISTS user_reactions (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                reactor_id INTEGER NOT NULL,
                emoji TEXT NOT NULL,
                PRIMARY KEY (chat_id, message_id, reactor_id, emoji)
            );

            CREATE TABLE IF NOT EXISTS anonymous_reactions (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                emoji TEXT NOT NULL,
                total_count INTEGER NOT NULL,
                PRIMARY KEY (chat_id, message_id, emoji)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                notified_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            );
        "#)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite consistent, so a poisoned lock is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn counts(&self) -> rusqlite::Result<(i64, i64)> {
        let conn = self.conn();
        let voices = conn.query_row("SELECT COUNT(*) FROM voice_messages", [], |row| row.get(0))?;
        let notified = conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))?;
        Ok((voices, notified))
    }

    // ==================== VOICE MESSAGES ====================

    pub fn record_voice(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        file_id: &FileId,
        sender: UserId,
    ) -> rusqlite::Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO voice_messages (chat_id, message_id, file_id, sender_id, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![chat_id.0, message_id.0, file_id.0, sender.0 as i64, now()],
        )?;
        debug!("Recorded voice message {} in chat {}", message_id.0, chat_id.0);
        Ok(())
    }

    // ==================== REACTIONS ====================

    /// Replace the reactions one reactor has on a message with `emojis`.
    ///
    /// Telegram reports the full new set per reactor, so removals are handled by
    /// dropping whatever is not in it. Only known voice messages are tracked.
    pub fn set_user_reactions(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        reactor_id: i64,
        emojis: &[String],
    ) -> rusqlite::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM user_reactions WHERE chat_id = ?1 AND message_id = ?2 AND reactor_id = ?3",
            params![chat_id.0, message_id.0, reactor_id],
        )?;
        for emoji in emojis {
            tx.execute(
                "INSERT OR IGNORE INTO user_reactions (chat_id, message_id, reactor_id, emoji)
                 SELECT ?1, ?2, ?3, ?4 WHERE EXISTS
                     (SELECT 1 FROM voice_messages WHERE chat_id = ?1 AND message_id = ?2)",
                params![chat_id.0, message_id.0, reactor_id, emoji],
            )?;
        }
        tx.commit()
    }

    /// Replace the anonymous totals for a message. Only known voice messages are tracked.
    pub fn set_anonymous_counts(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        counts: &[ReactionEntry],
    ) -> rusqlite::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM anonymous_reactions WHERE chat_id = ?1 AND message_id = ?2",
            params![chat_id.0, message_id.0],
        )?;
        for entry in counts {
            tx.execute(
                "INSERT OR REPLACE INTO anonymous_reactions (chat_id, message_id, emoji, total_count)
                 SELECT ?1, ?2, ?3, ?4 WHERE EXISTS
                     (SELECT 1 FROM voice_messages WHERE chat_id = ?1 AND message_id = ?2)",
                params![chat_id.0, message_id.0, entry.emoji, entry.count],
            )?;
        }
        tx.commit()
    }

    pub fn anonymous_count(&self, chat_id: ChatId, message_id: MessageId, emoji: &str) -> rusqlite::Result<u32> {
        let count = self
            .conn()
            .query_row(
                "SELECT total_count FROM anonymous_reactions
                 WHERE chat_id = ?1 AND message_id = ?2 AND emoji = ?3",
                params![chat_id.0, message_id.0, emoji],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Per-symbol totals, recomputed from the stored rows.
    ///
    /// Per-user and anonymous reports describe the same reactions from two angles,
    /// so the larger of the two wins instead of adding them up.
    pub fn reactions(&self, chat_id: ChatId, message_id: MessageId) -> rusqlite::Result<Vec<ReactionEntry>> {
        let conn = self.conn();
        let mut totals: BTreeMap<String, u32> = BTreeMap::new();

        let mut stmt = conn.prepare(
            "SELECT emoji, COUNT(*) FROM user_reactions
             WHERE chat_id = ?1 AND message_id = ?2 GROUP BY emoji",
        )?;
        let rows = stmt.query_map(params![chat_id.0, message_id.0], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        for row in rows {
            let (emoji, count) = row?;
            totals.insert(emoji, count);
        }

        let mut stmt = conn.prepare(
            "SELECT emoji, total_count FROM anonymous_reactions WHERE chat_id = ?1 AND message_id = ?2",
        )?;
        let rows = stmt.query_map(params![chat_id.0, message_id.0], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        for row in rows {
            let (emoji, count) = row?;
            let total = totals.entry(emoji).or_insert(0);
            *total = (*total).max(count);
        }

        Ok(totals
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(emoji, count)| ReactionEntry { emoji, count })
            .collect())
    }

    /// Everything known about a message. Unknown messages come back without a voice clip.
    pub fn snapshot(&self, chat_id: ChatId, message_id: MessageId) -> rusqlite::Result<MessageSnapshot> {
        let voice = self
            .conn()
            .query_row(
                "SELECT file_id FROM voice_messages WHERE chat_id = ?1 AND message_id = ?2",
                params![chat_id.0, message_id.0],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(FileId);
        let reactions = self.reactions(chat_id, message_id)?;
        Ok(MessageSnapshot { chat_id, message_id, voice, reactions })
    }

    // ==================== NOTIFICATIONS ====================

    /// Atomically mark a message as notified. Returns `false` if it already was.
    pub fn claim_notification(&self, chat_id: ChatId, message_id: MessageId) -> rusqlite::Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO notifications (chat_id, message_id, notified_at) VALUES (?1, ?2, ?3)",
            params![chat_id.0, message_id.0, now()],
        )?;
        Ok(inserted == 1)
    }

    /// Undo a claim whose forward never went out.
    pub fn release_notification(&self, chat_id: ChatId, message_id: MessageId) -> rusqlite::Result<()> {
        self.conn().execute(
            "DELETE FROM notifications WHERE chat_id = ?1 AND message_id = ?2",
            params![chat_id.0, message_id.0],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn reaction_rows(&self) -> rusqlite::Result<i64> {
        self.conn().query_row(
            "SELECT (SELECT COUNT(*) FROM user_reactions) + (SELECT COUNT(*) FROM anonymous_reactions)",
            [],
            |row| row.get(0),
        )
    }

    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn().execute_batch(sql)
    }

    #[cfg(test)]
    pub fn is_notified(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        self.conn()
            .query_row(
                "SELECT 1 FROM notifications WHERE chat_id = ?1 AND message_id = ?2",
                params![chat_id.0, message_id.0],
                |_| Ok(()),
            )
            .optional()
            .unwrap()
            .is_some()
    }
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
