use serde::Deserialize;
use std::path::{Path, PathBuf};
use teloxide::types::{ChatId, UserId};
use thiserror::Error;

/// Config file read when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "voice-relay.json";

/// Errors that can occur when loading configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    #[error("failed to parse config file '{}': {source}", path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// A required setting was found in neither the file nor the environment.
    #[error("{0} is required (set it in the config file or the environment)")]
    Missing(&'static str),
    /// The administrator id is not an integer.
    #[error("ADMIN_ID must be a numeric Telegram user id, got '{0}'")]
    InvalidAdminId(String),
    /// Validation error.
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    telegram_bot_token: Option<String>,
    admin_id: Option<u64>,
    /// Directory for the reaction ledger and logs. Defaults to current directory.
    data_dir: Option<String>,
    /// Where accepted voice clips are written. Relative paths resolve against `data_dir`.
    audio_dir: Option<String>,
    max_voice_secs: Option<u32>,
    like_threshold: Option<u32>,
    like_emoji: Option<String>,
    #[serde(default)]
    mirror_logs_to_admin: bool,
}

impl ConfigFile {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })?;
        serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: path.to_path_buf(), source: e })
    }
}

/// Process-wide settings, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    /// The single account that receives relayed content.
    pub admin_id: UserId,
    pub data_dir: PathBuf,
    pub audio_dir: PathBuf,
    /// Longest accepted voice clip, in seconds.
    pub max_voice_secs: u32,
    /// Likes needed before a voice message is sent to the administrator.
    pub like_threshold: u32,
    pub like_emoji: String,
    /// Mirror WARN/ERROR log events into the administrator chat.
    pub mirror_logs_to_admin: bool,
}

impl Config {
    /// Load from an optional JSON file plus the process environment (`.env` included).
    ///
    /// An explicit `path` must exist. Without one, `voice-relay.json` is used if present.
    /// `BOT_TOKEN` and `ADMIN_ID` from the environment take precedence over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => ConfigFile::read(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    ConfigFile::read(default)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    fn from_sources<F>(file: ConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_bot_token = env("BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .or(file.telegram_bot_token)
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let admin_id = match env("ADMIN_ID") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidAdminId(raw.clone()))?,
            None => file.admin_id.ok_or(ConfigError::Missing("ADMIN_ID"))?,
        };
        if admin_id == 0 {
            return Err(ConfigError::InvalidAdminId("0".into()));
        }

        let max_voice_secs = file.max_voice_secs.unwrap_or(10);
        if max_voice_secs == 0 {
            return Err(ConfigError::Validation("max_voice_secs must be at least 1".into()));
        }
        let like_threshold = file.like_threshold.unwrap_or(30);
        if like_threshold == 0 {
            return Err(ConfigError::Validation("like_threshold must be at least 1".into()));
        }
        let like_emoji = file.like_emoji.unwrap_or_else(|| "👍".to_string());
        if like_emoji.trim().is_empty() {
            return Err(ConfigError::Validation("like_emoji must not be empty".into()));
        }

        let data_dir = file.data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        let audio_dir = data_dir.join(file.audio_dir.as_deref().unwrap_or("static/audio"));

        Ok(Self {
            telegram_bot_token,
            admin_id: UserId(admin_id),
            data_dir,
            audio_dir,
            max_voice_secs,
            like_threshold,
            like_emoji,
            mirror_logs_to_admin: file.mirror_logs_to_admin,
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_id == user_id
    }

    /// Private chat with the administrator. Telegram uses the user id as its chat id.
    pub fn admin_chat(&self) -> ChatId {
        ChatId(self.admin_id.0 as i64)
    }

    /// Path of the SQLite reaction ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("relay.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TOKEN: &str = "123456789:ABCdefGHIjklMNOpqrsTUVwxyz";

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn from_env(file: ConfigFile, vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_sources(file, move |key| vars.get(key).cloned())
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_env_only_config() {
        let config = from_env(ConfigFile::default(), &[("BOT_TOKEN", TOKEN), ("ADMIN_ID", "42")])
            .expect("should load from environment");
        assert_eq!(config.admin_id, UserId(42));
        assert_eq!(config.admin_chat(), ChatId(42));
        assert_eq!(config.max_voice_secs, 10);
        assert_eq!(config.like_threshold, 30);
        assert_eq!(config.like_emoji, "👍");
        assert_eq!(config.audio_dir, PathBuf::from("./static/audio"));
        assert!(!config.mirror_logs_to_admin);
    }

    #[test]
    fn test_missing_admin_id_is_fatal() {
        let err = assert_err(from_env(ConfigFile::default(), &[("BOT_TOKEN", TOKEN)]));
        assert!(matches!(err, ConfigError::Missing("ADMIN_ID")));
    }

    #[test]
    fn test_non_numeric_admin_id_is_fatal() {
        let err = assert_err(from_env(
            ConfigFile::default(),
            &[("BOT_TOKEN", TOKEN), ("ADMIN_ID", "alice")],
        ));
        assert!(matches!(err, ConfigError::InvalidAdminId(ref v) if v == "alice"));
    }

    #[test]
    fn test_missing_token() {
        let err = assert_err(from_env(ConfigFile::default(), &[("ADMIN_ID", "42")]));
        assert!(matches!(err, ConfigError::Missing("BOT_TOKEN")));
    }

    #[test]
    fn test_invalid_token_format() {
        for token in ["invalid_token_no_colon", "notanumber:ABCdef", "123456789:"] {
            let err = assert_err(from_env(
                ConfigFile::default(),
                &[("BOT_TOKEN", token), ("ADMIN_ID", "42")],
            ));
            assert!(matches!(err, ConfigError::Validation(_)), "token {token} should be rejected");
        }
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config(&format!(
            r#"{{ "telegram_bot_token": "{TOKEN}", "admin_id": 1, "like_threshold": 5 }}"#
        ));
        let parsed = ConfigFile::read(file.path()).unwrap();
        let config = from_env(parsed, &[("ADMIN_ID", "777")]).unwrap();
        assert_eq!(config.admin_id, UserId(777));
        assert_eq!(config.like_threshold, 5);
        assert_eq!(config.telegram_bot_token, TOKEN);
    }

    #[test]
    fn test_file_paths_resolve_against_data_dir() {
        let file = write_config(&format!(
            r#"{{ "telegram_bot_token": "{TOKEN}", "admin_id": 9,
                 "data_dir": "/var/lib/relay", "audio_dir": "clips" }}"#
        ));
        let config = from_env(ConfigFile::read(file.path()).unwrap(), &[]).unwrap();
        assert_eq!(config.audio_dir, PathBuf::from("/var/lib/relay/clips"));
        assert_eq!(config.ledger_path(), PathBuf::from("/var/lib/relay/relay.db"));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let file = write_config(&format!(
            r#"{{ "telegram_bot_token": "{TOKEN}", "admin_id": 9, "like_threshold": 0 }}"#
        ));
        let err = assert_err(from_env(ConfigFile::read(file.path()).unwrap(), &[]));
        assert!(err.to_string().contains("like_threshold"));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load(Some(Path::new("/nonexistent/path/config.json"))));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(ConfigFile::read(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
