//! Environment configuration

use crate::db::UserId;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 30;
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub bot_token: String,
    pub api_base: String,
    pub upload_dir: PathBuf,
    pub rate_limit_per_minute: u32,
    /// Longest accepted text message, in characters
    pub max_message_len: usize,
    /// Seeded into the admin table at start-up
    pub admin_ids: Vec<UserId>,
    /// Serve the webhook on this port instead of long-polling
    pub webhook_port: Option<u16>,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("LEARNBOT_DB_PATH").unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.learnbot/learnbot.db")
        });

        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;

        let admin_ids = lookup("LEARNBOT_ADMIN_IDS")
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default();

        Ok(Self {
            db_path: PathBuf::from(db_path),
            bot_token,
            api_base: lookup("LEARNBOT_API_BASE")
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            upload_dir: PathBuf::from(
                lookup("LEARNBOT_UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
            rate_limit_per_minute: numeric(
                &lookup,
                "LEARNBOT_RATE_LIMIT_PER_MINUTE",
                DEFAULT_RATE_LIMIT_PER_MINUTE,
            ),
            max_message_len: numeric(&lookup, "LEARNBOT_MAX_MESSAGE_LEN", DEFAULT_MAX_MESSAGE_LEN),
            admin_ids,
            webhook_port: lookup("LEARNBOT_WEBHOOK_PORT").and_then(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|e| {
                        tracing::warn!(value = %raw, error = %e, "Invalid LEARNBOT_WEBHOOK_PORT, long-polling instead");
                    })
                    .ok()
            }),
            webhook_secret: lookup("LEARNBOT_WEBHOOK_SECRET").filter(|s| !s.is_empty()),
        })
    }
}

/// Parse a positive number, keeping the default for anything else
fn numeric<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            tracing::warn!(key, value = %raw, "Invalid numeric setting, using default");
            default
        }
    }
}

fn parse_admin_ids(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = s, "Ignoring invalid admin id");
                None
            }
        })
        .collect()
}
