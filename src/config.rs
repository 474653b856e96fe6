//! Runtime configuration read from the process environment.
//!
//! `.env` files are loaded by the binaries with `dotenvy` before
//! [`AppConfig::from_env`] runs.

use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;
pub const DEFAULT_SECONDARY_FONT: &str = "static/fonts/NotoSansDevanagari-Regular.ttf";
pub const DEFAULT_SPEECH_API_URL: &str = "https://api.sarvam.ai/speech-to-text";
pub const DEFAULT_SPEECH_MODEL: &str = "saarika:v2.5";
pub const DEFAULT_SPEECH_LANGUAGE: &str = "hi-IN";
pub const DEFAULT_CHAT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub db_pool_size: u32,
    pub token_ttl_minutes: i64,
    pub jwt_private_key_path: Option<PathBuf>,
    pub secondary_font_path: PathBuf,
    pub speech: SpeechApiConfig,
    pub chat: ChatApiConfig,
}

/// Speech-to-text provider settings.
#[derive(Debug, Clone)]
pub struct SpeechApiConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub language_code: String,
}

/// Chat-completion provider settings used for SOAP summaries.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;

        let db_pool_size = match get("DB_POOL_SIZE") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("DB_POOL_SIZE is not a number: {raw}"))?,
            None => DEFAULT_POOL_SIZE,
        };
        if db_pool_size == 0 {
            anyhow::bail!("DB_POOL_SIZE must be at least 1");
        }

        let token_ttl_minutes = match get("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("ACCESS_TOKEN_EXPIRE_MINUTES is not a number: {raw}"))?,
            None => DEFAULT_TOKEN_TTL_MINUTES,
        };
        if token_ttl_minutes <= 0 {
            anyhow::bail!("ACCESS_TOKEN_EXPIRE_MINUTES must be positive");
        }

        Ok(AppConfig {
            database_url,
            bind_addr: or("BIND_ADDR", DEFAULT_BIND_ADDR),
            db_pool_size,
            token_ttl_minutes,
            jwt_private_key_path: get("JWT_PRIVATE_KEY_PATH").map(PathBuf::from),
            secondary_font_path: PathBuf::from(or("REPORT_SECONDARY_FONT", DEFAULT_SECONDARY_FONT)),
            speech: SpeechApiConfig {
                api_key: get("SARVAM_API_KEY"),
                api_url: or("SARVAM_API_URL", DEFAULT_SPEECH_API_URL),
                model: or("SARVAM_MODEL", DEFAULT_SPEECH_MODEL),
                language_code: or("SARVAM_LANGUAGE", DEFAULT_SPEECH_LANGUAGE),
            },
            chat: ChatApiConfig {
                api_key: get("OPENAI_API_KEY"),
                api_url: or("OPENAI_API_URL", DEFAULT_CHAT_API_URL),
                model: or("OPENAI_MODEL", DEFAULT_CHAT_MODEL),
            },
        })
    }
}
