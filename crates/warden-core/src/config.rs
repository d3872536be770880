//! Top-level configuration: a TOML file layered with `WARDEN_`-prefixed
//! environment overrides, producing one validated [`WardenConfig`].
//!
//! Unlike a multi-tenant gateway, this process has exactly one owner and
//! one chat surface, so the config is flat rather than a tree of per-
//! provider/per-channel tables.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};

/// Config as deserialized from TOML + environment, before validation.
/// Every field is optional here — required-field checking happens in
/// [`WardenConfig::load`] so missing keys produce an actionable message
/// instead of a raw deserialize error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawConfig {
    user_name: Option<String>,
    bot_name: Option<String>,
    discord_token: Option<String>,
    timezone: Option<String>,
    webhook_secret: Option<String>,
    anthropic_api_key: Option<String>,
    state_dir: Option<String>,
    claude_command: Option<String>,
    claude_model: Option<String>,
    webhook_bind: Option<String>,
}

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Display name of the owner, used in prompts and DM addressing.
    pub user_name: String,
    /// Display name the bot presents itself as.
    pub bot_name: String,
    /// Chat-surface (Discord) bot token.
    pub discord_token: String,
    /// IANA timezone used for cron evaluation and human-readable times.
    /// Falls back to the system timezone, then UTC.
    pub timezone: String,
    /// Shared secret for `Authorization: Bearer <secret>` on the webhook
    /// listener. `None` means the listener is not started.
    pub webhook_secret: Option<String>,
    /// Opaque pass-through credential for the agent SDK.
    pub anthropic_api_key: Option<String>,
    /// Directory holding routines/reminders/webhooks/session state.
    pub state_dir: PathBuf,
    /// `claude` binary to invoke per turn. Defaults to `claude` on `PATH`.
    pub claude_command: String,
    /// Default `--model` passed to `claude_command` when a fire doesn't
    /// request one of its own.
    pub claude_model: Option<String>,
    /// Listen address for the webhook ingress, only bound when
    /// `webhook_secret` is set.
    pub webhook_bind: String,
}

impl WardenConfig {
    /// Load from `config_path` (or `$STATE_DIR/config.toml`, or
    /// `~/.warden/config.toml` if `WARDEN_STATE_DIR` is also unset), with
    /// `WARDEN_*` environment variables overriding any key.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let state_dir = resolve_state_dir();
        let path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir.join("config.toml"));

        let raw: RawConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WARDEN_"))
            .extract()
            .map_err(|e| WardenError::Config(e.to_string()))?;

        let user_name = require(raw.user_name, "USER_NAME")?;
        let bot_name = require(raw.bot_name, "BOT_NAME")?;
        let discord_token = require(raw.discord_token, "DISCORD_TOKEN")?;

        let timezone = raw
            .timezone
            .or_else(detect_system_timezone)
            .unwrap_or_else(|| "UTC".to_string());

        let state_dir = raw.state_dir.map(PathBuf::from).unwrap_or(state_dir);

        Ok(Self {
            user_name,
            bot_name,
            discord_token,
            timezone,
            webhook_secret: raw.webhook_secret,
            anthropic_api_key: raw.anthropic_api_key,
            state_dir,
            claude_command: raw.claude_command.unwrap_or_else(|| "claude".to_string()),
            claude_model: raw.claude_model,
            webhook_bind: raw.webhook_bind.unwrap_or_else(|| "0.0.0.0:8787".to_string()),
        })
    }
}

fn require(value: Option<String>, env_name: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(WardenError::MissingEnv(env_name.to_string())),
    }
}

fn resolve_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WARDEN_STATE_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".warden")
}

/// Best-effort detection of the system's local timezone name. Returns
/// `None` (letting the caller fall back to UTC) when `/etc/timezone`
/// isn't present, e.g. in minimal containers.
fn detect_system_timezone() -> Option<String> {
    std::fs::read_to_string("/etc/timezone")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_missing_and_blank() {
        assert!(require(None, "X").is_err());
        assert!(require(Some("  ".to_string()), "X").is_err());
        assert!(require(Some("v".to_string()), "X").is_ok());
    }

    #[test]
    fn load_fails_without_required_keys() {
        std::env::remove_var("WARDEN_USER_NAME");
        std::env::remove_var("WARDEN_BOT_NAME");
        std::env::remove_var("WARDEN_DISCORD_TOKEN");
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let result = WardenConfig::load(Some(path.to_str().unwrap()));
        assert!(result.is_err());
    }

    #[test]
    fn load_succeeds_with_required_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            user_name = "Ada"
            bot_name = "Warden"
            discord_token = "tok"
            "#,
        )
        .unwrap();
        let cfg = WardenConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.user_name, "Ada");
        assert_eq!(cfg.bot_name, "Warden");
        assert_eq!(cfg.discord_token, "tok");
        assert!(cfg.webhook_secret.is_none());
    }
}
