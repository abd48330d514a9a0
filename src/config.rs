//! Loading backend configuration (settings overrides, seed learners, mirror, clock) from TOML.
//! Keys are camelCase throughout, matching the stored record shape.
//!
//! Example:
//!
//! ```toml
//! [settings]
//! mcqUnlockThreshold = 50
//! wheelRewards = [0, 1, 2, 5, 10, 50]
//! spinLimitFree = 1
//! spinLimitPremium = 5
//! chapterAdvance = "single"
//!
//! [[users]]
//! id = "NST-ADMIN-001"
//! name = "Admin"
//! role = "admin"
//! isPremium = false
//!
//! [mirror]
//! baseUrl = "https://example-kv.invalid"
//! timeoutSecs = 10
//!
//! [clock]
//! utcOffsetMinutes = 330
//! ```

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Role, SystemSettings, User};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  /// Partial settings; missing keys keep their defaults.
  #[serde(default)]
  pub settings: SystemSettings,
  #[serde(default)]
  pub users: Vec<UserCfg>,
  #[serde(default)]
  pub mirror: Option<MirrorCfg>,
  #[serde(default)]
  pub clock: Option<ClockCfg>,
}

/// Learner entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCfg {
  #[serde(default)] pub id: Option<String>,
  #[serde(default)] pub name: String,
  #[serde(default)] pub role: Role,
  #[serde(default)] pub credits: i64,
  #[serde(default)] pub is_premium: bool,
  #[serde(default)] pub subscription_expiry: Option<DateTime<Utc>>,
}

impl UserCfg {
  pub fn into_user(self) -> User {
    User {
      id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
      name: self.name,
      role: self.role,
      credits: self.credits,
      is_premium: self.is_premium,
      subscription_expiry: self.subscription_expiry,
      ..User::default()
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorCfg {
  pub base_url: String,
  #[serde(default)] pub auth_token: Option<String>,
  #[serde(default = "default_mirror_timeout")] pub timeout_secs: u64,
}

fn default_mirror_timeout() -> u64 { 10 }

/// Learner zone as a fixed offset from UTC, in minutes east.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockCfg {
  pub utc_offset_minutes: i32,
}

impl ClockCfg {
  /// None when the offset is a day or more away from UTC.
  pub fn zone(&self) -> Option<FixedOffset> {
    self.utc_offset_minutes.checked_mul(60).and_then(FixedOffset::east_opt)
  }
}

pub fn parse_app_config(raw: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(raw)
}

/// Attempt to load `AppConfig` from NST_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("NST_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_app_config(&s) {
      Ok(cfg) => {
        info!(target: "nst_backend", %path, users = cfg.users.len(), mirror = cfg.mirror.is_some(), "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "nst_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "nst_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ChapterAdvance;

  #[test]
  fn full_document_parses() {
    let cfg = parse_app_config(r#"
      [settings]
      mcqUnlockThreshold = 50
      wheelRewards = [0, 1, 2, 5, 10, 50]
      chapterAdvance = "looped"

      [[users]]
      id = "NST-ADMIN-001"
      name = "Admin"
      role = "admin"

      [[users]]
      name = "Priya"
      isPremium = true
      subscriptionExpiry = "2030-01-01T00:00:00Z"

      [mirror]
      baseUrl = "http://127.0.0.1:9000"
      authToken = "t0k"

      [clock]
      utcOffsetMinutes = 330
    "#).unwrap();

    assert_eq!(cfg.settings.mcq_unlock_threshold, 50);
    assert_eq!(cfg.settings.spin_limit_free, 1, "unset keys keep defaults");
    assert_eq!(cfg.settings.chapter_advance, ChapterAdvance::Looped);
    assert_eq!(cfg.users.len(), 2);

    let users: Vec<User> = cfg.users.into_iter().map(UserCfg::into_user).collect();
    assert_eq!(users[0].id, "NST-ADMIN-001");
    assert!(users[0].is_admin());
    assert!(!users[1].id.is_empty(), "missing ids are generated");
    assert!(users[1].is_premium);

    let mirror = cfg.mirror.unwrap();
    assert_eq!(mirror.base_url, "http://127.0.0.1:9000");
    assert_eq!(mirror.timeout_secs, 10);
    assert_eq!(mirror.auth_token.as_deref(), Some("t0k"));

    assert_eq!(cfg.clock.unwrap().zone(), FixedOffset::east_opt(330 * 60));
  }

  #[test]
  fn users_read_camel_case_keys_only() {
    let cfg = parse_app_config(r#"
      [[users]]
      name = "Old style"
      is_premium = true
    "#).unwrap();
    assert!(!cfg.users[0].is_premium, "snake_case keys are not recognized");
  }

  #[test]
  fn out_of_range_offset_has_no_zone() {
    assert!(ClockCfg { utc_offset_minutes: 24 * 60 }.zone().is_none());
    assert_eq!(ClockCfg { utc_offset_minutes: -300 }.zone(), FixedOffset::west_opt(300 * 60));
  }

  #[test]
  fn empty_document_is_all_defaults() {
    let cfg = parse_app_config("").unwrap();
    assert_eq!(cfg.settings, SystemSettings::default());
    assert!(cfg.users.is_empty());
    assert!(cfg.mirror.is_none());
    assert!(cfg.clock.is_none());
  }
}
