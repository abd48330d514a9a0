//! Application state: learner repository, settings, optional mirror, and clock.
//!
//! This module owns:
//!   - the user repository (in-memory, versioned)
//!   - the settings provider (TOML overrides or defaults)
//!   - the optional remote key-value mirror
//!   - the clock every "today" decision reads
//!
//! Loads fall back to the mirror on a local miss; saves go local first and are
//! queued to a single background writer, so the mirror sees them in save order.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{load_app_config_from_env, AppConfig, UserCfg};
use crate::domain::{SystemSettings, User};
use crate::error::ServiceError;
use crate::mirror::{KvMirror, MirrorWriter};
use crate::store::{InMemorySettings, InMemoryUserRepository, SettingsProvider, UserRepository, Versioned};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub settings: Arc<dyn SettingsProvider>,
    pub mirror: Option<KvMirror>,
    mirror_writer: Option<MirrorWriter>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Build state from env: load config, validate settings, seed learners, init mirror.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_app_config_from_env().unwrap_or_default();
        let mirror = KvMirror::from_env(cfg.mirror.as_ref());
        if let Some(m) = &mirror {
            info!(target: "nst_backend", base_url = %m.base_url, "Remote mirror enabled.");
        } else {
            info!(target: "nst_backend", "Remote mirror disabled (no NST_MIRROR_URL). Local storage only.");
        }
        let clock = system_clock(&cfg);
        info!(target: "nst_backend", zone = %clock.zone(), "Learner day boundaries use a fixed UTC offset");
        Self::from_config(cfg, mirror, Arc::new(clock))
    }

    pub fn from_config(cfg: AppConfig, mirror: Option<KvMirror>, clock: Arc<dyn Clock>) -> Self {
        let settings = match cfg.settings.validate() {
            Ok(()) => cfg.settings,
            Err(e) => {
                error!(target: "nst_backend", error = %e, "Invalid settings in config; using defaults");
                SystemSettings::default()
            }
        };
        info!(
            target: "nst_backend",
            threshold = settings.mcq_unlock_threshold,
            rewards = ?settings.effective_rewards(),
            spin_limit_free = settings.spin_limit_free,
            spin_limit_premium = settings.spin_limit_premium,
            advance = ?settings.chapter_advance,
            "Startup settings"
        );

        let seeded: Vec<User> = cfg.users.into_iter().map(UserCfg::into_user).collect();
        info!(target: "nst_backend", count = seeded.len(), "Seeded learners");

        Self {
            users: Arc::new(InMemoryUserRepository::with_users(seeded)),
            settings: Arc::new(InMemorySettings::new(settings)),
            mirror_writer: mirror.clone().map(MirrorWriter::spawn),
            mirror,
            clock,
        }
    }

    /// Local record, or the mirrored one cached locally on a miss.
    #[instrument(level = "debug", skip(self))]
    pub async fn load_user(&self, id: &str) -> Result<Versioned<User>, ServiceError> {
        if let Some(found) = self.users.get(id).await {
            return Ok(found);
        }
        let Some(mirror) = &self.mirror else {
            return Err(ServiceError::NotFound(id.to_string()));
        };
        match mirror.fetch_user(id).await {
            Ok(Some(remote)) if remote.id == id => {
                info!(target: "mirror", %id, "Restored user from mirror");
                match self.users.insert(remote).await {
                    Ok(stored) => Ok(stored),
                    // Someone else restored or created it meanwhile.
                    Err(ServiceError::AlreadyExists { .. }) => {
                        self.users.get(id).await.ok_or_else(|| ServiceError::NotFound(id.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
            Ok(Some(remote)) => {
                warn!(target: "mirror", %id, remote_id = %remote.id, "Mirror returned a record for another id; ignoring");
                Err(ServiceError::NotFound(id.to_string()))
            }
            Ok(None) => Err(ServiceError::NotFound(id.to_string())),
            Err(e) => {
                error!(target: "mirror", %id, error = %e, "Mirror lookup failed");
                Err(ServiceError::NotFound(id.to_string()))
            }
        }
    }

    /// Write back a record loaded at `version`, then queue it for the mirror.
    #[instrument(level = "debug", skip(self, user), fields(id = %user.id))]
    pub async fn save_user(&self, version: u64, user: User) -> Result<Versioned<User>, ServiceError> {
        let stored = self.users.compare_and_swap(version, user).await?;
        self.queue_for_mirror(&stored);
        Ok(stored)
    }

    pub async fn create_user(&self, user: User) -> Result<Versioned<User>, ServiceError> {
        let stored = self.users.insert(user).await?;
        self.queue_for_mirror(&stored);
        Ok(stored)
    }

    fn queue_for_mirror(&self, stored: &Versioned<User>) {
        if let Some(writer) = &self.mirror_writer {
            writer.enqueue(stored);
        }
    }
}

/// Configured learner offset, or the host's current one.
fn system_clock(cfg: &AppConfig) -> SystemClock {
    match cfg.clock.as_ref().map(|c| (c.utc_offset_minutes, c.zone())) {
        Some((_, Some(zone))) => SystemClock::new(zone),
        Some((minutes, None)) => {
            error!(target: "nst_backend", minutes, "Invalid utcOffsetMinutes in config; using host offset");
            SystemClock::host()
        }
        None => SystemClock::host(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::mirror::test_kv;
    use chrono::{FixedOffset, TimeZone};
    use std::time::Duration;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::new(
            FixedOffset::east_opt(19_800).unwrap().with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn configured_offset_drives_the_system_clock() {
        let cfg = crate::config::parse_app_config("[clock]\nutcOffsetMinutes = 330").unwrap();
        assert_eq!(system_clock(&cfg).zone(), FixedOffset::east_opt(19_800).unwrap());

        let bad = crate::config::parse_app_config("[clock]\nutcOffsetMinutes = 5000").unwrap();
        assert_eq!(system_clock(&bad), SystemClock::host());
    }

    #[tokio::test]
    async fn invalid_config_settings_fall_back_to_defaults() {
        let cfg = AppConfig {
            settings: SystemSettings { mcq_unlock_threshold: -3, ..Default::default() },
            ..Default::default()
        };
        let state = AppState::from_config(cfg, None, clock());
        assert_eq!(state.settings.current().await, SystemSettings::default());
    }

    #[tokio::test]
    async fn missing_user_without_mirror_is_not_found() {
        let state = AppState::from_config(AppConfig::default(), None, clock());
        assert!(matches!(state.load_user("nobody").await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn local_miss_restores_from_mirror() {
        let (base, kv) = test_kv::spawn().await;
        let mut remote = User::new_student("NST-77", "Dev");
        remote.credits = 40;
        kv.records
            .lock()
            .unwrap()
            .insert("NST-77.json".into(), serde_json::to_value(&remote).unwrap());

        let mirror = KvMirror::new(base, None, Duration::from_secs(5));
        let state = AppState::from_config(AppConfig::default(), mirror, clock());

        let loaded = state.load_user("NST-77").await.unwrap();
        assert_eq!(loaded.value, remote);
        // Now cached locally.
        assert!(state.users.get("NST-77").await.is_some());
    }

    #[tokio::test]
    async fn saves_are_mirrored() {
        let (base, kv) = test_kv::spawn().await;
        let mirror = KvMirror::new(base, None, Duration::from_secs(5));
        let state = AppState::from_config(AppConfig::default(), mirror, clock());

        // Insert behind the state's back so only the save below is mirrored.
        let created = state.users.insert(User::new_student("NST-5", "Lata")).await.unwrap();
        let mut user = created.value.clone();
        user.credits = 3;
        state.save_user(created.version, user).await.unwrap();

        // The push runs in the background; give it a moment.
        for _ in 0..50 {
            let credits = kv
                .records
                .lock()
                .unwrap()
                .get("NST-5.json")
                .and_then(|v| v["credits"].as_i64());
            if credits == Some(3) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("mirror never received the saved record");
    }

    #[tokio::test]
    async fn slow_mirror_write_is_not_overtaken_by_a_newer_save() {
        let (base, kv) = test_kv::spawn().await;
        *kv.next_put_delay.lock().unwrap() = Some(Duration::from_millis(300));
        let mirror = KvMirror::new(base, None, Duration::from_secs(5));
        let state = AppState::from_config(AppConfig::default(), mirror, clock());

        let created = state.users.insert(User::new_student("NST-6", "Tara")).await.unwrap();
        let mut first = created.value.clone();
        first.credits = 1;
        first.daily_spin_count = 1;
        let saved = state.save_user(created.version, first).await.unwrap();

        // Give the writer time to start the slow PUT.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut second = saved.value.clone();
        second.credits = 2;
        second.daily_spin_count = 2;
        state.save_user(saved.version, second).await.unwrap();

        tokio::time::sleep(Duration::from_millis(700)).await;
        let remote = kv.records.lock().unwrap().get("NST-6.json").cloned().unwrap();
        let local = state.users.get("NST-6").await.unwrap().value;
        assert_eq!(remote["credits"].as_i64(), Some(local.credits));
        assert_eq!(remote["dailySpinCount"].as_u64(), Some(local.daily_spin_count as u64));
        assert_eq!(local.credits, 2);
    }
}
