//! Domain models: learner record, per-subject progress, and the settings subset the
//! progress and reward engines read.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContractViolation;

/// Rewards used when the configured wheel is empty.
pub const FALLBACK_WHEEL_REWARDS: [i64; 5] = [0, 1, 2, 5, 10];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  #[default]
  Student,
  Admin,
}

/// Subscription tier, decides the daily spin quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
  Free,
  Premium,
}

/// Progress of one learner in one subject. Absent entries read as `{0, 0}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgress {
  pub current_chapter_index: u32,
  #[serde(rename = "totalMCQsSolved")]
  pub total_mcqs_solved: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: String,
  #[serde(default)] pub name: String,
  #[serde(default)] pub role: Role,
  #[serde(default)] pub credits: i64,
  #[serde(default)] pub is_premium: bool,
  #[serde(default)] pub subscription_expiry: Option<DateTime<Utc>>,
  #[serde(default)] pub progress: HashMap<String, SubjectProgress>,
  #[serde(default)] pub last_spin_time: Option<DateTime<Utc>>,
  // Only meaningful for the local day of `last_spin_time`.
  #[serde(default)] pub daily_spin_count: u32,
}

impl User {
  pub fn new_student(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self { id: id.into(), name: name.into(), ..Self::default() }
  }

  /// Premium only counts while the subscription expiry is strictly in the future.
  pub fn tier(&self, now: &DateTime<FixedOffset>) -> Tier {
    match self.subscription_expiry {
      Some(expiry) if self.is_premium && expiry > now.with_timezone(&Utc) => Tier::Premium,
      _ => Tier::Free,
    }
  }

  pub fn subject_progress(&self, subject_id: &str) -> SubjectProgress {
    self.progress.get(subject_id).copied().unwrap_or_default()
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }
}

/// How many chapters one score submission may advance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterAdvance {
  /// At most one chapter per submission; a large delta can leave the carry
  /// at or above the threshold until the next submission.
  #[default]
  Single,
  /// Advance once per full threshold contained in the new total.
  Looped,
}

/// Settings subset owned by the admin console. Missing keys take defaults, so a
/// partial document merges over the built-in values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemSettings {
  pub mcq_unlock_threshold: i64,
  pub wheel_rewards: Vec<i64>,
  pub spin_limit_free: i64,
  pub spin_limit_premium: i64,
  pub chapter_advance: ChapterAdvance,
}

impl Default for SystemSettings {
  fn default() -> Self {
    Self {
      mcq_unlock_threshold: 100,
      wheel_rewards: vec![0, 1, 2, 5],
      spin_limit_free: 1,
      spin_limit_premium: 5,
      chapter_advance: ChapterAdvance::Single,
    }
  }
}

impl SystemSettings {
  /// Reject values that would make either engine misbehave. An empty wheel is
  /// allowed here because it falls back to `FALLBACK_WHEEL_REWARDS`.
  pub fn validate(&self) -> Result<(), ContractViolation> {
    if self.mcq_unlock_threshold <= 0 {
      return Err(ContractViolation::NonPositiveThreshold(self.mcq_unlock_threshold));
    }
    if self.spin_limit_free <= 0 {
      return Err(ContractViolation::NonPositiveSpinLimit { tier: Tier::Free, value: self.spin_limit_free });
    }
    if self.spin_limit_premium <= 0 {
      return Err(ContractViolation::NonPositiveSpinLimit { tier: Tier::Premium, value: self.spin_limit_premium });
    }
    if let Some(&bad) = self.wheel_rewards.iter().find(|v| **v < 0) {
      return Err(ContractViolation::NegativeReward(bad));
    }
    Ok(())
  }

  pub fn effective_rewards(&self) -> Vec<i64> {
    if self.wheel_rewards.is_empty() {
      FALLBACK_WHEEL_REWARDS.to_vec()
    } else {
      self.wheel_rewards.clone()
    }
  }

  pub fn spin_limit(&self, tier: Tier) -> i64 {
    match tier {
      Tier::Free => self.spin_limit_free,
      Tier::Premium => self.spin_limit_premium,
    }
  }
}

/// Admin edit of the settings. Absent keys keep the value currently in force,
/// not the built-in default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
  pub mcq_unlock_threshold: Option<i64>,
  pub wheel_rewards: Option<Vec<i64>>,
  pub spin_limit_free: Option<i64>,
  pub spin_limit_premium: Option<i64>,
  pub chapter_advance: Option<ChapterAdvance>,
}

impl SettingsPatch {
  pub fn apply_to(&self, current: &SystemSettings) -> SystemSettings {
    SystemSettings {
      mcq_unlock_threshold: self.mcq_unlock_threshold.unwrap_or(current.mcq_unlock_threshold),
      wheel_rewards: self.wheel_rewards.clone().unwrap_or_else(|| current.wheel_rewards.clone()),
      spin_limit_free: self.spin_limit_free.unwrap_or(current.spin_limit_free),
      spin_limit_premium: self.spin_limit_premium.unwrap_or(current.spin_limit_premium),
      chapter_advance: self.chapter_advance.unwrap_or(current.chapter_advance),
    }
  }
}
