//! Spin wheel: daily quota, inverse-weighted draw, and quota bookkeeping.
//!
//! Weights are derived from the magnitudes themselves (`10000 / (v + 1)`), so a
//! zero-credit outcome is far more common than a jackpot without a separate odds
//! table. Weights are per list entry: listing a magnitude twice roughly doubles
//! its odds.

use chrono::{DateTime, FixedOffset, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::clock::{is_same_local_day, seconds_until_local_midnight};
use crate::domain::{SystemSettings, Tier, User};
use crate::error::ContractViolation;

pub const WEIGHT_SCALE: i64 = 10_000;
/// Number of visual slices on the wheel.
pub const SEGMENT_COUNT: usize = 12;
/// Magnitudes at or above this are drawn as jackpots.
pub const JACKPOT_MIN: i64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    DailyLimitReached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible {
        remaining: u32,
        limit: u32,
        tier: Tier,
    },
    Blocked {
        reason: BlockReason,
        #[serde(rename = "secondsUntilReset")]
        seconds_until_reset: i64,
        limit: u32,
        tier: Tier,
    },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }
}

/// Spins already taken today. A count stamped on an earlier local day reads as 0.
pub fn spins_today(user: &User, now: &DateTime<FixedOffset>) -> u32 {
    match user.last_spin_time {
        Some(last) if is_same_local_day(last, now) => user.daily_spin_count,
        _ => 0,
    }
}

pub fn check_eligibility(
    user: &User,
    settings: &SystemSettings,
    now: &DateTime<FixedOffset>,
) -> Result<Eligibility, ContractViolation> {
    let tier = user.tier(now);
    let raw_limit = settings.spin_limit(tier);
    if raw_limit <= 0 {
        return Err(ContractViolation::NonPositiveSpinLimit { tier, value: raw_limit });
    }
    let limit = u32::try_from(raw_limit).unwrap_or(u32::MAX);
    let today = spins_today(user, now);

    if today < limit {
        Ok(Eligibility::Eligible { remaining: limit - today, limit, tier })
    } else {
        Ok(Eligibility::Blocked {
            reason: BlockReason::DailyLimitReached,
            seconds_until_reset: seconds_until_local_midnight(now),
            limit,
            tier,
        })
    }
}

/// Selection weight of one wheel entry. Negative magnitudes weigh nothing; the
/// draw functions reject them before getting here.
pub fn weight(magnitude: i64) -> u64 {
    WEIGHT_SCALE
        .checked_div(magnitude.saturating_add(1))
        .unwrap_or(0)
        .max(0) as u64
}

fn checked_weights(rewards: &[i64]) -> Result<Vec<u64>, ContractViolation> {
    if rewards.is_empty() {
        return Err(ContractViolation::EmptyRewardList);
    }
    rewards
        .iter()
        .map(|&v| if v < 0 { Err(ContractViolation::NegativeReward(v)) } else { Ok(weight(v)) })
        .collect()
}

pub fn total_weight(rewards: &[i64]) -> Result<u64, ContractViolation> {
    Ok(checked_weights(rewards)?.iter().sum())
}

/// Resolve a roll in `[0, total_weight)` to a magnitude by walking the list in
/// order. A roll that walks off the end resolves to the last entry.
pub fn draw_with_roll(rewards: &[i64], roll: u64) -> Result<i64, ContractViolation> {
    let weights = checked_weights(rewards)?;
    let mut remaining = roll;
    for (&value, &w) in rewards.iter().zip(weights.iter()) {
        if remaining < w {
            return Ok(value);
        }
        remaining -= w;
    }
    Ok(rewards[rewards.len() - 1])
}

pub fn draw<R: Rng + ?Sized>(rewards: &[i64], rng: &mut R) -> Result<i64, ContractViolation> {
    let total = total_weight(rewards)?;
    // Only possible when every magnitude is at least WEIGHT_SCALE.
    let roll = if total == 0 { 0 } else { rng.gen_range(0..total) };
    let won = draw_with_roll(rewards, roll)?;
    debug!(target: "reward", roll, total, won, "Wheel drawn");
    Ok(won)
}

/// Book one spin: credits the winnings and consumes a quota slot, misses included.
pub fn commit_draw(user: &User, won_amount: i64, now: &DateTime<FixedOffset>) -> Result<User, ContractViolation> {
    if won_amount < 0 {
        return Err(ContractViolation::NegativeReward(won_amount));
    }
    let mut updated = user.clone();
    updated.credits = user.credits.saturating_add(won_amount);
    updated.daily_spin_count = spins_today(user, now).saturating_add(1);
    updated.last_spin_time = Some(now.with_timezone(&Utc));
    Ok(updated)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WheelSegment {
    pub value: i64,
    pub jackpot: bool,
    pub label: String,
}

/// Lay the rewards around the wheel, repeating them to fill every slice.
pub fn wheel_segments(rewards: &[i64]) -> Vec<WheelSegment> {
    if rewards.is_empty() {
        return Vec::new();
    }
    (0..SEGMENT_COUNT)
        .map(|i| {
            let value = rewards[i % rewards.len()];
            WheelSegment {
                value,
                jackpot: value >= JACKPOT_MIN,
                label: if value == 0 { "0".to_string() } else { format!("{value} CR") },
            }
        })
        .collect()
}

/// Slice the pointer should stop on: a random one among those showing `value`.
pub fn segment_for<R: Rng + ?Sized>(segments: &[WheelSegment], value: i64, rng: &mut R) -> usize {
    let matching: Vec<usize> = segments
        .iter()
        .enumerate()
        .filter(|(_, seg)| seg.value == value)
        .map(|(i, _)| i)
        .collect();
    if matching.is_empty() {
        0
    } else {
        matching[rng.gen_range(0..matching.len())]
    }
}
