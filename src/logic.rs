//! Use cases shared by the HTTP handlers.
//!
//! Each one loads the learner record, runs the pure engine against the current
//! settings and clock, and writes the result back with a version check. Engines
//! never see storage; this layer never does arithmetic of its own.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, instrument};

use crate::domain::{SubjectProgress, User};
use crate::error::ServiceError;
use crate::progress::{apply_score_with, chapter_map, progress_ratio, ChapterView};
use crate::reward::{check_eligibility, commit_draw, draw, segment_for, wheel_segments, Eligibility, WheelSegment};
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq)]
pub struct ScoreResult {
  pub leveled_up: bool,
  pub chapter_index: u32,
  pub progress: SubjectProgress,
  pub threshold: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChapterMapResult {
  pub progress: SubjectProgress,
  pub threshold: i64,
  pub ratio: f64,
  pub chapters: Vec<ChapterView>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpinStatus {
  pub eligibility: Eligibility,
  pub segments: Vec<WheelSegment>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SpinOutcome {
  Spun {
    amount: i64,
    segment: usize,
    jackpot: bool,
    credits: i64,
    remaining: u32,
  },
  Blocked(Eligibility),
}

#[instrument(level = "info", skip(state))]
pub async fn create_user(state: &AppState, name: &str) -> Result<User, ServiceError> {
  let user = User::new_student(uuid::Uuid::new_v4().to_string(), name.trim());
  let stored = state.create_user(user).await?;
  info!(target: "nst_backend", id = %stored.value.id, "Learner created");
  Ok(stored.value)
}

pub async fn get_user(state: &AppState, user_id: &str) -> Result<User, ServiceError> {
  Ok(state.load_user(user_id).await?.value)
}

#[instrument(level = "info", skip(state))]
pub async fn submit_score(
  state: &AppState,
  user_id: &str,
  subject_id: &str,
  score_delta: i64,
) -> Result<ScoreResult, ServiceError> {
  let loaded = state.load_user(user_id).await?;
  let settings = state.settings.current().await;
  let threshold = settings.mcq_unlock_threshold;

  let outcome = apply_score_with(&loaded.value, subject_id, score_delta, threshold, settings.chapter_advance)?;
  let progress = outcome.user.subject_progress(subject_id);
  state.save_user(loaded.version, outcome.user).await?;

  info!(
    target: "progress",
    user = user_id, subject = subject_id, score_delta,
    leveled_up = outcome.leveled_up, chapter = outcome.chapter_index, solved = progress.total_mcqs_solved,
    "Score recorded"
  );
  Ok(ScoreResult { leveled_up: outcome.leveled_up, chapter_index: outcome.chapter_index, progress, threshold })
}

pub async fn chapters(
  state: &AppState,
  user_id: &str,
  subject_id: &str,
  chapter_count: u32,
) -> Result<ChapterMapResult, ServiceError> {
  let user = state.load_user(user_id).await?.value;
  let threshold = state.settings.current().await.mcq_unlock_threshold;
  let progress = user.subject_progress(subject_id);
  Ok(ChapterMapResult {
    progress,
    threshold,
    ratio: progress_ratio(&progress, threshold)?,
    chapters: chapter_map(&user, subject_id, chapter_count)?,
  })
}

pub async fn spin_status(state: &AppState, user_id: &str) -> Result<SpinStatus, ServiceError> {
  let user = state.load_user(user_id).await?.value;
  let settings = state.settings.current().await;
  let eligibility = check_eligibility(&user, &settings, &state.clock.now())?;
  Ok(SpinStatus { eligibility, segments: wheel_segments(&settings.effective_rewards()) })
}

pub async fn spin(state: &AppState, user_id: &str) -> Result<SpinOutcome, ServiceError> {
  spin_with_rng(state, user_id, &mut StdRng::from_entropy()).await
}

/// One spin: check the quota, draw, book it. Two spins racing on the same record
/// both pass the check, but the second write fails the version check.
#[instrument(level = "info", skip(state, rng))]
pub async fn spin_with_rng<R: Rng + Send>(
  state: &AppState,
  user_id: &str,
  rng: &mut R,
) -> Result<SpinOutcome, ServiceError> {
  let loaded = state.load_user(user_id).await?;
  let settings = state.settings.current().await;
  let now = state.clock.now();

  if let blocked @ Eligibility::Blocked { .. } = check_eligibility(&loaded.value, &settings, &now)? {
    info!(target: "reward", user = user_id, "Spin refused: daily limit reached");
    return Ok(SpinOutcome::Blocked(blocked));
  }

  let rewards = settings.effective_rewards();
  let amount = draw(&rewards, rng)?;
  let segments = wheel_segments(&rewards);
  let segment = segment_for(&segments, amount, rng);

  let updated = commit_draw(&loaded.value, amount, &now)?;
  let saved = state.save_user(loaded.version, updated).await?;

  let remaining = match check_eligibility(&saved.value, &settings, &now)? {
    Eligibility::Eligible { remaining, .. } => remaining,
    Eligibility::Blocked { .. } => 0,
  };
  info!(target: "reward", user = user_id, amount, segment, credits = saved.value.credits, remaining, "Spin booked");

  Ok(SpinOutcome::Spun {
    amount,
    segment,
    jackpot: segments.get(segment).map(|s| s.jackpot).unwrap_or(false),
    credits: saved.value.credits,
    remaining,
  })
}
