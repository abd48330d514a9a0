//! Chapter unlock tracking.
//!
//! Each (learner, subject) pair walks an open-ended chapter sequence `0, 1, 2, ...`.
//! Correct practice answers accumulate until the unlock threshold is reached, then
//! the active chapter advances and the surplus carries over. How many chapters a
//! subject actually has is the caller's business.

use serde::Serialize;
use tracing::debug;

use crate::domain::{ChapterAdvance, SubjectProgress, User};
use crate::error::ContractViolation;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub user: User,
    pub leveled_up: bool,
    pub chapter_index: u32,
}

/// Record `score_delta` newly correct answers for `subject_id`, advancing at most
/// one chapter. See [`apply_score_with`] for the looped variant.
pub fn apply_score(
    user: &User,
    subject_id: &str,
    score_delta: i64,
    threshold: i64,
) -> Result<ScoreOutcome, ContractViolation> {
    apply_score_with(user, subject_id, score_delta, threshold, ChapterAdvance::Single)
}

pub fn apply_score_with(
    user: &User,
    subject_id: &str,
    score_delta: i64,
    threshold: i64,
    advance: ChapterAdvance,
) -> Result<ScoreOutcome, ContractViolation> {
    if threshold <= 0 {
        return Err(ContractViolation::NonPositiveThreshold(threshold));
    }
    if score_delta < 0 {
        return Err(ContractViolation::NegativeScoreDelta(score_delta));
    }
    let threshold = threshold as u64;

    let before = user.subject_progress(subject_id);
    let mut solved = before.total_mcqs_solved.saturating_add(score_delta as u64);
    let mut chapter = before.current_chapter_index;

    match advance {
        ChapterAdvance::Single => {
            if solved >= threshold {
                solved -= threshold;
                chapter = chapter.saturating_add(1);
            }
        }
        ChapterAdvance::Looped => {
            let steps = solved / threshold;
            solved %= threshold;
            chapter = chapter.saturating_add(u32::try_from(steps).unwrap_or(u32::MAX));
        }
    }

    let leveled_up = chapter != before.current_chapter_index;
    if leveled_up {
        debug!(target: "progress", user = %user.id, subject = subject_id, from = before.current_chapter_index, to = chapter, carry = solved, "Chapter unlocked");
    }

    let mut updated = user.clone();
    updated.progress.insert(
        subject_id.to_string(),
        SubjectProgress { current_chapter_index: chapter, total_mcqs_solved: solved },
    );

    Ok(ScoreOutcome { user: updated, leveled_up, chapter_index: chapter })
}

/// How a chapter appears on the syllabus screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Completed,
    Current,
    Locked,
    /// Beyond the current chapter but visible to admins.
    Open,
}

pub fn chapter_status(progress: &SubjectProgress, index: u32, is_admin: bool) -> ChapterStatus {
    let current = progress.current_chapter_index;
    if index < current {
        ChapterStatus::Completed
    } else if index == current {
        ChapterStatus::Current
    } else if is_admin {
        ChapterStatus::Open
    } else {
        ChapterStatus::Locked
    }
}

/// Fill level of the target bar under the current chapter, capped at 1.0.
pub fn progress_ratio(progress: &SubjectProgress, threshold: i64) -> Result<f64, ContractViolation> {
    if threshold <= 0 {
        return Err(ContractViolation::NonPositiveThreshold(threshold));
    }
    Ok((progress.total_mcqs_solved as f64 / threshold as f64).min(1.0))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ChapterView {
    pub index: u32,
    pub status: ChapterStatus,
}

pub fn chapter_map(user: &User, subject_id: &str, chapter_count: u32) -> Result<Vec<ChapterView>, ContractViolation> {
    if chapter_count == 0 {
        return Err(ContractViolation::NoChapters);
    }
    let progress = user.subject_progress(subject_id);
    let is_admin = user.is_admin();
    Ok((0..chapter_count)
        .map(|index| ChapterView { index, status: chapter_status(&progress, index, is_admin) })
        .collect())
}
