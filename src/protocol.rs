//! Public protocol structs for the HTTP endpoints (serde ready).
//! Field names are camelCase to match the learner app's stored documents.

use serde::{Deserialize, Serialize};

use crate::domain::{SubjectProgress, Tier, User};
use crate::logic::{ChapterMapResult, ScoreResult, SpinOutcome, SpinStatus};
use crate::progress::ChapterView;
use crate::reward::{Eligibility, WheelSegment};
use crate::util::format_countdown;

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserIn {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreIn {
    pub subject_id: String,
    pub score: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOut {
    pub leveled_up: bool,
    pub chapter_index: u32,
    pub progress: SubjectProgress,
    pub threshold: i64,
}

impl From<ScoreResult> for ScoreOut {
    fn from(r: ScoreResult) -> Self {
        Self { leveled_up: r.leveled_up, chapter_index: r.chapter_index, progress: r.progress, threshold: r.threshold }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterQuery {
    pub subject_id: String,
    /// Chapters in the subject's syllabus. Defaults to 10.
    pub count: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaptersOut {
    pub progress: SubjectProgress,
    pub threshold: i64,
    pub ratio: f64,
    pub chapters: Vec<ChapterView>,
}

impl From<ChapterMapResult> for ChaptersOut {
    fn from(r: ChapterMapResult) -> Self {
        Self { progress: r.progress, threshold: r.threshold, ratio: r.ratio, chapters: r.chapters }
    }
}

/// Learner record as the app sees it, plus the tier resolved at request time.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOut {
    #[serde(flatten)]
    pub user: User,
    pub tier: Tier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinStatusOut {
    #[serde(flatten)]
    pub eligibility: Eligibility,
    /// "Xh Ym Zs" until the quota resets; only present when blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown: Option<String>,
    pub segments: Vec<WheelSegment>,
}

impl From<SpinStatus> for SpinStatusOut {
    fn from(s: SpinStatus) -> Self {
        Self { countdown: countdown_of(&s.eligibility), eligibility: s.eligibility, segments: s.segments }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpinOut {
    #[serde(rename_all = "camelCase")]
    Spun {
        amount: i64,
        segment: usize,
        jackpot: bool,
        credits: i64,
        remaining: u32,
    },
    #[serde(rename_all = "camelCase")]
    Blocked {
        seconds_until_reset: i64,
        countdown: String,
        limit: u32,
        tier: Tier,
    },
}

impl From<SpinOutcome> for SpinOut {
    fn from(o: SpinOutcome) -> Self {
        match o {
            SpinOutcome::Spun { amount, segment, jackpot, credits, remaining } => {
                SpinOut::Spun { amount, segment, jackpot, credits, remaining }
            }
            SpinOutcome::Blocked(Eligibility::Blocked { seconds_until_reset, limit, tier, .. }) => SpinOut::Blocked {
                seconds_until_reset,
                countdown: format_countdown(seconds_until_reset),
                limit,
                tier,
            },
            // Logic only wraps blocked verdicts; an eligible one here means zero left.
            SpinOutcome::Blocked(Eligibility::Eligible { limit, tier, .. }) => SpinOut::Blocked {
                seconds_until_reset: 0,
                countdown: format_countdown(0),
                limit,
                tier,
            },
        }
    }
}

fn countdown_of(e: &Eligibility) -> Option<String> {
    match e {
        Eligibility::Blocked { seconds_until_reset, .. } => Some(format_countdown(*seconds_until_reset)),
        Eligibility::Eligible { .. } => None,
    }
}
