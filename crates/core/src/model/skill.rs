use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::tag::SkillTag;

/// Number of sessions on each side of the trend comparison.
pub const TREND_WINDOW: usize = 3;

/// Accuracy change, in percentage points, needed to leave `Trend::Stable`.
pub const TREND_THRESHOLD_POINTS: f64 = 5.0;

/// Accuracy at or above which a skill counts as a strength.
pub const STRENGTH_ACCURACY: f64 = 0.8;

/// Accuracy below which a skill needs more practice.
pub const FOCUS_ACCURACY: f64 = 0.6;

//
// ─── SESSION TALLY ─────────────────────────────────────────────────────────────
//

/// Attempts and correct answers for one skill within one session.
///
/// Only grows through `record`, so `correct <= attempts` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionTally {
    attempts: u32,
    correct: u32,
}

impl SessionTally {
    pub fn record(&mut self, correct: bool) {
        if self.attempts == u32::MAX {
            return;
        }
        self.attempts += 1;
        if correct {
            self.correct += 1;
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }
}

fn ratio(correct: u64, attempts: u64) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let value = correct as f64 / attempts as f64;
    value
}

fn window_accuracy(window: &[SessionTally]) -> f64 {
    let attempts: u64 = window.iter().map(|t| u64::from(t.attempts)).sum();
    let correct: u64 = window.iter().map(|t| u64::from(t.correct)).sum();
    ratio(correct, attempts)
}

//
// ─── TREND ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

//
// ─── SKILL RECORD ──────────────────────────────────────────────────────────────
//

/// Long-term counters for one (student, skill) pair.
///
/// Accuracy and trend are derived on read and never stored on their own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillRecord {
    skill: SkillTag,
    attempts: u32,
    correct: u32,
    sessions: u32,
    /// Newest last, capped at two trend windows.
    recent: Vec<SessionTally>,
    updated_at: DateTime<Utc>,
}

impl SkillRecord {
    #[must_use]
    pub fn new(skill: SkillTag, at: DateTime<Utc>) -> Self {
        Self {
            skill,
            attempts: 0,
            correct: 0,
            sessions: 0,
            recent: Vec::new(),
            updated_at: at,
        }
    }

    /// Fold one session's tally into the record.
    pub fn record_session(&mut self, tally: SessionTally, at: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(tally.attempts);
        self.correct = self
            .correct
            .saturating_add(tally.correct)
            .min(self.attempts);
        self.sessions = self.sessions.saturating_add(1);
        self.recent.push(tally);
        let cap = TREND_WINDOW * 2;
        if self.recent.len() > cap {
            let excess = self.recent.len() - cap;
            self.recent.drain(..excess);
        }
        self.updated_at = at;
    }

    #[must_use]
    pub fn skill(&self) -> &SkillTag {
        &self.skill
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn sessions(&self) -> u32 {
        self.sessions
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn recent(&self) -> &[SessionTally] {
        &self.recent
    }

    /// `correct / attempts`, or `0.0` before the first attempt.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(u64::from(self.correct), u64::from(self.attempts))
    }

    /// Compare the last `TREND_WINDOW` sessions with the ones before.
    ///
    /// Stable until the skill has been practiced in two full windows.
    #[must_use]
    pub fn trend(&self) -> Trend {
        if self.recent.len() < TREND_WINDOW * 2 {
            return Trend::Stable;
        }
        let split = self.recent.len() - TREND_WINDOW;
        let latest = window_accuracy(&self.recent[split..]);
        let prior = window_accuracy(&self.recent[split - TREND_WINDOW..split]);
        let delta_points = (latest - prior) * 100.0;
        if delta_points > TREND_THRESHOLD_POINTS {
            Trend::Improving
        } else if delta_points < -TREND_THRESHOLD_POINTS {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }

    /// Flattened read model with the derived fields filled in.
    #[must_use]
    pub fn snapshot(&self) -> SkillSnapshot {
        SkillSnapshot {
            skill: self.skill.clone(),
            attempts: self.attempts,
            correct: self.correct,
            accuracy: self.accuracy(),
            trend: self.trend(),
            sessions: self.sessions,
        }
    }
}

/// Point-in-time view of a `SkillRecord`, handed to agents and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSnapshot {
    pub skill: SkillTag,
    pub attempts: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub trend: Trend,
    pub sessions: u32,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
