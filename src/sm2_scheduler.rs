//! SM-2 spaced repetition scheduling.
//!
//! Quality ratings (0-5) are bucketed as again (0-2), hard (3), good (4) and
//! easy (5). A rating below 3 is a lapse: the card re-enters learning with a
//! one day interval and its ease factor drops. A rating of 3 or more grows the
//! interval 1 day, 6 days, then `interval * ease_factor`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid quality {0}: must be between 0 and 5")]
    InvalidQuality(i32),

    #[error("Invalid review state: {0}")]
    InvalidState(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityBucket {
    Again,
    Hard,
    Good,
    Easy,
}

impl QualityBucket {
    /// Quality used when previewing what a bucket would schedule.
    pub fn representative_quality(self) -> Quality {
        match self {
            QualityBucket::Again => Quality(1),
            QualityBucket::Hard => Quality(3),
            QualityBucket::Good => Quality(4),
            QualityBucket::Easy => Quality(5),
        }
    }
}

/// A validated recall quality in `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Quality(u8);

impl Quality {
    pub const MAX: i32 = 5;
    const PASS_THRESHOLD: u8 = 3;

    pub fn new(value: i32) -> Result<Self, SchedulerError> {
        if (0..=Self::MAX).contains(&value) {
            Ok(Quality(value as u8))
        } else {
            Err(SchedulerError::InvalidQuality(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_correct(self) -> bool {
        self.0 >= Self::PASS_THRESHOLD
    }

    pub fn bucket(self) -> QualityBucket {
        match self.0 {
            0..=2 => QualityBucket::Again,
            3 => QualityBucket::Hard,
            4 => QualityBucket::Good,
            _ => QualityBucket::Easy,
        }
    }
}

impl TryFrom<i32> for Quality {
    type Error = SchedulerError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Quality::new(value)
    }
}

/// The scheduling columns of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub ease_factor: f64,
    pub interval: i32,
    pub repetitions: i32,
}

impl Default for ReviewState {
    fn default() -> Self {
        Sm2Parameters::default().initial_state()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub ease_factor: f64,
    pub interval: i32,
    pub repetitions: i32,
    pub next_review_date: DateTime<Utc>,
}

impl ScheduleOutcome {
    pub fn state(&self) -> ReviewState {
        ReviewState {
            ease_factor: self.ease_factor,
            interval: self.interval,
            repetitions: self.repetitions,
        }
    }
}

/// Interval in days each bucket would schedule from a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalPreview {
    pub again: i32,
    pub hard: i32,
    pub good: i32,
    pub easy: i32,
}

/// SM-2 constants. The defaults are the textbook SM-2 values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sm2Parameters {
    pub initial_ease_factor: f64,
    pub minimum_ease_factor: f64,
    pub lapse_penalty: f64,
    pub first_interval: i32,
    pub second_interval: i32,
    pub max_interval_days: i32,
}

impl Default for Sm2Parameters {
    fn default() -> Self {
        Self {
            initial_ease_factor: 2.5,
            minimum_ease_factor: 1.3,
            lapse_penalty: 0.2,
            first_interval: 1,
            second_interval: 6,
            max_interval_days: 36_500,
        }
    }
}

impl Sm2Parameters {
    pub fn initial_state(&self) -> ReviewState {
        ReviewState {
            ease_factor: self.initial_ease_factor,
            interval: self.first_interval,
            repetitions: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sm2Scheduler {
    params: Sm2Parameters,
}

impl Sm2Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(params: Sm2Parameters) -> Self {
        Self { params }
    }

    pub fn initial_state(&self) -> ReviewState {
        self.params.initial_state()
    }

    /// Rejects states that violate the scheduling invariants instead of
    /// repairing them.
    pub fn validate_state(&self, state: &ReviewState) -> Result<(), SchedulerError> {
        if !state.ease_factor.is_finite() || state.ease_factor < self.params.minimum_ease_factor {
            return Err(SchedulerError::InvalidState(format!(
                "ease factor {} is below the minimum of {}",
                state.ease_factor, self.params.minimum_ease_factor
            )));
        }
        if state.interval < 1 {
            return Err(SchedulerError::InvalidState(format!(
                "interval {} must be at least 1 day",
                state.interval
            )));
        }
        if state.repetitions < 0 {
            return Err(SchedulerError::InvalidState(format!(
                "repetitions {} cannot be negative",
                state.repetitions
            )));
        }
        Ok(())
    }

    pub fn schedule(
        &self,
        state: &ReviewState,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        self.validate_state(state)?;

        let (ease_factor, interval, repetitions) = if quality.is_correct() {
            let ease_factor = self.passed_ease_factor(state.ease_factor, quality);
            let interval = match state.repetitions {
                0 => self.params.first_interval,
                1 => self.params.second_interval,
                _ => self.grown_interval(state.interval, ease_factor),
            };
            (ease_factor, interval, state.repetitions.saturating_add(1))
        } else {
            let ease_factor = self.clamp_ease(state.ease_factor - self.params.lapse_penalty);
            (ease_factor, self.params.first_interval, 0)
        };

        let next_review_date = now
            .checked_add_signed(Duration::days(interval as i64))
            .ok_or_else(|| {
                SchedulerError::InvalidState(format!(
                    "next review date overflows {} days after {}",
                    interval, now
                ))
            })?;

        Ok(ScheduleOutcome {
            ease_factor,
            interval,
            repetitions,
            next_review_date,
        })
    }

    pub fn preview_intervals(
        &self,
        state: &ReviewState,
        now: DateTime<Utc>,
    ) -> Result<IntervalPreview, SchedulerError> {
        let interval_for = |bucket: QualityBucket| -> Result<i32, SchedulerError> {
            Ok(self.schedule(state, bucket.representative_quality(), now)?.interval)
        };

        Ok(IntervalPreview {
            again: interval_for(QualityBucket::Again)?,
            hard: interval_for(QualityBucket::Hard)?,
            good: interval_for(QualityBucket::Good)?,
            easy: interval_for(QualityBucket::Easy)?,
        })
    }

    // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
    fn passed_ease_factor(&self, ease_factor: f64, quality: Quality) -> f64 {
        let distance = (Quality::MAX - quality.value() as i32) as f64;
        self.clamp_ease(ease_factor + (0.1 - distance * (0.08 + distance * 0.02)))
    }

    fn clamp_ease(&self, ease_factor: f64) -> f64 {
        ease_factor.max(self.params.minimum_ease_factor)
    }

    fn grown_interval(&self, interval: i32, ease_factor: f64) -> i32 {
        let grown = (interval as f64 * ease_factor).round();
        (grown.min(self.params.max_interval_days as f64) as i32).max(1)
    }
}

/// Computes the next review state with the default SM-2 parameters.
pub fn schedule_review(
    quality: i32,
    ease_factor: f64,
    interval: i32,
    repetitions: i32,
    now: DateTime<Utc>,
) -> Result<ScheduleOutcome, SchedulerError> {
    let quality = Quality::new(quality)?;
    let state = ReviewState {
        ease_factor,
        interval,
        repetitions,
    };
    Sm2Scheduler::new().schedule(&state, quality, now)
}
