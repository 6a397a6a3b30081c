use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use std::time::Instant;
use uuid::Uuid;

use crate::database::Database;
use crate::models::*;
use crate::sm2_scheduler::{Quality, QualityBucket, ScheduleOutcome, Sm2Scheduler};
use crate::validation::{
    validate_create_flashcard, validate_flashcard_filter, validate_progress_row, validate_review,
    validate_study_queue, validate_update_flashcard, validate_update_progress,
};
use crate::{log_service_error, log_service_start, log_service_success, log_service_warn};

const SERVICE: &str = "review_service";

/// Attempts at the compare-and-swap write before a review gives up.
pub const MAX_REVIEW_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReviewError {
    #[error("Flashcard {flashcard_id} is suspended and cannot be reviewed")]
    Suspended { flashcard_id: Uuid },

    #[error("Review of flashcard {flashcard_id} lost {attempts} concurrent update races")]
    Conflict { flashcard_id: Uuid, attempts: u32 },
}

/// Default study queue sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyLimits {
    pub max_new_cards: i64,
    pub max_review_cards: i64,
}

impl Default for StudyLimits {
    fn default() -> Self {
        Self {
            max_new_cards: 10,
            max_review_cards: 100,
        }
    }
}

#[derive(Clone)]
pub struct ReviewService {
    db: Database,
    scheduler: Sm2Scheduler,
    limits: StudyLimits,
}

impl ReviewService {
    pub fn new(db: Database) -> Self {
        Self::with_limits(db, StudyLimits::default())
    }

    pub fn with_limits(db: Database, limits: StudyLimits) -> Self {
        Self {
            db,
            scheduler: Sm2Scheduler::new(),
            limits,
        }
    }

    // Flashcard operations
    pub async fn create_flashcard(&self, request: CreateFlashcardRequest) -> Result<Flashcard> {
        validate_create_flashcard(&request)?;
        self.db.create_flashcard(&request).await
    }

    pub async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>> {
        self.db.get_flashcard(id).await
    }

    pub async fn update_flashcard(
        &self,
        id: Uuid,
        request: UpdateFlashcardRequest,
    ) -> Result<Option<Flashcard>> {
        validate_update_flashcard(&request)?;
        self.db.update_flashcard(id, &request).await
    }

    pub async fn list_flashcards(&self, filter: &FlashcardFilter) -> Result<Vec<Flashcard>> {
        validate_flashcard_filter(filter)?;
        self.db.list_flashcards(filter).await
    }

    /// Deleting a flashcard cascades to every user's progress and review log.
    pub async fn delete_flashcard(&self, id: Uuid) -> Result<bool> {
        self.db.delete_flashcard(id).await
    }

    // Progress operations
    pub async fn get_progress(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
    ) -> Result<Option<FlashcardProgress>> {
        self.db.get_progress(user_id, flashcard_id).await
    }

    pub async fn update_progress(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
        request: UpdateProgressRequest,
    ) -> Result<Option<FlashcardProgress>> {
        validate_update_progress(&request)?;
        let now = Utc::now().trunc_subsecs(6);
        self.db
            .update_progress_flags(user_id, flashcard_id, &request, now)
            .await
    }

    pub async fn unbury_all(&self, user_id: &str) -> Result<u64> {
        let restored = self.db.unbury_all(user_id, Utc::now().trunc_subsecs(6)).await?;
        log_service_success!(SERVICE, "unbury_all", format!("{} cards restored", restored));
        Ok(restored)
    }

    pub async fn list_responses(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
    ) -> Result<Vec<FlashcardResponse>> {
        self.db.list_responses(user_id, flashcard_id).await
    }

    // Review operations
    pub async fn submit_review(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
        request: ReviewRequest,
    ) -> Result<Option<ReviewResult>> {
        self.submit_review_at(user_id, flashcard_id, request, Utc::now())
            .await
    }

    /// Returns `Ok(None)` when the flashcard does not exist or is inactive.
    pub async fn submit_review_at(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
        request: ReviewRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<ReviewResult>> {
        let started = Instant::now();
        log_service_start!(SERVICE, "submit_review", user_id = user_id, flashcard_id = flashcard_id);

        let quality = validate_review(&request)?;
        let now = now.trunc_subsecs(6);

        match self.db.get_flashcard(flashcard_id).await? {
            Some(flashcard) if flashcard.is_active => {}
            _ => return Ok(None),
        }

        for attempt in 1..=MAX_REVIEW_ATTEMPTS {
            let current = self
                .db
                .ensure_progress(user_id, flashcard_id, &self.scheduler.initial_state(), now)
                .await?;

            if current.is_suspended {
                return Err(ReviewError::Suspended { flashcard_id }.into());
            }
            validate_progress_row(&self.scheduler, &current)?;

            let outcome = self.scheduler.schedule(&current.review_state(), quality, now)?;
            let updated = apply_outcome(&current, quality, &outcome, request.response_time_ms, now);
            let response = FlashcardResponse {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                flashcard_id,
                quality: quality.value() as i32,
                response_time_ms: request.response_time_ms,
                previous_interval: current.interval,
                previous_ease_factor: current.ease_factor,
                previous_repetitions: current.repetitions,
                new_interval: outcome.interval,
                new_ease_factor: updated.ease_factor,
                new_repetitions: outcome.repetitions,
                next_review_date: outcome.next_review_date,
                responded_at: now,
            };

            if self.db.apply_review(&updated, current.version, &response).await? {
                log_service_success!(
                    SERVICE,
                    "submit_review",
                    flashcard_id = flashcard_id,
                    duration_ms = started.elapsed().as_millis() as u64
                );
                return Ok(Some(ReviewResult {
                    progress: updated,
                    response,
                }));
            }

            log_service_warn!(
                SERVICE,
                "submit_review",
                format!("lost update race on attempt {}", attempt)
            );
            tokio::task::yield_now().await;
        }

        let error = ReviewError::Conflict {
            flashcard_id,
            attempts: MAX_REVIEW_ATTEMPTS,
        };
        log_service_error!(SERVICE, "submit_review", flashcard_id = flashcard_id, error = error);
        Err(error.into())
    }

    /// Intervals each rating would schedule; unseen cards preview from the
    /// initial state.
    pub async fn preview(&self, user_id: &str, flashcard_id: Uuid) -> Result<Option<PreviewResponse>> {
        if self.db.get_flashcard(flashcard_id).await?.is_none() {
            return Ok(None);
        }

        let current = match self.db.get_progress(user_id, flashcard_id).await? {
            Some(progress) => progress.review_state(),
            None => self.scheduler.initial_state(),
        };
        let intervals = self.scheduler.preview_intervals(&current, Utc::now())?;

        Ok(Some(PreviewResponse {
            flashcard_id,
            current,
            intervals,
        }))
    }

    // Study queue and statistics
    pub async fn get_study_queue(&self, user_id: &str, request: StudyQueueRequest) -> Result<StudyQueue> {
        self.get_study_queue_at(user_id, request, Utc::now()).await
    }

    pub async fn get_study_queue_at(
        &self,
        user_id: &str,
        request: StudyQueueRequest,
        now: DateTime<Utc>,
    ) -> Result<StudyQueue> {
        let started = Instant::now();
        log_service_start!(SERVICE, "get_study_queue", user_id = user_id);
        validate_study_queue(&request)?;

        let max_review_cards = request
            .max_review_cards
            .unwrap_or(self.limits.max_review_cards);
        let max_new_cards = request.max_new_cards.unwrap_or(self.limits.max_new_cards);

        let reviews = self
            .db
            .get_due_cards(user_id, now, request.chapter_id, max_review_cards)
            .await?;
        let new_cards = if max_new_cards > 0 {
            self.db
                .get_unseen_flashcards(user_id, request.chapter_id, max_new_cards)
                .await?
        } else {
            Vec::new()
        };

        log_service_success!(
            SERVICE,
            "get_study_queue",
            count = reviews.len() + new_cards.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(StudyQueue { reviews, new_cards })
    }

    pub async fn get_stats(&self, user_id: &str) -> Result<ReviewStats> {
        self.get_stats_at(user_id, Utc::now()).await
    }

    pub async fn get_stats_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReviewStats> {
        self.db.review_stats(user_id, now).await
    }
}

/// Folds a scheduling outcome and the review counters into a new record.
fn apply_outcome(
    current: &FlashcardProgress,
    quality: Quality,
    outcome: &ScheduleOutcome,
    response_time_ms: i64,
    now: DateTime<Utc>,
) -> FlashcardProgress {
    let mut updated = current.clone();

    updated.ease_factor = storage_ease(outcome.ease_factor);
    updated.interval = outcome.interval;
    updated.repetitions = outcome.repetitions;
    updated.next_review_date = outcome.next_review_date;
    updated.last_reviewed = Some(now);

    updated.average_response_time_ms = Some(running_average(
        current.average_response_time_ms,
        current.total_reviews,
        response_time_ms,
    ));
    updated.total_reviews += 1;
    if quality.is_correct() {
        updated.correct_reviews += 1;
    }
    match quality.bucket() {
        QualityBucket::Again => updated.again_count += 1,
        QualityBucket::Hard => updated.hard_count += 1,
        QualityBucket::Good => updated.good_count += 1,
        QualityBucket::Easy => updated.easy_count += 1,
    }

    updated.is_buried = false;
    updated.version = current.version + 1;
    updated.updated_at = now;
    updated
}

/// Progress rows keep the ease factor at two decimal places.
fn storage_ease(ease_factor: f64) -> f64 {
    (ease_factor * 100.0).round() / 100.0
}

fn running_average(previous: Option<i64>, previous_count: i32, sample: i64) -> i64 {
    match previous {
        Some(average) if previous_count > 0 => {
            let total = average as f64 * previous_count as f64 + sample as f64;
            (total / (previous_count as f64 + 1.0)).round() as i64
        }
        _ => sample,
    }
}
