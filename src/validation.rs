//! Boundary validation for HTTP payloads and database rows.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{
    CreateFlashcardRequest, FlashcardFilter, FlashcardProgress, ReviewRequest, StudyQueueRequest,
    UpdateFlashcardRequest, UpdateProgressRequest,
};
use crate::sm2_scheduler::{Quality, SchedulerError, Sm2Scheduler};
use crate::log_validation;

pub const MAX_FRONT_LEN: usize = 500;
pub const MAX_BACK_LEN: usize = 1000;
pub const MAX_EXAMPLE_LEN: usize = 500;
pub const MAX_TAG_LEN: usize = 50;
pub const MAX_NOTE_LEN: usize = 500;
pub const MAX_SEARCH_LEN: usize = 200;
pub const MAX_NEW_CARDS_LIMIT: i64 = 50;
pub const MAX_REVIEW_CARDS_LIMIT: i64 = 200;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid URL pattern"));

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Rejection of a review submission: either the rating itself or another
/// payload field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReviewInputError {
    #[error(transparent)]
    Quality(#[from] SchedulerError),

    #[error(transparent)]
    Field(#[from] ValidationError),
}

fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min {
        return Err(ValidationError::new(field, "is required"));
    }
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("cannot exceed {} characters", max),
        ));
    }
    Ok(())
}

fn check_url(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(url) if !URL_PATTERN.is_match(url) => {
            Err(ValidationError::new(field, "must be a valid http(s) URL"))
        }
        _ => Ok(()),
    }
}

fn check_chapter(chapter_id: i64) -> Result<(), ValidationError> {
    if chapter_id <= 0 {
        return Err(ValidationError::new("chapter_id", "must be a positive id"));
    }
    Ok(())
}

fn check_difficulty(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(difficulty) if !(0.0..=1.0).contains(&difficulty) => {
            Err(ValidationError::new(field, "must be between 0 and 1"))
        }
        _ => Ok(()),
    }
}

fn check_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> Result<(), ValidationError> {
    for tag in tags {
        check_length("tags", tag, 0, MAX_TAG_LEN)?;
    }
    Ok(())
}

pub fn validate_create_flashcard(request: &CreateFlashcardRequest) -> Result<(), ValidationError> {
    check_chapter(request.chapter_id)?;
    check_length("front", request.front.trim(), 1, MAX_FRONT_LEN)?;
    check_length("back", request.back.trim(), 1, MAX_BACK_LEN)?;
    if let Some(example) = &request.example {
        check_length("example", example, 0, MAX_EXAMPLE_LEN)?;
    }
    check_url("image_url", request.image_url.as_deref())?;
    check_url("audio_url", request.audio_url.as_deref())?;
    check_tags(&request.tags)?;
    check_difficulty("difficulty", request.difficulty)?;

    log_validation!(success, "create_flashcard", "flashcard payload accepted");
    Ok(())
}

/// Same limits as creation, applied only to the fields present.
pub fn validate_update_flashcard(request: &UpdateFlashcardRequest) -> Result<(), ValidationError> {
    if let Some(chapter_id) = request.chapter_id {
        check_chapter(chapter_id)?;
    }
    if let Some(front) = &request.front {
        check_length("front", front.trim(), 1, MAX_FRONT_LEN)?;
    }
    if let Some(back) = &request.back {
        check_length("back", back.trim(), 1, MAX_BACK_LEN)?;
    }
    if let Some(example) = &request.example {
        check_length("example", example, 0, MAX_EXAMPLE_LEN)?;
    }
    check_url("image_url", request.image_url.as_deref())?;
    check_url("audio_url", request.audio_url.as_deref())?;
    check_tags(request.tags.iter().flatten())?;
    check_difficulty("difficulty", request.difficulty)?;

    log_validation!(success, "update_flashcard", "flashcard patch accepted");
    Ok(())
}

pub fn validate_flashcard_filter(filter: &FlashcardFilter) -> Result<(), ValidationError> {
    if let Some(chapter_id) = filter.chapter_id {
        check_chapter(chapter_id)?;
    }
    check_difficulty("min_difficulty", filter.min_difficulty)?;
    check_difficulty("max_difficulty", filter.max_difficulty)?;
    if let (Some(min), Some(max)) = (filter.min_difficulty, filter.max_difficulty) {
        if min > max {
            return Err(ValidationError::new(
                "min_difficulty",
                format!("{} is above max_difficulty {}", min, max),
            ));
        }
    }
    if let Some(search) = &filter.search {
        check_length("search", search, 0, MAX_SEARCH_LEN)?;
    }
    check_tags(&filter.tag_list())?;
    Ok(())
}

/// Validates a review submission and returns the parsed quality.
pub fn validate_review(request: &ReviewRequest) -> Result<Quality, ReviewInputError> {
    let quality = Quality::new(request.quality)?;
    if request.response_time_ms < 0 {
        return Err(ValidationError::new(
            "response_time_ms",
            format!("{}ms cannot be negative", request.response_time_ms),
        )
        .into());
    }
    Ok(quality)
}

pub fn validate_update_progress(request: &UpdateProgressRequest) -> Result<(), ValidationError> {
    if let Some(note) = &request.note {
        check_length("note", note, 0, MAX_NOTE_LEN)?;
    }
    Ok(())
}

pub fn validate_study_queue(request: &StudyQueueRequest) -> Result<(), ValidationError> {
    if let Some(max_new) = request.max_new_cards {
        if !(0..=MAX_NEW_CARDS_LIMIT).contains(&max_new) {
            return Err(ValidationError::new(
                "max_new_cards",
                format!("must be between 0 and {}", MAX_NEW_CARDS_LIMIT),
            ));
        }
    }
    if let Some(max_review) = request.max_review_cards {
        if !(0..=MAX_REVIEW_CARDS_LIMIT).contains(&max_review) {
            return Err(ValidationError::new(
                "max_review_cards",
                format!("must be between 0 and {}", MAX_REVIEW_CARDS_LIMIT),
            ));
        }
    }
    Ok(())
}

/// Re-checks the scheduling invariants on a stored record before it is fed
/// back into the scheduler.
pub fn validate_progress_row(
    scheduler: &Sm2Scheduler,
    progress: &FlashcardProgress,
) -> Result<(), SchedulerError> {
    scheduler.validate_state(&progress.review_state()).map_err(|e| {
        log_validation!(failure, "progress_row", error = e);
        e
    })?;

    let bucket_total =
        progress.again_count + progress.hard_count + progress.good_count + progress.easy_count;
    if progress.total_reviews < 0
        || progress.correct_reviews < 0
        || progress.correct_reviews > progress.total_reviews
        || bucket_total != progress.total_reviews
    {
        let error = SchedulerError::InvalidState(format!(
            "review counters are inconsistent for flashcard {}",
            progress.flashcard_id
        ));
        log_validation!(failure, "progress_row", error = error);
        return Err(error);
    }
    Ok(())
}
