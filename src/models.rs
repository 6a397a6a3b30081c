use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sm2_scheduler::{IntervalPreview, ReviewState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub chapter_id: i64,
    pub front: String,
    pub back: String,
    pub example: Option<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub tags: Vec<String>, // stored as a JSON array
    pub difficulty: f64, // 0-1
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Spaced repetition state of one flashcard for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardProgress {
    pub user_id: String,
    pub flashcard_id: Uuid,

    pub ease_factor: f64,
    pub interval: i32,
    pub repetitions: i32,

    pub next_review_date: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,

    pub total_reviews: i32,
    pub correct_reviews: i32,
    pub average_response_time_ms: Option<i64>,

    pub again_count: i32, // quality 0-2
    pub hard_count: i32,  // quality 3
    pub good_count: i32,  // quality 4
    pub easy_count: i32,  // quality 5

    pub is_suspended: bool,
    pub is_buried: bool,
    pub note: Option<String>,

    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlashcardProgress {
    pub fn review_state(&self) -> ReviewState {
        ReviewState {
            ease_factor: self.ease_factor,
            interval: self.interval,
            repetitions: self.repetitions,
        }
    }
}

/// One logged review with the state before and after scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardResponse {
    pub id: Uuid,
    pub user_id: String,
    pub flashcard_id: Uuid,
    pub quality: i32, // 0-5
    pub response_time_ms: i64,
    pub previous_interval: i32,
    pub previous_ease_factor: f64,
    pub previous_repetitions: i32,
    pub new_interval: i32,
    pub new_ease_factor: f64,
    pub new_repetitions: i32,
    pub next_review_date: DateTime<Utc>,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFlashcardRequest {
    pub chapter_id: i64,
    pub front: String,
    pub back: String,
    pub example: Option<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub difficulty: Option<f64>,
    pub is_active: Option<bool>,
}

/// Partial flashcard edit. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFlashcardRequest {
    pub chapter_id: Option<i64>,
    pub front: Option<String>,
    pub back: Option<String>,
    pub example: Option<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub difficulty: Option<f64>,
    pub is_active: Option<bool>,
}

/// Listing filters; every present field must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashcardFilter {
    pub chapter_id: Option<i64>,
    /// Comma-separated; a card matches when it carries any of them.
    pub tags: Option<String>,
    pub min_difficulty: Option<f64>,
    pub max_difficulty: Option<f64>,
    /// Case-insensitive substring of front, back or example.
    pub search: Option<String>,
    pub has_image: Option<bool>,
    pub has_audio: Option<bool>,
}

impl FlashcardFilter {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub quality: i32,
    #[serde(default)]
    pub response_time_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProgressRequest {
    pub is_suspended: Option<bool>,
    pub is_buried: Option<bool>,
    pub note: Option<String>,
}

/// Input of the stateless scheduling endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub quality: i32,
    pub ease_factor: f64,
    pub interval: i32,
    pub repetitions: i32,
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyQueueRequest {
    pub chapter_id: Option<i64>,
    pub max_new_cards: Option<i64>,
    pub max_review_cards: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueCard {
    pub flashcard: Flashcard,
    pub progress: FlashcardProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyQueue {
    pub reviews: Vec<DueCard>,
    pub new_cards: Vec<Flashcard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub progress: FlashcardProgress,
    pub response: FlashcardResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub flashcard_id: Uuid,
    pub current: ReviewState,
    pub intervals: IntervalPreview,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityDistribution {
    pub again: i64,
    pub hard: i64,
    pub good: i64,
    pub easy: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total_cards: i64,
    pub total_reviews: i64,
    pub correct_reviews: i64,
    pub retention_rate: Option<f64>, // percentage
    pub average_response_time_ms: Option<i64>,
    pub quality_distribution: QualityDistribution,
    pub due_now: i64,
    pub suspended: i64,
}
