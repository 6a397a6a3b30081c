use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    api_error,
    errors::{ApiError, ErrorContext, ErrorResponse},
    models::*,
    review_service::ReviewService,
    sm2_scheduler::{schedule_review, ScheduleOutcome},
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub review_service: ReviewService,
}

#[derive(Serialize)]
pub struct UnburyResult {
    pub restored: u64,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

// Scheduling endpoint
pub async fn schedule(Json(request): Json<ScheduleRequest>) -> ApiResult<ScheduleOutcome> {
    log_api_start!("schedule");

    let now = request.now.unwrap_or_else(Utc::now);
    match schedule_review(
        request.quality,
        request.ease_factor,
        request.interval,
        request.repetitions,
        now,
    ) {
        Ok(outcome) => {
            log_api_success!("schedule", format!("next interval {} days", outcome.interval));
            Ok(Json(ApiResponse::success(outcome)))
        }
        Err(e) => Err(ApiError::from(e)
            .to_response_with_context(ErrorContext::new("schedule", "review state"))),
    }
}

// Flashcard endpoints
pub async fn create_flashcard(
    State(state): State<AppState>,
    Json(request): Json<CreateFlashcardRequest>,
) -> ApiResult<Flashcard> {
    log_api_start!("create_flashcard");

    match state.review_service.create_flashcard(request).await {
        Ok(flashcard) => {
            log_api_success!("create_flashcard", flashcard_id = flashcard.id, "flashcard created");
            Ok(Json(ApiResponse::success(flashcard)))
        }
        Err(e) => Err(api_error!(classify, "create_flashcard", "flashcard", "new", e)),
    }
}

pub async fn list_flashcards(
    State(state): State<AppState>,
    Query(filter): Query<FlashcardFilter>,
) -> ApiResult<Vec<Flashcard>> {
    log_api_start!("list_flashcards");

    match state.review_service.list_flashcards(&filter).await {
        Ok(flashcards) => {
            log_api_success!("list_flashcards", count = flashcards.len(), "flashcards listed");
            Ok(Json(ApiResponse::success(flashcards)))
        }
        Err(e) => Err(api_error!(classify, "list_flashcards", "flashcard", "filter", e)),
    }
}

pub async fn get_flashcard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Flashcard> {
    log_api_start!("get_flashcard", flashcard_id = id);

    match state.review_service.get_flashcard(id).await {
        Ok(Some(flashcard)) => Ok(Json(ApiResponse::success(flashcard))),
        Ok(None) => {
            log_api_warn!("get_flashcard", flashcard_id = id, "flashcard not found");
            Err(api_error!(not_found, "get_flashcard", "flashcard", &id.to_string()))
        }
        Err(e) => Err(api_error!(classify, "get_flashcard", "flashcard", &id.to_string(), e)),
    }
}

pub async fn update_flashcard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateFlashcardRequest>,
) -> ApiResult<Flashcard> {
    log_api_start!("update_flashcard", flashcard_id = id);

    match state.review_service.update_flashcard(id, request).await {
        Ok(Some(flashcard)) => {
            log_api_success!("update_flashcard", flashcard_id = id, "flashcard updated");
            Ok(Json(ApiResponse::success(flashcard)))
        }
        Ok(None) => Err(api_error!(not_found, "update_flashcard", "flashcard", &id.to_string())),
        Err(e) => Err(api_error!(classify, "update_flashcard", "flashcard", &id.to_string(), e)),
    }
}

pub async fn delete_flashcard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    log_api_start!("delete_flashcard", flashcard_id = id);

    match state.review_service.delete_flashcard(id).await {
        Ok(true) => {
            log_api_success!("delete_flashcard", flashcard_id = id, "flashcard deleted");
            Ok(Json(ApiResponse::success(true)))
        }
        Ok(false) => Err(api_error!(not_found, "delete_flashcard", "flashcard", &id.to_string())),
        Err(e) => Err(api_error!(classify, "delete_flashcard", "flashcard", &id.to_string(), e)),
    }
}

// Per-user endpoints
pub async fn get_study_queue(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(request): Query<StudyQueueRequest>,
) -> ApiResult<StudyQueue> {
    log_api_start!("get_study_queue", user_id = user_id);

    match state.review_service.get_study_queue(&user_id, request).await {
        Ok(queue) => {
            log_api_success!(
                "get_study_queue",
                count = queue.reviews.len() + queue.new_cards.len(),
                "study queue built"
            );
            Ok(Json(ApiResponse::success(queue)))
        }
        Err(e) => Err(api_error!(classify, "get_study_queue", "study queue", &user_id, e)),
    }
}

pub async fn get_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<ReviewStats> {
    log_api_start!("get_stats", user_id = user_id);

    match state.review_service.get_stats(&user_id).await {
        Ok(stats) => Ok(Json(ApiResponse::success(stats))),
        Err(e) => {
            log_api_error!("get_stats", user_id = user_id, error = e, "database error computing stats");
            Err(ApiError::DatabaseError(e).to_response_with_context(
                ErrorContext::new("get_stats", "review stats").with_id(&user_id),
            ))
        }
    }
}

pub async fn unbury_all(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<UnburyResult> {
    log_api_start!("unbury_all", user_id = user_id);

    match state.review_service.unbury_all(&user_id).await {
        Ok(restored) => Ok(Json(ApiResponse::success(UnburyResult { restored }))),
        Err(e) => Err(api_error!(classify, "unbury_all", "progress", &user_id, e)),
    }
}

pub async fn get_progress(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, Uuid)>,
) -> ApiResult<FlashcardProgress> {
    log_api_start!("get_progress", user_id = user_id, flashcard_id = id);

    match state.review_service.get_progress(&user_id, id).await {
        Ok(Some(progress)) => Ok(Json(ApiResponse::success(progress))),
        Ok(None) => Err(api_error!(not_found, "get_progress", "progress", &id.to_string())),
        Err(e) => Err(api_error!(classify, "get_progress", "progress", &id.to_string(), e)),
    }
}

pub async fn update_progress(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, Uuid)>,
    Json(request): Json<UpdateProgressRequest>,
) -> ApiResult<FlashcardProgress> {
    log_api_start!("update_progress", user_id = user_id, flashcard_id = id);

    match state.review_service.update_progress(&user_id, id, request).await {
        Ok(Some(progress)) => {
            log_api_success!("update_progress", user_id = user_id, flashcard_id = id, "progress updated");
            Ok(Json(ApiResponse::success(progress)))
        }
        Ok(None) => Err(api_error!(not_found, "update_progress", "progress", &id.to_string())),
        Err(e) => Err(api_error!(classify, "update_progress", "progress", &id.to_string(), e)),
    }
}

pub async fn submit_review(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, Uuid)>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<ReviewResult> {
    log_api_start!("submit_review", user_id = user_id, flashcard_id = id);

    match state.review_service.submit_review(&user_id, id, request).await {
        Ok(Some(result)) => {
            log_api_success!(
                "submit_review",
                user_id = user_id,
                flashcard_id = id,
                format!("next review in {} days", result.progress.interval)
            );
            Ok(Json(ApiResponse::success(result)))
        }
        Ok(None) => {
            log_api_warn!("submit_review", flashcard_id = id, "flashcard missing or inactive");
            Err(ApiError::NotFound(format!("flashcard {}", id)).to_response_with_context(
                ErrorContext::new("submit_review", "flashcard")
                    .with_id(&id.to_string())
                    .with_user_message("Flashcard not found or inactive"),
            ))
        }
        Err(e) => Err(api_error!(classify, "submit_review", "flashcard", &id.to_string(), e)),
    }
}

pub async fn preview(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, Uuid)>,
) -> ApiResult<PreviewResponse> {
    log_api_start!("preview", user_id = user_id, flashcard_id = id);

    match state.review_service.preview(&user_id, id).await {
        Ok(Some(preview)) => Ok(Json(ApiResponse::success(preview))),
        Ok(None) => Err(api_error!(not_found, "preview", "flashcard", &id.to_string())),
        Err(e) => Err(api_error!(classify, "preview", "flashcard", &id.to_string(), e)),
    }
}

pub async fn list_responses(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, Uuid)>,
) -> ApiResult<Vec<FlashcardResponse>> {
    log_api_start!("list_responses", user_id = user_id, flashcard_id = id);

    match state.review_service.list_responses(&user_id, id).await {
        Ok(responses) => Ok(Json(ApiResponse::success(responses))),
        Err(e) => Err(api_error!(classify, "list_responses", "response", &id.to_string(), e)),
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/schedule", post(schedule))
        // Flashcard routes
        .route("/api/flashcards", post(create_flashcard).get(list_flashcards))
        .route(
            "/api/flashcards/:id",
            get(get_flashcard)
                .patch(update_flashcard)
                .delete(delete_flashcard),
        )
        // Learner routes
        .route("/api/users/:user_id/queue", get(get_study_queue))
        .route("/api/users/:user_id/stats", get(get_stats))
        .route("/api/users/:user_id/unbury", post(unbury_all))
        .route(
            "/api/users/:user_id/flashcards/:id/progress",
            get(get_progress).patch(update_progress),
        )
        .route("/api/users/:user_id/flashcards/:id/review", post(submit_review))
        .route("/api/users/:user_id/flashcards/:id/preview", get(preview))
        .route("/api/users/:user_id/flashcards/:id/responses", get(list_responses))
        .with_state(state)
}
