use chrono::{Duration, TimeZone, Utc};
use flashcard_review::{
    review_service::MAX_REVIEW_ATTEMPTS, CreateFlashcardRequest, Database, Flashcard,
    FlashcardResponse, ReviewError, ReviewRequest, ReviewService, ReviewState, StudyLimits,
    StudyQueueRequest, UpdateProgressRequest,
};
use uuid::Uuid;

async fn create_test_service() -> ReviewService {
    let db = Database::new("sqlite::memory:").await.unwrap();
    ReviewService::new(db)
}

fn card_request(chapter_id: i64, front: &str) -> CreateFlashcardRequest {
    CreateFlashcardRequest {
        chapter_id,
        front: front.to_string(),
        back: format!("Back of {}", front),
        example: None,
        image_url: None,
        audio_url: None,
        tags: vec![],
        difficulty: None,
        is_active: None,
    }
}

async fn create_card(service: &ReviewService, chapter_id: i64, front: &str) -> Flashcard {
    service
        .create_flashcard(card_request(chapter_id, front))
        .await
        .unwrap()
}

fn review(quality: i32, response_time_ms: i64) -> ReviewRequest {
    ReviewRequest {
        quality,
        response_time_ms,
    }
}

#[tokio::test]
async fn test_flashcard_creation_and_retrieval() {
    let service = create_test_service().await;

    let mut request = card_request(4, "Allele");
    request.tags = vec!["genetics".to_string()];
    request.difficulty = Some(0.8);
    let created = service.create_flashcard(request).await.unwrap();

    let fetched = service.get_flashcard(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.front, "Allele");
    assert_eq!(fetched.tags, vec!["genetics".to_string()]);
    assert_eq!(fetched.difficulty, 0.8);
    assert_eq!(fetched.created_at, created.created_at);
}

#[tokio::test]
async fn test_review_sequence_follows_sm2() {
    let service = create_test_service().await;
    let card = create_card(&service, 1, "Genotype").await;
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

    let first = service
        .submit_review_at("learner", card.id, review(4, 1000), start)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.progress.repetitions, 1);
    assert_eq!(first.progress.interval, 1);
    assert_eq!(first.progress.next_review_date, start + Duration::days(1));

    let second = service
        .submit_review_at("learner", card.id, review(4, 3000), start + Duration::days(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.progress.repetitions, 2);
    assert_eq!(second.progress.interval, 6);
    assert_eq!(second.progress.average_response_time_ms, Some(2000));

    let third = service
        .submit_review_at("learner", card.id, review(5, 2000), start + Duration::days(7))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third.progress.ease_factor, 2.6);
    assert_eq!(third.progress.interval, 16);
    assert_eq!(third.progress.repetitions, 3);

    let stored = service.get_progress("learner", card.id).await.unwrap().unwrap();
    assert_eq!(stored.total_reviews, 3);
    assert_eq!(stored.correct_reviews, 3);
    assert_eq!(stored.good_count, 2);
    assert_eq!(stored.easy_count, 1);
    assert_eq!(stored.version, 3);
    assert_eq!(stored.last_reviewed, Some(start + Duration::days(7)));
}

#[tokio::test]
async fn test_lapse_resets_progress() {
    let service = create_test_service().await;
    let card = create_card(&service, 1, "Phenotype").await;
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

    for day in 0..3 {
        service
            .submit_review_at("learner", card.id, review(5, 800), now + Duration::days(day))
            .await
            .unwrap()
            .unwrap();
    }

    let lapse = service
        .submit_review_at("learner", card.id, review(1, 4000), now + Duration::days(30))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(lapse.response.previous_repetitions, 3);
    assert_eq!(lapse.progress.repetitions, 0);
    assert_eq!(lapse.progress.interval, 1);
    assert_eq!(lapse.progress.ease_factor, 2.6);
    assert_eq!(lapse.progress.again_count, 1);
    assert_eq!(
        lapse.progress.total_reviews,
        lapse.progress.correct_reviews + lapse.progress.again_count
    );
}

#[tokio::test]
async fn test_review_of_missing_or_inactive_card() {
    let service = create_test_service().await;

    let missing = service
        .submit_review("learner", uuid::Uuid::new_v4(), review(3, 0))
        .await
        .unwrap();
    assert!(missing.is_none());

    let mut request = card_request(1, "Retired card");
    request.is_active = Some(false);
    let inactive = service.create_flashcard(request).await.unwrap();

    let result = service
        .submit_review("learner", inactive.id, review(3, 0))
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(service.get_progress("learner", inactive.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_review_is_rejected_without_side_effects() {
    let service = create_test_service().await;
    let card = create_card(&service, 1, "Gamete").await;

    let err = service
        .submit_review("learner", card.id, review(6, 0))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("quality"));

    let err = service
        .submit_review("learner", card.id, review(3, -1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("negative"));

    assert!(service.get_progress("learner", card.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_study_queue_orders_due_reviews() {
    let service = create_test_service().await;
    let early = create_card(&service, 1, "Early").await;
    let late = create_card(&service, 1, "Late").await;
    let unseen = create_card(&service, 2, "Unseen").await;
    let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();

    // interval 1 for both; "late" was reviewed an hour later
    service
        .submit_review_at("learner", early.id, review(4, 0), now)
        .await
        .unwrap();
    service
        .submit_review_at("learner", late.id, review(4, 0), now + Duration::hours(1))
        .await
        .unwrap();

    let queue = service
        .get_study_queue_at("learner", StudyQueueRequest::default(), now)
        .await
        .unwrap();
    assert!(queue.reviews.is_empty());
    assert_eq!(queue.new_cards.len(), 1);
    assert_eq!(queue.new_cards[0].id, unseen.id);

    let queue = service
        .get_study_queue_at("learner", StudyQueueRequest::default(), now + Duration::days(2))
        .await
        .unwrap();
    let due: Vec<_> = queue.reviews.iter().map(|c| c.flashcard.id).collect();
    assert_eq!(due, vec![early.id, late.id]);

    let chapter_two = StudyQueueRequest {
        chapter_id: Some(2),
        ..Default::default()
    };
    let queue = service
        .get_study_queue_at("learner", chapter_two, now + Duration::days(2))
        .await
        .unwrap();
    assert!(queue.reviews.is_empty());
    assert_eq!(queue.new_cards.len(), 1);

    let limited = StudyQueueRequest {
        max_review_cards: Some(1),
        max_new_cards: Some(0),
        ..Default::default()
    };
    let queue = service
        .get_study_queue_at("learner", limited, now + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(queue.reviews.len(), 1);
    assert!(queue.new_cards.is_empty());
}

#[tokio::test]
async fn test_study_limits_are_applied() {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let service = ReviewService::with_limits(
        db,
        StudyLimits {
            max_new_cards: 2,
            max_review_cards: 100,
        },
    );
    for i in 0..4 {
        create_card(&service, 1, &format!("Card {}", i)).await;
    }

    let queue = service
        .get_study_queue("learner", StudyQueueRequest::default())
        .await
        .unwrap();
    assert_eq!(queue.new_cards.len(), 2);
}

#[tokio::test]
async fn test_suspend_bury_and_unbury() {
    let service = create_test_service().await;
    let suspended = create_card(&service, 1, "Suspended").await;
    let buried = create_card(&service, 1, "Buried").await;
    let now = Utc::now();

    for id in [suspended.id, buried.id] {
        service
            .submit_review_at("learner", id, review(3, 0), now - Duration::days(5))
            .await
            .unwrap();
    }

    service
        .update_progress(
            "learner",
            suspended.id,
            UpdateProgressRequest {
                is_suspended: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    service
        .update_progress(
            "learner",
            buried.id,
            UpdateProgressRequest {
                is_buried: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    let queue = service
        .get_study_queue("learner", StudyQueueRequest::default())
        .await
        .unwrap();
    assert!(queue.reviews.is_empty());

    let err = service
        .submit_review("learner", suspended.id, review(4, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReviewError>(),
        Some(ReviewError::Suspended { .. })
    ));

    assert_eq!(service.unbury_all("learner").await.unwrap(), 1);
    let queue = service
        .get_study_queue("learner", StudyQueueRequest::default())
        .await
        .unwrap();
    assert_eq!(queue.reviews.len(), 1);
    assert_eq!(queue.reviews[0].flashcard.id, buried.id);

    let stats = service.get_stats("learner").await.unwrap();
    assert_eq!(stats.total_cards, 2);
    assert_eq!(stats.suspended, 1);
    assert_eq!(stats.due_now, 1);
}

#[tokio::test]
async fn test_update_progress_for_unseen_card() {
    let service = create_test_service().await;
    let card = create_card(&service, 1, "Never reviewed").await;

    let result = service
        .update_progress(
            "learner",
            card.id,
            UpdateProgressRequest {
                is_suspended: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_review_statistics() {
    let service = create_test_service().await;
    let a = create_card(&service, 1, "A").await;
    let b = create_card(&service, 1, "B").await;

    let empty = service.get_stats("learner").await.unwrap();
    assert_eq!(empty.total_reviews, 0);
    assert!(empty.retention_rate.is_none());

    service.submit_review("learner", a.id, review(5, 1000)).await.unwrap();
    service.submit_review("learner", a.id, review(0, 3000)).await.unwrap();
    service.submit_review("learner", b.id, review(3, 2000)).await.unwrap();
    service.submit_review("learner", b.id, review(4, 2000)).await.unwrap();

    let stats = service.get_stats("learner").await.unwrap();
    assert_eq!(stats.total_cards, 2);
    assert_eq!(stats.total_reviews, 4);
    assert_eq!(stats.correct_reviews, 3);
    assert_eq!(stats.retention_rate, Some(75.0));
    assert_eq!(stats.average_response_time_ms, Some(2000));
    assert_eq!(stats.quality_distribution.again, 1);
    assert_eq!(stats.quality_distribution.hard, 1);
    assert_eq!(stats.quality_distribution.good, 1);
    assert_eq!(stats.quality_distribution.easy, 1);

    let other = service.get_stats("someone-else").await.unwrap();
    assert_eq!(other.total_cards, 0);
}

#[tokio::test]
async fn test_progress_is_per_user() {
    let service = create_test_service().await;
    let card = create_card(&service, 1, "Shared").await;

    service.submit_review("alice", card.id, review(5, 0)).await.unwrap();
    service.submit_review("alice", card.id, review(5, 0)).await.unwrap();
    service.submit_review("bob", card.id, review(2, 0)).await.unwrap();

    let alice = service.get_progress("alice", card.id).await.unwrap().unwrap();
    let bob = service.get_progress("bob", card.id).await.unwrap().unwrap();
    assert_eq!(alice.repetitions, 2);
    assert_eq!(bob.repetitions, 0);
    assert_eq!(service.list_responses("alice", card.id).await.unwrap().len(), 2);
    assert_eq!(service.list_responses("bob", card.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_flashcard_cascades() {
    let service = create_test_service().await;
    let card = create_card(&service, 1, "Ephemeral").await;

    service.submit_review("learner", card.id, review(4, 0)).await.unwrap();
    assert!(service.delete_flashcard(card.id).await.unwrap());

    assert!(service.get_flashcard(card.id).await.unwrap().is_none());
    assert!(service.get_progress("learner", card.id).await.unwrap().is_none());
    assert!(service.list_responses("learner", card.id).await.unwrap().is_empty());
    assert!(!service.delete_flashcard(card.id).await.unwrap());
}

#[tokio::test]
async fn test_preview_matches_submitted_review() {
    let service = create_test_service().await;
    let card = create_card(&service, 1, "Preview").await;

    for _ in 0..3 {
        service.submit_review("learner", card.id, review(4, 0)).await.unwrap();
    }

    let preview = service.preview("learner", card.id).await.unwrap().unwrap();
    assert_eq!(preview.current.repetitions, 3);
    assert_eq!(preview.intervals.again, 1);

    let result = service
        .submit_review("learner", card.id, review(4, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.progress.interval, preview.intervals.good);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reviews_do_not_lose_updates() {
    const SUBMISSIONS: usize = 8;
    let service = create_test_service().await;
    let card = create_card(&service, 1, "Contended").await;

    let submissions = (0..SUBMISSIONS).map(|_| {
        let service = service.clone();
        let id = card.id;
        tokio::spawn(async move { service.submit_review("learner", id, review(4, 500)).await })
    });
    let results = futures_util::future::join_all(submissions).await;

    let mut successes = 0;
    let mut conflicts = 0;
    for joined in results {
        match joined.unwrap() {
            Ok(Some(_)) => successes += 1,
            Ok(None) => panic!("active flashcard reported missing"),
            Err(e) => match e.downcast_ref::<ReviewError>() {
                Some(ReviewError::Conflict { flashcard_id, attempts }) => {
                    assert_eq!(*flashcard_id, card.id);
                    assert_eq!(*attempts, MAX_REVIEW_ATTEMPTS);
                    conflicts += 1;
                }
                _ => panic!("unexpected review failure: {:#}", e),
            },
        }
    }
    assert!(successes >= 1);
    assert_eq!(successes + conflicts, SUBMISSIONS);

    let progress = service.get_progress("learner", card.id).await.unwrap().unwrap();
    assert_eq!(progress.total_reviews, successes as i32);
    assert_eq!(progress.repetitions, successes as i32);
    assert_eq!(progress.version, successes as i64);
    assert_eq!(
        service.list_responses("learner", card.id).await.unwrap().len(),
        successes
    );
}

#[tokio::test]
async fn test_stale_version_write_is_rejected() {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let card = db.create_flashcard(&card_request(1, "Stale")).await.unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let initial = ReviewState {
        ease_factor: 2.5,
        interval: 1,
        repetitions: 0,
    };
    let stored = db.ensure_progress("learner", card.id, &initial, now).await.unwrap();
    assert_eq!(stored.version, 0);

    let mut reviewed = stored.clone();
    reviewed.repetitions = 1;
    reviewed.total_reviews = 1;
    reviewed.version = 1;
    let response = FlashcardResponse {
        id: Uuid::new_v4(),
        user_id: "learner".to_string(),
        flashcard_id: card.id,
        quality: 4,
        response_time_ms: 0,
        previous_interval: 1,
        previous_ease_factor: 2.5,
        previous_repetitions: 0,
        new_interval: 1,
        new_ease_factor: 2.5,
        new_repetitions: 1,
        next_review_date: now + Duration::days(1),
        responded_at: now,
    };

    // A writer holding version 7 must not overwrite version 0.
    assert!(!db.apply_review(&reviewed, 7, &response).await.unwrap());
    let unchanged = db.get_progress("learner", card.id).await.unwrap().unwrap();
    assert_eq!(unchanged.version, 0);
    assert_eq!(unchanged.repetitions, 0);
    assert_eq!(unchanged.total_reviews, 0);
    assert!(db.list_responses("learner", card.id).await.unwrap().is_empty());

    assert!(db.apply_review(&reviewed, 0, &response).await.unwrap());
    let applied = db.get_progress("learner", card.id).await.unwrap().unwrap();
    assert_eq!(applied.version, 1);
    assert_eq!(applied.repetitions, 1);
    assert_eq!(db.list_responses("learner", card.id).await.unwrap().len(), 1);

    // Replaying the same expected version now loses.
    assert!(!db.apply_review(&reviewed, 0, &response).await.unwrap());
    assert_eq!(db.list_responses("learner", card.id).await.unwrap().len(), 1);
}
