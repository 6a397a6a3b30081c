use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;
use crate::sm2_scheduler::ReviewState;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS flashcards (
        id TEXT PRIMARY KEY,
        chapter_id INTEGER NOT NULL,
        front TEXT NOT NULL,
        back TEXT NOT NULL,
        example TEXT,
        image_url TEXT,
        audio_url TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        difficulty REAL NOT NULL DEFAULT 0.5,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS flashcards_chapter_id_idx ON flashcards(chapter_id);",
    r#"
    CREATE TABLE IF NOT EXISTS user_flashcard_progress (
        user_id TEXT NOT NULL,
        flashcard_id TEXT NOT NULL,
        ease_factor REAL NOT NULL DEFAULT 2.5 CHECK (ease_factor >= 1.3),
        interval INTEGER NOT NULL DEFAULT 1 CHECK (interval >= 1),
        repetitions INTEGER NOT NULL DEFAULT 0 CHECK (repetitions >= 0),
        next_review_date TEXT NOT NULL,
        last_reviewed TEXT,
        total_reviews INTEGER NOT NULL DEFAULT 0,
        correct_reviews INTEGER NOT NULL DEFAULT 0,
        average_response_time INTEGER,
        again_count INTEGER NOT NULL DEFAULT 0,
        hard_count INTEGER NOT NULL DEFAULT 0,
        good_count INTEGER NOT NULL DEFAULT 0,
        easy_count INTEGER NOT NULL DEFAULT 0,
        is_suspended INTEGER NOT NULL DEFAULT 0,
        is_buried INTEGER NOT NULL DEFAULT 0,
        note TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (user_id, flashcard_id),
        FOREIGN KEY (flashcard_id) REFERENCES flashcards(id) ON DELETE CASCADE
    );
    "#,
    "CREATE INDEX IF NOT EXISTS user_flashcard_next_review_idx ON user_flashcard_progress(user_id, next_review_date);",
    "CREATE INDEX IF NOT EXISTS user_flashcard_flashcard_idx ON user_flashcard_progress(flashcard_id);",
    r#"
    CREATE TABLE IF NOT EXISTS flashcard_responses (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        flashcard_id TEXT NOT NULL,
        quality INTEGER NOT NULL CHECK (quality BETWEEN 0 AND 5),
        response_time INTEGER NOT NULL,
        previous_interval INTEGER NOT NULL,
        previous_ease_factor REAL NOT NULL,
        previous_repetitions INTEGER NOT NULL,
        new_interval INTEGER NOT NULL,
        new_ease_factor REAL NOT NULL,
        new_repetitions INTEGER NOT NULL,
        next_review_date TEXT NOT NULL,
        responded_at TEXT NOT NULL,
        FOREIGN KEY (flashcard_id) REFERENCES flashcards(id) ON DELETE CASCADE
    );
    "#,
    "CREATE INDEX IF NOT EXISTS flashcard_responses_user_card_idx ON flashcard_responses(user_id, flashcard_id, responded_at);",
];

const FLASHCARD_COLUMNS_PREFIXED: &str = "f.id AS f_id, f.chapter_id AS f_chapter_id, \
    f.front AS f_front, f.back AS f_back, f.example AS f_example, f.image_url AS f_image_url, \
    f.audio_url AS f_audio_url, f.tags AS f_tags, f.difficulty AS f_difficulty, \
    f.is_active AS f_is_active, f.created_at AS f_created_at, f.updated_at AS f_updated_at";

/// Fixed-width UTC timestamps so that text comparison in SQL matches time order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp '{}'", value))?
        .with_timezone(&Utc))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("invalid uuid '{}'", value))
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in MIGRATIONS.iter().copied() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        log_db_operation!(info, "migrate", "schema ready");
        Ok(())
    }

    // Flashcard operations
    pub async fn create_flashcard(&self, request: &CreateFlashcardRequest) -> Result<Flashcard> {
        let now = Utc::now();
        let flashcard = Flashcard {
            id: Uuid::new_v4(),
            chapter_id: request.chapter_id,
            front: request.front.trim().to_string(),
            back: request.back.trim().to_string(),
            example: request.example.clone(),
            image_url: request.image_url.clone(),
            audio_url: request.audio_url.clone(),
            tags: request.tags.clone(),
            difficulty: request.difficulty.unwrap_or(0.5),
            is_active: request.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO flashcards (id, chapter_id, front, back, example, image_url, audio_url,
                                    tags, difficulty, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(flashcard.id.to_string())
        .bind(flashcard.chapter_id)
        .bind(&flashcard.front)
        .bind(&flashcard.back)
        .bind(&flashcard.example)
        .bind(&flashcard.image_url)
        .bind(&flashcard.audio_url)
        .bind(serde_json::to_string(&flashcard.tags)?)
        .bind(flashcard.difficulty)
        .bind(flashcard.is_active)
        .bind(format_timestamp(&flashcard.created_at))
        .bind(format_timestamp(&flashcard.updated_at))
        .execute(&self.pool)
        .await?;

        // Re-read so callers see the stored (microsecond) timestamps.
        self.get_flashcard(flashcard.id)
            .await?
            .ok_or_else(|| anyhow!("flashcard {} vanished after insert", flashcard.id))
    }

    pub async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>> {
        let row = sqlx::query("SELECT * FROM flashcards WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_flashcard(&row, "")).transpose()
    }

    /// Applies the present fields of `request` and returns the stored card,
    /// or `None` when no flashcard has this id.
    pub async fn update_flashcard(
        &self,
        id: Uuid,
        request: &UpdateFlashcardRequest,
    ) -> Result<Option<Flashcard>> {
        let Some(mut flashcard) = self.get_flashcard(id).await? else {
            return Ok(None);
        };

        if let Some(chapter_id) = request.chapter_id {
            flashcard.chapter_id = chapter_id;
        }
        if let Some(front) = &request.front {
            flashcard.front = front.trim().to_string();
        }
        if let Some(back) = &request.back {
            flashcard.back = back.trim().to_string();
        }
        if request.example.is_some() {
            flashcard.example = request.example.clone();
        }
        if request.image_url.is_some() {
            flashcard.image_url = request.image_url.clone();
        }
        if request.audio_url.is_some() {
            flashcard.audio_url = request.audio_url.clone();
        }
        if let Some(tags) = &request.tags {
            flashcard.tags = tags.clone();
        }
        if let Some(difficulty) = request.difficulty {
            flashcard.difficulty = difficulty;
        }
        if let Some(is_active) = request.is_active {
            flashcard.is_active = is_active;
        }

        sqlx::query(
            r#"
            UPDATE flashcards
            SET chapter_id = ?1, front = ?2, back = ?3, example = ?4, image_url = ?5,
                audio_url = ?6, tags = ?7, difficulty = ?8, is_active = ?9, updated_at = ?10
            WHERE id = ?11
            "#,
        )
        .bind(flashcard.chapter_id)
        .bind(&flashcard.front)
        .bind(&flashcard.back)
        .bind(&flashcard.example)
        .bind(&flashcard.image_url)
        .bind(&flashcard.audio_url)
        .bind(serde_json::to_string(&flashcard.tags)?)
        .bind(flashcard.difficulty)
        .bind(flashcard.is_active)
        .bind(format_timestamp(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        log_db_operation!(info, "update_flashcard", flashcard_id = id, "flashcard updated");
        self.get_flashcard(id).await
    }

    pub async fn list_flashcards(&self, filter: &FlashcardFilter) -> Result<Vec<Flashcard>> {
        let started = Instant::now();
        let tags = filter.tag_list();
        let tags = (!tags.is_empty())
            .then(|| serde_json::to_string(&tags))
            .transpose()?;
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(|term| format!("%{}%", escape_like(term)));

        let rows = sqlx::query(
            r#"
            SELECT * FROM flashcards f
            WHERE (?1 IS NULL OR f.chapter_id = ?1)
              AND (?2 IS NULL OR f.difficulty >= ?2)
              AND (?3 IS NULL OR f.difficulty <= ?3)
              AND (?4 IS NULL
                   OR f.front LIKE ?4 ESCAPE ''
                   OR f.back LIKE ?4 ESCAPE ''
                   OR f.example LIKE ?4 ESCAPE '')
              AND (?5 IS NULL OR (f.image_url IS NOT NULL) = ?5)
              AND (?6 IS NULL OR (f.audio_url IS NOT NULL) = ?6)
              AND (?7 IS NULL OR EXISTS (
                  SELECT 1 FROM json_each(f.tags) card_tag
                  WHERE card_tag.value IN (SELECT value FROM json_each(?7))
              ))
            ORDER BY f.created_at ASC, f.rowid ASC
            "#,
        )
        .bind(filter.chapter_id)
        .bind(filter.min_difficulty)
        .bind(filter.max_difficulty)
        .bind(search)
        .bind(filter.has_image)
        .bind(filter.has_audio)
        .bind(tags)
        .fetch_all(&self.pool)
        .await?;

        let flashcards = rows
            .iter()
            .map(|row| row_to_flashcard(row, ""))
            .collect::<Result<Vec<_>>>()?;
        log_db_operation!(
            debug,
            "list_flashcards",
            count = flashcards.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(flashcards)
    }

    pub async fn delete_flashcard(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flashcards WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Progress operations
    pub async fn get_progress(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
    ) -> Result<Option<FlashcardProgress>> {
        let started = Instant::now();
        let row = sqlx::query(
            "SELECT * FROM user_flashcard_progress WHERE user_id = ?1 AND flashcard_id = ?2",
        )
        .bind(user_id)
        .bind(flashcard_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        log_db_operation!(
            debug,
            "get_progress",
            flashcard_id = flashcard_id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        row.map(|row| row_to_progress(&row)).transpose()
    }

    /// Creates the first-encounter record if none exists and returns the
    /// stored record either way.
    pub async fn ensure_progress(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
        initial: &ReviewState,
        now: DateTime<Utc>,
    ) -> Result<FlashcardProgress> {
        let now = format_timestamp(&now);
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_flashcard_progress
                (user_id, flashcard_id, ease_factor, interval, repetitions,
                 next_review_date, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)
            "#,
        )
        .bind(user_id)
        .bind(flashcard_id.to_string())
        .bind(initial.ease_factor)
        .bind(initial.interval)
        .bind(initial.repetitions)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_progress(user_id, flashcard_id)
            .await?
            .ok_or_else(|| anyhow!("progress for flashcard {} missing after insert", flashcard_id))
    }

    /// Writes a reviewed progress record and its response log entry in one
    /// transaction. The update only lands if the stored version still equals
    /// `expected_version`; returns `false` when another writer got there first.
    pub async fn apply_review(
        &self,
        progress: &FlashcardProgress,
        expected_version: i64,
        response: &FlashcardResponse,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_flashcard_progress
            SET ease_factor = ?1, interval = ?2, repetitions = ?3, next_review_date = ?4,
                last_reviewed = ?5, total_reviews = ?6, correct_reviews = ?7,
                average_response_time = ?8, again_count = ?9, hard_count = ?10,
                good_count = ?11, easy_count = ?12, is_buried = ?13,
                version = version + 1, updated_at = ?14
            WHERE user_id = ?15 AND flashcard_id = ?16 AND version = ?17
            "#,
        )
        .bind(progress.ease_factor)
        .bind(progress.interval)
        .bind(progress.repetitions)
        .bind(format_timestamp(&progress.next_review_date))
        .bind(progress.last_reviewed.as_ref().map(format_timestamp))
        .bind(progress.total_reviews)
        .bind(progress.correct_reviews)
        .bind(progress.average_response_time_ms)
        .bind(progress.again_count)
        .bind(progress.hard_count)
        .bind(progress.good_count)
        .bind(progress.easy_count)
        .bind(progress.is_buried)
        .bind(format_timestamp(&progress.updated_at))
        .bind(&progress.user_id)
        .bind(progress.flashcard_id.to_string())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            log_db_operation!(
                warn,
                "apply_review",
                flashcard_id = progress.flashcard_id,
                "version moved, review not applied"
            );
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO flashcard_responses
                (id, user_id, flashcard_id, quality, response_time, previous_interval,
                 previous_ease_factor, previous_repetitions, new_interval, new_ease_factor,
                 new_repetitions, next_review_date, responded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(response.id.to_string())
        .bind(&response.user_id)
        .bind(response.flashcard_id.to_string())
        .bind(response.quality)
        .bind(response.response_time_ms)
        .bind(response.previous_interval)
        .bind(response.previous_ease_factor)
        .bind(response.previous_repetitions)
        .bind(response.new_interval)
        .bind(response.new_ease_factor)
        .bind(response.new_repetitions)
        .bind(format_timestamp(&response.next_review_date))
        .bind(format_timestamp(&response.responded_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn update_progress_flags(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
        request: &UpdateProgressRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashcardProgress>> {
        let result = sqlx::query(
            r#"
            UPDATE user_flashcard_progress
            SET is_suspended = COALESCE(?1, is_suspended),
                is_buried = COALESCE(?2, is_buried),
                note = COALESCE(?3, note),
                version = version + 1,
                updated_at = ?4
            WHERE user_id = ?5 AND flashcard_id = ?6
            "#,
        )
        .bind(request.is_suspended)
        .bind(request.is_buried)
        .bind(&request.note)
        .bind(format_timestamp(&now))
        .bind(user_id)
        .bind(flashcard_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_progress(user_id, flashcard_id).await
    }

    pub async fn unbury_all(&self, user_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE user_flashcard_progress
            SET is_buried = 0, version = version + 1, updated_at = ?1
            WHERE user_id = ?2 AND is_buried = 1
            "#,
        )
        .bind(format_timestamp(&now))
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // Study queue operations
    pub async fn get_due_cards(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        chapter_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<DueCard>> {
        let started = Instant::now();
        let sql = format!(
            r#"
            SELECT p.*, {}
            FROM user_flashcard_progress p
            JOIN flashcards f ON f.id = p.flashcard_id
            WHERE p.user_id = ?1
              AND p.next_review_date <= ?2
              AND p.is_suspended = 0
              AND p.is_buried = 0
              AND f.is_active = 1
              AND (?3 IS NULL OR f.chapter_id = ?3)
            ORDER BY p.next_review_date ASC
            LIMIT ?4
            "#,
            FLASHCARD_COLUMNS_PREFIXED
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(format_timestamp(&now))
            .bind(chapter_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let cards = rows
            .iter()
            .map(|row| {
                Ok(DueCard {
                    flashcard: row_to_flashcard(row, "f_")?,
                    progress: row_to_progress(row)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log_db_operation!(
            debug,
            "get_due_cards",
            count = cards.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(cards)
    }

    /// Active flashcards the user has never encountered.
    pub async fn get_unseen_flashcards(
        &self,
        user_id: &str,
        chapter_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Flashcard>> {
        let rows = sqlx::query(
            r#"
            SELECT f.* FROM flashcards f
            WHERE f.is_active = 1
              AND (?2 IS NULL OR f.chapter_id = ?2)
              AND NOT EXISTS (
                  SELECT 1 FROM user_flashcard_progress p
                  WHERE p.flashcard_id = f.id AND p.user_id = ?1
              )
            ORDER BY f.created_at ASC
            LIMIT ?3
            "#,
        )
        .bind(user_id)
        .bind(chapter_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_flashcard(row, "")).collect()
    }

    pub async fn list_responses(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
    ) -> Result<Vec<FlashcardResponse>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM flashcard_responses
            WHERE user_id = ?1 AND flashcard_id = ?2
            ORDER BY responded_at ASC
            "#,
        )
        .bind(user_id)
        .bind(flashcard_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_response).collect()
    }

    pub async fn review_stats(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReviewStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_cards,
                COALESCE(SUM(total_reviews), 0) AS total_reviews,
                COALESCE(SUM(correct_reviews), 0) AS correct_reviews,
                COALESCE(SUM(again_count), 0) AS again_count,
                COALESCE(SUM(hard_count), 0) AS hard_count,
                COALESCE(SUM(good_count), 0) AS good_count,
                COALESCE(SUM(easy_count), 0) AS easy_count,
                COALESCE(SUM(CASE WHEN average_response_time IS NOT NULL
                                  THEN average_response_time * total_reviews ELSE 0 END), 0) AS timed_ms,
                COALESCE(SUM(CASE WHEN average_response_time IS NOT NULL
                                  THEN total_reviews ELSE 0 END), 0) AS timed_reviews,
                COALESCE(SUM(CASE WHEN next_review_date <= ?2 AND is_suspended = 0 AND is_buried = 0
                                  THEN 1 ELSE 0 END), 0) AS due_now,
                COALESCE(SUM(is_suspended), 0) AS suspended
            FROM user_flashcard_progress
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .bind(format_timestamp(&now))
        .fetch_one(&self.pool)
        .await?;

        let total_reviews: i64 = row.try_get("total_reviews")?;
        let correct_reviews: i64 = row.try_get("correct_reviews")?;
        let timed_ms: i64 = row.try_get("timed_ms")?;
        let timed_reviews: i64 = row.try_get("timed_reviews")?;

        Ok(ReviewStats {
            total_cards: row.try_get("total_cards")?,
            total_reviews,
            correct_reviews,
            retention_rate: (total_reviews > 0)
                .then(|| correct_reviews as f64 * 100.0 / total_reviews as f64),
            average_response_time_ms: (timed_reviews > 0).then(|| timed_ms / timed_reviews),
            quality_distribution: QualityDistribution {
                again: row.try_get("again_count")?,
                hard: row.try_get("hard_count")?,
                good: row.try_get("good_count")?,
                easy: row.try_get("easy_count")?,
            },
            due_now: row.try_get("due_now")?,
            suspended: row.try_get("suspended")?,
        })
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_flashcard(row: &SqliteRow, prefix: &str) -> Result<Flashcard> {
    let col = |name: &str| format!("{}{}", prefix, name);
    let tags: String = row.try_get(col("tags").as_str())?;

    Ok(Flashcard {
        id: parse_uuid(&row.try_get::<String, _>(col("id").as_str())?)?,
        chapter_id: row.try_get(col("chapter_id").as_str())?,
        front: row.try_get(col("front").as_str())?,
        back: row.try_get(col("back").as_str())?,
        example: row.try_get(col("example").as_str())?,
        image_url: row.try_get(col("image_url").as_str())?,
        audio_url: row.try_get(col("audio_url").as_str())?,
        tags: serde_json::from_str(&tags)?,
        difficulty: row.try_get(col("difficulty").as_str())?,
        is_active: row.try_get(col("is_active").as_str())?,
        created_at: parse_timestamp(&row.try_get::<String, _>(col("created_at").as_str())?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>(col("updated_at").as_str())?)?,
    })
}

fn row_to_progress(row: &SqliteRow) -> Result<FlashcardProgress> {
    Ok(FlashcardProgress {
        user_id: row.try_get("user_id")?,
        flashcard_id: parse_uuid(&row.try_get::<String, _>("flashcard_id")?)?,
        ease_factor: row.try_get("ease_factor")?,
        interval: row.try_get("interval")?,
        repetitions: row.try_get("repetitions")?,
        next_review_date: parse_timestamp(&row.try_get::<String, _>("next_review_date")?)?,
        last_reviewed: row
            .try_get::<Option<String>, _>("last_reviewed")?
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        total_reviews: row.try_get("total_reviews")?,
        correct_reviews: row.try_get("correct_reviews")?,
        average_response_time_ms: row.try_get("average_response_time")?,
        again_count: row.try_get("again_count")?,
        hard_count: row.try_get("hard_count")?,
        good_count: row.try_get("good_count")?,
        easy_count: row.try_get("easy_count")?,
        is_suspended: row.try_get("is_suspended")?,
        is_buried: row.try_get("is_buried")?,
        note: row.try_get("note")?,
        version: row.try_get("version")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn row_to_response(row: &SqliteRow) -> Result<FlashcardResponse> {
    Ok(FlashcardResponse {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        user_id: row.try_get("user_id")?,
        flashcard_id: parse_uuid(&row.try_get::<String, _>("flashcard_id")?)?,
        quality: row.try_get("quality")?,
        response_time_ms: row.try_get("response_time")?,
        previous_interval: row.try_get("previous_interval")?,
        previous_ease_factor: row.try_get("previous_ease_factor")?,
        previous_repetitions: row.try_get("previous_repetitions")?,
        new_interval: row.try_get("new_interval")?,
        new_ease_factor: row.try_get("new_ease_factor")?,
        new_repetitions: row.try_get("new_repetitions")?,
        next_review_date: parse_timestamp(&row.try_get::<String, _>("next_review_date")?)?,
        responded_at: parse_timestamp(&row.try_get::<String, _>("responded_at")?)?,
    })
}
