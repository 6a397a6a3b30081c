pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod logging;
pub mod models;
pub mod review_service;
pub mod sm2_scheduler;
pub mod validation;

pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use models::*;
pub use review_service::{ReviewError, ReviewService, StudyLimits};
pub use sm2_scheduler::{
    schedule_review, IntervalPreview, Quality, QualityBucket, ReviewState, ScheduleOutcome,
    SchedulerError, Sm2Parameters, Sm2Scheduler,
};
pub use validation::ValidationError;
