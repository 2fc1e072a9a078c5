mod error;
mod params;
mod schedule;
mod scheduler;
mod session;
mod types;

pub use error::{Result, SchedulerError};
pub use params::SchedulerParams;
pub use schedule::{compare_schedule, sort_schedule, DueItems, ItemProgress, LearnerStats};
pub use scheduler::{apply_grade, compute_next};
pub use session::{SessionSummary, StudySession};
pub use types::{
    Grade, LearningState, Mastery, ReviewRecord, MASTERED_INTERVAL_DAYS, MASTERED_REPETITIONS,
    MATURE_INTERVAL_DAYS,
};
