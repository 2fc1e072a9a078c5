//! SM2-family review scheduler.
//!
//! Pure functions with no side effects: the current time is an explicit
//! argument and the input state is never modified.

use chrono::{DateTime, Duration, Utc};

use super::{Grade, LearningState, Result, SchedulerParams};

/// Computes the state that follows grading `state` with a raw `grade` at `now`.
///
/// Fails with [`SchedulerError::InvalidGrade`](super::SchedulerError::InvalidGrade)
/// if `grade` is outside `0..=3`.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use recall_core::progress::{compute_next, LearningState, SchedulerParams};
/// use uuid::Uuid;
///
/// let params = SchedulerParams::default();
/// let now = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
/// let state = LearningState::new(Uuid::nil(), Uuid::nil(), now, &params);
///
/// let next = compute_next(&state, 2, now, &params).unwrap();
/// assert_eq!(next.repetitions, 1);
/// assert_eq!(next.due_at, now + Duration::days(1));
///
/// assert!(compute_next(&state, -1, now, &params).is_err());
/// ```
pub fn compute_next(
    state: &LearningState,
    grade: i64,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> Result<LearningState> {
    let grade = Grade::try_from(grade)?;
    Ok(apply_grade(state, grade, now, params))
}

/// Applies an already validated grade. See [`compute_next`].
pub fn apply_grade(
    state: &LearningState,
    grade: Grade,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> LearningState {
    let (ease_factor, repetitions, interval_days) = if grade.is_correct() {
        // The floor must hold before the ease factor feeds the interval.
        let ease = clamp_ease(state.ease_factor + ease_delta(grade, params), params);
        let repetitions = state.repetitions.saturating_add(1);
        let interval = match repetitions {
            1 => params.first_interval_days,
            2 => params.second_interval_days,
            _ => grow_interval(state.interval_days, ease, params),
        };
        (ease, repetitions, interval)
    } else {
        let ease = clamp_ease(state.ease_factor - params.failure_penalty, params);
        (ease, 0, params.restart_interval_days)
    };

    LearningState {
        ease_factor,
        repetitions,
        interval_days,
        due_at: now + Duration::days(i64::from(interval_days)),
        last_reviewed_at: Some(now),
        total_reviews: state.total_reviews.saturating_add(1),
        correct_reviews: state
            .correct_reviews
            .saturating_add(u32::from(grade.is_correct())),
        ..state.clone()
    }
}

/// Ease adjustment for a correct recall.
fn ease_delta(grade: Grade, params: &SchedulerParams) -> f64 {
    let miss = f64::from(5 - grade.sm2_quality());
    params.ease_bonus - miss * (params.ease_linear + miss * params.ease_quadratic)
}

fn clamp_ease(ease: f64, params: &SchedulerParams) -> f64 {
    if ease.is_nan() {
        return params.ease_floor;
    }
    ease.max(params.ease_floor)
}

/// Multiplies the previous interval by the ease factor, rounded to whole
/// days. Never shrinks the interval and never exceeds the configured maximum.
fn grow_interval(previous: u32, ease: f64, params: &SchedulerParams) -> u32 {
    let grown = (f64::from(previous) * ease).round() as u32;
    grown.max(previous).min(params.max_interval_days)
}
