//! Review scheduling
//!
//! Computes the next due date, interval and easiness factor for a note from
//! its review history and a recall quality score.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout, no recall
//! - 1: Incorrect, but upon seeing answer, remembered
//! - 2: Incorrect, but answer seemed easy to recall
//! - 3: Correct response with serious difficulty
//! - 4: Correct response after hesitation
//! - 5: Perfect response with no hesitation
//!
//! The first three reviews use fixed intervals (0, 1 and 6 days), selected by
//! the review count *before* the rating is applied. From the fourth review on
//! the interval is scaled by the easiness factor and jittered by one day either
//! way. The easiness factor is not clamped: a score of 0 yields -0.8 and so a
//! negative interval.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;

pub const MIN_QUALITY: i32 = 0;
pub const MAX_QUALITY: i32 = 5;

/// Largest number of days the interval may drift from the scaled value
pub const JITTER_DAYS: i64 = 1;

const SECOND_REVIEW_INTERVAL: i64 = 1;
const THIRD_REVIEW_INTERVAL: i64 = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid quality score {0}: expected a value between 0 and 5")]
    InvalidScore(i32),
}

/// Result of scheduling the next review
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleResult {
    pub next_due_date: DateTime<Utc>,
    pub interval: i64,
    /// Absent for the fixed-interval tiers
    pub easiness_factor: Option<f64>,
}

/// Checks a quality score is within 0..=5
pub fn validate_quality(quality: i32) -> Result<i32, ScheduleError> {
    if (MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        Ok(quality)
    } else {
        Err(ScheduleError::InvalidScore(quality))
    }
}

/// EF = 0.1 - (5-q)(0.08 + (5-q)(0.02))
pub fn easiness_factor(quality: i32) -> f64 {
    let five_minus_q = f64::from(MAX_QUALITY - quality);
    0.1 - five_minus_q * (0.08 + five_minus_q * 0.02)
}

/// Interval scaled by the easiness factor, before jitter
pub fn scaled_interval(current_interval: i64, easiness_factor: f64) -> i64 {
    (current_interval as f64 * easiness_factor).round() as i64
}

/// Calculate the next review using the thread-local RNG and the current time
pub fn compute_next_schedule(
    review_count: i64,
    current_interval: i64,
    last_reviewed: Option<DateTime<Utc>>,
    quality: i32,
) -> Result<ScheduleResult, ScheduleError> {
    compute_next_schedule_with(
        &mut rand::thread_rng(),
        Utc::now(),
        review_count,
        current_interval,
        last_reviewed,
        quality,
    )
}

/// Calculate the next review with an explicit RNG and clock
pub fn compute_next_schedule_with<R: Rng + ?Sized>(
    rng: &mut R,
    now: DateTime<Utc>,
    review_count: i64,
    current_interval: i64,
    last_reviewed: Option<DateTime<Utc>>,
    quality: i32,
) -> Result<ScheduleResult, ScheduleError> {
    let jitter = rng.gen_range(-JITTER_DAYS..=JITTER_DAYS);
    schedule_with_jitter(
        now,
        review_count,
        current_interval,
        last_reviewed,
        quality,
        jitter,
    )
}

fn schedule_with_jitter(
    now: DateTime<Utc>,
    review_count: i64,
    current_interval: i64,
    last_reviewed: Option<DateTime<Utc>>,
    quality: i32,
    jitter: i64,
) -> Result<ScheduleResult, ScheduleError> {
    let quality = validate_quality(quality)?;

    let fixed = |interval: i64| ScheduleResult {
        next_due_date: now + Duration::days(interval),
        interval,
        easiness_factor: None,
    };

    match review_count {
        c if c <= 0 => Ok(fixed(0)),
        1 => Ok(fixed(SECOND_REVIEW_INTERVAL)),
        2 => Ok(fixed(THIRD_REVIEW_INTERVAL)),
        _ => {
            let ef = easiness_factor(quality);
            let interval = scaled_interval(current_interval, ef) + jitter;
            // A note past its third review always has a timestamp; fall back to
            // `now` for rows edited by hand.
            let anchor = last_reviewed.unwrap_or(now);

            Ok(ScheduleResult {
                next_due_date: anchor + Duration::days(interval),
                interval,
                easiness_factor: Some(ef),
            })
        }
    }
}
