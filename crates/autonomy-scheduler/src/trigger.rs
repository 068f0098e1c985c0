//! Pure next-fire computation for the two trigger kinds,
//! split out from the fire loop so the DST and missed-fire boundary cases
//! can be tested without a store or a lock.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_types::Trigger;

/// Next fire instant for `trigger`, evaluated in `tz` from `after`
/// (exclusive). Cron expressions are minute-granular and timezone-aware;
/// `cron::Schedule::upcoming` resolves each candidate civil time against
/// `tz` itself, which is where the DST handling comes from: an ambiguous
/// civil time (fall-back repeat) resolves to its earliest UTC instant, and
/// a civil time that doesn't exist (spring-forward skip) is never produced
/// as a candidate, so the schedule silently advances to the next valid
/// one — fire at the civil time, taking the first of two when clocks
/// repeat, and the next valid civil time when clocks skip.
/// Interval triggers never backfill: `next_interval_fire` jumps straight
/// past any missed periods to the next occurrence strictly after `now`.
pub fn next_fire(
 trigger: &Trigger,
 tz_name: &str,
 after: DateTime<Utc>,
) -> AutonomyResult<DateTime<Utc>> {
 match trigger {
 Trigger::Cron { expression } => next_cron_fire(expression, tz_name, after),
 Trigger::Interval { period_seconds } => Ok(next_interval_fire(*period_seconds, after, after)),
 }
}

fn next_cron_fire(expression: &str, tz_name: &str, after: DateTime<Utc>) -> AutonomyResult<DateTime<Utc>> {
 let tz: Tz = tz_name
.parse()
.map_err(|_| AutonomyError::ConfigInvalid(format!("unknown timezone {tz_name:?}")))?;
 let schedule = Schedule::from_str(expression)
.map_err(|e| AutonomyError::ConfigInvalid(format!("invalid cron expression {expression:?}: {e}")))?;

 let after_local = after.with_timezone(&tz);
 schedule
.after(&after_local)
.next()
.map(|dt| dt.with_timezone(&Utc))
.ok_or_else(|| AutonomyError::ConfigInvalid(format!("cron expression {expression:?} never fires")))
}

/// `anchor` is the instant to schedule from (typically the job's current
/// `next_run_at`, or `now` for a never-fired job). Missed fires are skipped
/// rather than backfilled — if several periods have elapsed since
/// `anchor`, jump to the first occurrence strictly after `now` rather than
/// replaying each missed tick.
pub fn next_interval_fire(period_seconds: u64, anchor: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
 let period_seconds = period_seconds.max(1);
 if anchor > now {
 return anchor;
 }
 let period = Duration::seconds(period_seconds as i64);
 let elapsed_seconds = (now - anchor).num_seconds().max(0);
 let periods_elapsed = elapsed_seconds / period_seconds as i64 + 1;
 anchor + period * periods_elapsed as i32
}

#[cfg(test)]
mod tests {
 use super::*;
 use chrono::TimeZone;

 #[test]
 fn interval_does_not_backfill_missed_periods() {
 let anchor = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
 let now = anchor + Duration::seconds(1000); // 16 missed 60s periods
 let next = next_interval_fire(60, anchor, now);
 assert!(next > now);
 assert_eq!((next - anchor).num_seconds() % 60, 0);
 }

 #[test]
 fn interval_before_anchor_returns_anchor_unchanged() {
 let anchor = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
 let now = anchor - Duration::seconds(30);
 assert_eq!(next_interval_fire(60, anchor, now), anchor);
 }

 #[test]
 fn cron_every_minute_fires_the_next_minute_boundary() {
 let expr = "0 * * * * * *"; // sec min hour dom month dow year (cron crate 7-field)
 let after = Utc.with_ymd_and_hms(2026, 7, 28, 10, 30, 15).unwrap();
 let next = next_cron_fire(expr, "UTC", after).unwrap();
 assert_eq!(next, Utc.with_ymd_and_hms(2026, 7, 28, 10, 31, 0).unwrap());
 }

 #[test]
 fn cron_fall_back_fires_once_at_the_earliest_instant() {
 // America/New_York falls back at 2026-11-01 02:00 local -> 01:00 local (repeated).
 let expr = "0 30 1 * * * *";
 let after = Utc.with_ymd_and_hms(2026, 11, 1, 4, 0, 0).unwrap(); // well before the repeat, in UTC
 let next = next_cron_fire(expr, "America/New_York", after).unwrap();
 let next_local = next.with_timezone(&chrono_tz::America::New_York);
 assert_eq!(next_local.naive_local().to_string(), "2026-11-01 01:30:00");
 }

 #[test]
 fn cron_spring_forward_skips_the_missing_civil_time() {
 // America/New_York springs forward at 2026-03-08 02:00 local -> 03:00; 02:30 never occurs.
 let expr = "0 30 2 * * * *";
 let after = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
 let next = next_cron_fire(expr, "America/New_York", after).unwrap();
 let next_local = next.with_timezone(&chrono_tz::America::New_York);
 // Should not land on 2026-03-08 02:30 (it doesn't exist); next valid
 // occurrence is the following day's 02:30.
 assert_eq!(next_local.naive_local().to_string(), "2026-03-09 02:30:00");
 }

 #[test]
 fn invalid_timezone_is_rejected() {
 let trigger = Trigger::Cron { expression: "0 0 3 * * * *".to_string() };
 let err = next_fire(&trigger, "Mars/Olympus_Mons", Utc::now()).unwrap_err();
 assert_eq!(err.code(), "config_invalid");
 }
}
