//! Freshness evaluator.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

use super::Session;

/// Reset policy: `daily@H` or `idle(minutes)`.
#[derive(Clone, Copy, Debug)]
pub enum ResetPolicy {
    /// Stale once local clock has passed hour `h` since the session's last update.
    DailyAt(u32),
    /// Stale once `now - updated_at >= minutes`.
    Idle(i64),
}

impl ResetPolicy {
    /// Most recent local occurrence of `daily@h`: today if `now.hour() >= h`, else
    /// yesterday.
    fn most_recent_occurrence(h: u32, now: DateTime<Local>) -> DateTime<Local> {
        let today = now.date_naive();
        let date = if now.hour() >= h {
            today
        } else {
            today.pred_opt().unwrap_or(today)
        };
        Local
            .with_ymd_and_hms(date.year(), date.month(), date.day(), h, 0, 0)
            .single()
            .unwrap_or(now)
    }

    /// Whether `session` is stale under this policy, evaluated at `now`.
    pub fn is_stale(&self, session: &Session, now: DateTime<Utc>) -> bool {
        match self {
            ResetPolicy::DailyAt(h) => {
                let now_local = now.with_timezone(&Local);
                let boundary = Self::most_recent_occurrence(*h, now_local);
                session.updated_at.with_timezone(&Local) < boundary
            }
            ResetPolicy::Idle(minutes) => {
                let elapsed = now.signed_duration_since(session.updated_at);
                elapsed.num_minutes() >= *minutes
            }
        }
    }

    /// Applies the policy: resets `session` in place if stale, no-op otherwise.
    pub fn apply(&self, session: &mut Session, now: DateTime<Utc>) -> bool {
        if self.is_stale(session, now) {
            session.clear();
            true
        } else {
            false
        }
    }
}
