use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use models::Transaction;

use crate::clock::local_midnight;

/// How long a qualifying transaction keeps implying presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreshnessPolicy {
    /// Fresh until the next local midnight in the reference timezone.
    #[default]
    SinceMidnight,
    /// Fresh while `now - created_at <= window`.
    Rolling(Duration),
}

impl FreshnessPolicy {
    pub fn is_fresh(&self, cached: Option<&Transaction>, now: DateTime<Utc>, tz: Tz) -> bool {
        let Some(tx) = cached else {
            return false;
        };
        let created_at = tx.created_at.with_timezone(&Utc);

        match self {
            FreshnessPolicy::SinceMidnight => created_at > local_midnight(now, tz),
            FreshnessPolicy::Rolling(window) => now - created_at <= *window,
        }
    }
}
