use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;

/// Source of "now" for freshness and day boundaries.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// First instant of `date` in `tz`.
fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Midnight skipped by a DST jump; the day starts an hour later.
        LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
    }
}

/// Local midnight at the start of `now`'s calendar day in `tz`.
pub fn local_midnight(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    start_of_day(now.with_timezone(&tz).date_naive(), tz)
}

/// Time left until the next local midnight in `tz`.
pub fn until_next_midnight(now: DateTime<Utc>, tz: Tz) -> std::time::Duration {
    let today = now.with_timezone(&tz).date_naive();
    let next = match today.succ_opt() {
        Some(tomorrow) => start_of_day(tomorrow, tz),
        None => return std::time::Duration::ZERO,
    };
    (next - now).to_std().unwrap_or(std::time::Duration::ZERO)
}
