//! Transaction classifier: decides whether a single transaction is evidence
//! of being at the office.
//!
//! Criteria are a fixed conjunction of predicates evaluated in order. The
//! first failing predicate decides the result; all predicates are pure so
//! the order only affects how much work is done.

use chrono::{Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use models::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_CATEGORY: &str = "restaurants-and-cafes";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Australia::Melbourne;

/// Which clock the time-of-day rule reads the hour from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourZone {
    /// The offset embedded in the transaction timestamp, no conversion.
    Embedded,
    Utc,
    /// The criteria's reference timezone.
    Reference,
}

/// Inclusive hour range, e.g. 6..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub min_hour: u32,
    pub max_hour: u32,
    pub zone: HourZone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationCriteria {
    /// Inclusive, both negative for a spend.
    pub min_units: i64,
    pub max_units: i64,
    /// `None` disables the time-of-day rule.
    pub hours: Option<HourWindow>,
    pub required_category: String,
    /// Calendar for the weekday rule and for `HourZone::Reference`.
    pub reference_tz: Tz,
}

impl Default for ClassificationCriteria {
    /// Between -$7 and -$4 at a cafe on a weekday, no time-of-day rule.
    fn default() -> Self {
        Self {
            min_units: -700,
            max_units: -400,
            hours: None,
            required_category: DEFAULT_CATEGORY.to_string(),
            reference_tz: DEFAULT_TIMEZONE,
        }
    }
}

/// Resolved clock for the hour rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourClock {
    Embedded,
    Utc,
    Zone(Tz),
}

/// A single classification rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    AmountBetween { min: i64, max: i64 },
    HourBetween { min: u32, max: u32, clock: HourClock },
    Weekday { tz: Tz },
    NotForeign,
    Category { id: String },
}

impl Predicate {
    pub fn evaluate(&self, tx: &Transaction) -> bool {
        match self {
            Predicate::AmountBetween { min, max } => tx.amount >= *min && tx.amount <= *max,

            Predicate::HourBetween { min, max, clock } => {
                let hour = match clock {
                    HourClock::Embedded => tx.created_at.hour(),
                    HourClock::Utc => tx.created_at.with_timezone(&Utc).hour(),
                    HourClock::Zone(tz) => tx.created_at.with_timezone(tz).hour(),
                };
                hour >= *min && hour <= *max
            }

            Predicate::Weekday { tz } => {
                let day = tx.created_at.with_timezone(tz).weekday();
                !matches!(day, Weekday::Sat | Weekday::Sun)
            }

            Predicate::NotForeign => !tx.is_foreign,

            // Missing category never matches.
            Predicate::Category { id } => tx.category_id.as_deref() == Some(id.as_str()),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::AmountBetween { min, max } => write!(f, "amount between {min} and {max}"),
            Predicate::HourBetween { min, max, clock } => match clock {
                HourClock::Embedded => write!(f, "hour between {min} and {max}"),
                HourClock::Utc => write!(f, "hour between {min} and {max} UTC"),
                HourClock::Zone(tz) => write!(f, "hour between {min} and {max} in {tz}"),
            },
            Predicate::Weekday { tz } => write!(f, "weekday in {tz}"),
            Predicate::NotForeign => f.write_str("not foreign"),
            Predicate::Category { id } => write!(f, "category {id}"),
        }
    }
}

impl ClassificationCriteria {
    /// The ordered predicate list.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = vec![Predicate::AmountBetween {
            min: self.min_units,
            max: self.max_units,
        }];

        if let Some(window) = self.hours {
            let clock = match window.zone {
                HourZone::Embedded => HourClock::Embedded,
                HourZone::Utc => HourClock::Utc,
                HourZone::Reference => HourClock::Zone(self.reference_tz),
            };
            predicates.push(Predicate::HourBetween {
                min: window.min_hour,
                max: window.max_hour,
                clock,
            });
        }

        predicates.push(Predicate::Weekday {
            tz: self.reference_tz,
        });
        predicates.push(Predicate::NotForeign);
        predicates.push(Predicate::Category {
            id: self.required_category.clone(),
        });
        predicates
    }

    /// Returns the first predicate the transaction fails, if any.
    pub fn first_failure(&self, tx: &Transaction) -> Option<Predicate> {
        self.predicates().into_iter().find(|p| !p.evaluate(tx))
    }

    pub fn qualifies(&self, tx: &Transaction) -> bool {
        self.first_failure(tx).is_none()
    }
}
