//! # Settings Loader
//!
//! Process configuration for the presence service. Everything is read once
//! at startup from the environment (a `.env` file is honoured through
//! `dotenvy`); nothing is re-read at runtime.
//!
//! The classification criteria default to the deployed values and can be
//! replaced as a whole by a JSON file named in `CRITERIA_PATH`:
//!
//! ```json
//! {
//!   "min_units": -700,
//!   "max_units": -400,
//!   "hours": { "min_hour": 6, "max_hour": 12, "zone": "reference" },
//!   "required_category": "restaurants-and-cafes"
//! }
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! let settings = settings_loader::Settings::load()?;
//! println!("listening on {}:{}", settings.host, settings.port);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use presence::FreshnessPolicy;
use rules::{ClassificationCriteria, HourWindow};
use serde::Deserialize;

pub const DEFAULT_OFFICE_TRACKER_URL: &str = "https://officetracker.baileys.page";

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub office_tracker_url: String,
    pub office_tracker_api_key: String,
    pub office_timeout: Duration,
    pub office_poll_interval: Duration,
    pub assert_office: bool,
    pub notify_webhook_url: Option<String>,
    pub notify_timeout: Duration,
    pub timezone: Tz,
    pub freshness: FreshnessPolicy,
    pub transaction_store_path: Option<PathBuf>,
    pub criteria: ClassificationCriteria,
}

/// Criteria file layout. The timezone comes from `PRESENCE_TIMEZONE`.
#[derive(Debug, Deserialize)]
struct CriteriaFile {
    min_units: i64,
    max_units: i64,
    #[serde(default)]
    hours: Option<HourWindow>,
    required_category: String,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let timezone: Tz = match get("PRESENCE_TIMEZONE") {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow!("Invalid PRESENCE_TIMEZONE '{raw}': {e}"))?,
            None => rules::DEFAULT_TIMEZONE,
        };

        let freshness = match get("FRESHNESS_POLICY").unwrap_or("midnight") {
            "midnight" => FreshnessPolicy::SinceMidnight,
            "rolling" => {
                let hours = parse_or("FRESHNESS_WINDOW_HOURS", get("FRESHNESS_WINDOW_HOURS"), 12i64)?;
                if hours <= 0 {
                    return Err(anyhow!("FRESHNESS_WINDOW_HOURS must be positive, got {hours}"));
                }
                FreshnessPolicy::Rolling(chrono::Duration::hours(hours))
            }
            other => {
                return Err(anyhow!(
                    "Invalid FRESHNESS_POLICY '{other}' (expected 'midnight' or 'rolling')"
                ))
            }
        };

        let mut criteria = match get("CRITERIA_PATH") {
            Some(path) => load_criteria(path)?,
            None => ClassificationCriteria::default(),
        };
        criteria.reference_tz = timezone;

        let poll_secs = parse_or("OFFICE_POLL_INTERVAL_SECS", get("OFFICE_POLL_INTERVAL_SECS"), 300u64)?;
        if poll_secs == 0 {
            return Err(anyhow!("OFFICE_POLL_INTERVAL_SECS must be positive"));
        }

        Ok(Self {
            host: get("HOST").unwrap_or("0.0.0.0").to_string(),
            port: parse_or("PORT", get("PORT"), 8080u16)?,
            office_tracker_url: get("OFFICETRACKER_BASE_URL")
                .unwrap_or(DEFAULT_OFFICE_TRACKER_URL)
                .to_string(),
            office_tracker_api_key: get("OFFICETRACKER_API_KEY").unwrap_or_default().to_string(),
            office_timeout: Duration::from_secs(parse_or("OFFICE_TIMEOUT_SECS", get("OFFICE_TIMEOUT_SECS"), 5u64)?),
            office_poll_interval: Duration::from_secs(poll_secs),
            assert_office: parse_bool("ASSERT_OFFICE", get("ASSERT_OFFICE"), false)?,
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL").map(str::to_string),
            notify_timeout: Duration::from_secs(parse_or("NOTIFY_TIMEOUT_SECS", get("NOTIFY_TIMEOUT_SECS"), 5u64)?),
            timezone,
            freshness,
            transaction_store_path: get("TRANSACTION_STORE_PATH").map(PathBuf::from),
            criteria,
        })
    }
}

fn parse_or<T>(name: &str, raw: Option<&str>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("Invalid {name} '{raw}': {e}")),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, raw: Option<&str>, default: bool) -> Result<bool> {
    match raw {
        Some("1" | "true" | "TRUE" | "yes" | "YES") => Ok(true),
        Some("0" | "false" | "FALSE" | "no" | "NO") => Ok(false),
        Some(other) => Err(anyhow!("Invalid {name} '{other}' (expected true or false)")),
        None => Ok(default),
    }
}

/// Loads classification criteria from a JSON file.
pub fn load_criteria<P: AsRef<Path>>(path: P) -> Result<ClassificationCriteria> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading criteria file: {}", path.display()))?;
    let file: CriteriaFile = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing criteria JSON in {}", path.display()))?;

    if file.min_units > file.max_units {
        return Err(anyhow!(
            "Criteria amount range is empty: {} > {}",
            file.min_units,
            file.max_units
        ));
    }
    if let Some(hours) = file.hours {
        if hours.min_hour > hours.max_hour || hours.max_hour > 23 {
            return Err(anyhow!(
                "Criteria hour range {}..={} is invalid",
                hours.min_hour,
                hours.max_hour
            ));
        }
    }

    Ok(ClassificationCriteria {
        min_units: file.min_units,
        max_units: file.max_units,
        hours: file.hours,
        required_category: file.required_category,
        ..ClassificationCriteria::default()
    })
}
