use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

mod office;
mod webhook;

pub use office::{DayState, GetDayResponse, OfficeState, PutDayRequest};
pub use webhook::{
	AccountAttributes, AccountResource, Money, RawWebhookEvent, TransactionAttributes,
	TransactionResource,
};

// Domain models

/// A bank transaction as seen by the presence engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub id: String,
	/// Minor currency units, negative when money was spent.
	pub amount: i64,
	pub created_at: DateTime<FixedOffset>,
	pub description: String,
	pub is_foreign: bool,
	#[serde(default)]
	pub category_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
	Yes,
	No,
}

impl Presence {
	pub fn from_bool(present: bool) -> Self {
		if present {
			Presence::Yes
		} else {
			Presence::No
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Presence::Yes => "yes",
			Presence::No => "no",
		}
	}

	pub fn is_present(&self) -> bool {
		matches!(self, Presence::Yes)
	}
}

impl fmt::Display for Presence {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Derived, public view of presence. Two presentations are the same output
/// exactly when they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
	pub presence: Presence,
	pub reason: String,
}

// Output models

/// Body posted to the notification webhook on every presence transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
	pub status: String,
	pub description: String,
}

impl From<&Presentation> for NotificationPayload {
	fn from(presentation: &Presentation) -> Self {
		Self {
			status: presentation.presence.to_string(),
			description: presentation.reason.clone(),
		}
	}
}
