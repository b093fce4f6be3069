use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::Transaction;

// Raw webhook input (Up Banking style resources)

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWebhookEvent {
	pub transaction: TransactionResource,
	#[serde(default)]
	pub account: Option<AccountResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResource {
	#[serde(default)]
	pub id: String,
	pub attributes: TransactionAttributes,
	#[serde(default)]
	pub relationships: TransactionRelationships,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAttributes {
	#[serde(default)]
	pub description: String,
	pub amount: Money,
	#[serde(default)]
	pub foreign_amount: Option<Money>,
	pub created_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
	#[serde(default)]
	pub currency_code: String,
	#[serde(default)]
	pub value: String,
	pub value_in_base_units: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRelationships {
	#[serde(default)]
	pub category: Relationship,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relationship {
	#[serde(default)]
	pub data: Option<RelationshipData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipData {
	pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResource {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub attributes: Option<AccountAttributes>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAttributes {
	#[serde(default)]
	pub display_name: String,
}

impl From<TransactionResource> for Transaction {
	fn from(resource: TransactionResource) -> Self {
		let TransactionResource {
			id,
			attributes,
			relationships,
		} = resource;
		Transaction {
			id,
			amount: attributes.amount.value_in_base_units,
			created_at: attributes.created_at,
			description: attributes.description,
			is_foreign: attributes.foreign_amount.is_some(),
			category_id: relationships.category.data.map(|d| d.id),
		}
	}
}
