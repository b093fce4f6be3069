use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Self-reported office state kept by the office tracker service.
///
/// Travels as the tracker's integer enum. Unknown values decode as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OfficeState {
	#[default]
	Untracked,
	WorkFromHome,
	WorkFromOffice,
	Other,
}

impl OfficeState {
	pub fn code(&self) -> u8 {
		match self {
			OfficeState::Untracked => 0,
			OfficeState::WorkFromHome => 1,
			OfficeState::WorkFromOffice => 2,
			OfficeState::Other => 3,
		}
	}

	pub fn from_code(code: u8) -> Self {
		match code {
			0 => OfficeState::Untracked,
			1 => OfficeState::WorkFromHome,
			2 => OfficeState::WorkFromOffice,
			_ => OfficeState::Other,
		}
	}
}

impl Serialize for OfficeState {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u8(self.code())
	}
}

impl<'de> Deserialize<'de> for OfficeState {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let code = u8::deserialize(deserializer)?;
		Ok(OfficeState::from_code(code))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayState {
	pub state: OfficeState,
}

/// `GET /api/v1/state/{year}/{month}/{day}`
#[derive(Debug, Clone, Deserialize)]
pub struct GetDayResponse {
	pub data: DayState,
}

/// `PUT /api/v1/state/{year}/{month}/{day}`
#[derive(Debug, Clone, Serialize)]
pub struct PutDayRequest {
	pub data: DayState,
}
