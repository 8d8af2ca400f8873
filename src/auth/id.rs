//! Strongly typed identifiers enforced at the request boundary.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, $validate:path) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				$validate($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				$validate($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

/// Longest channel name the transport provider accepts, in bytes.
pub const CHANNEL_MAX_LEN: usize = 64;

const CLIENT_KEY_MAX_LEN: usize = 128;
// Punctuation the transport provider accepts in channel names, besides ASCII alphanumerics.
const CHANNEL_PUNCTUATION: &str = " !#$%&()+-:;<=.>?@[]^_{}|~,";

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (channel, client).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (channel, client).
		kind: &'static str,
	},
	/// The identifier contains a character outside the permitted alphabet.
	#[error("{kind} identifier contains unsupported character {character:?}.")]
	UnsupportedCharacter {
		/// Kind of identifier (channel, client).
		kind: &'static str,
		/// First offending character.
		character: char,
	},
	/// The identifier exceeded the allowed byte count.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Kind of identifier (channel, client).
		kind: &'static str,
		/// Maximum permitted byte count.
		max: usize,
	},
}

def_id! { ChannelName, "Real-time channel a token grants access to.", "Channel", validate_channel }
def_id! { ClientKey, "Network identity of a rate-limited caller.", "Client", validate_client_key }

impl ClientKey {
	/// Key used when the caller's address cannot be determined.
	pub fn unknown() -> Self {
		Self("unknown".into())
	}
}

fn validate_channel(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.len() > CHANNEL_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: CHANNEL_MAX_LEN });
	}
	if let Some(character) =
		view.chars().find(|c| !c.is_ascii_alphanumeric() && !CHANNEL_PUNCTUATION.contains(*c))
	{
		return Err(IdentifierError::UnsupportedCharacter { kind, character });
	}

	Ok(())
}

fn validate_client_key(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > CLIENT_KEY_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: CLIENT_KEY_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn channel_names_follow_provider_alphabet() {
		let channel = ChannelName::new("room-42").expect("Channel fixture should be valid.");

		assert_eq!(channel.as_ref(), "room-42");
		assert!(ChannelName::new("market stall #7").is_ok(), "Spaces and `#` are permitted.");
		assert!(matches!(ChannelName::new(""), Err(IdentifierError::Empty { .. })));
		assert!(matches!(
			ChannelName::new("room/42"),
			Err(IdentifierError::UnsupportedCharacter { character: '/', .. })
		));
		assert!(ChannelName::new("caf\u{e9}").is_err(), "Non-ASCII must be rejected.");
	}

	#[test]
	fn channel_length_limit_is_inclusive() {
		let exact = "a".repeat(CHANNEL_MAX_LEN);

		ChannelName::new(&exact).expect("Exact length should succeed.");

		let too_long = "a".repeat(CHANNEL_MAX_LEN + 1);

		assert!(matches!(ChannelName::new(&too_long), Err(IdentifierError::TooLong { .. })));
	}

	#[test]
	fn client_keys_reject_whitespace() {
		assert!(ClientKey::new("203.0.113.7").is_ok());
		assert!(ClientKey::new("::ffff:10.0.0.1").is_ok());
		assert!(ClientKey::new("10.0.0.1 ").is_err());
		assert!(ClientKey::new("").is_err());
		assert_eq!(ClientKey::unknown().as_ref(), "unknown");
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let channel: ChannelName =
			serde_json::from_str("\"room-42\"").expect("Channel should deserialize successfully.");

		assert_eq!(channel.as_ref(), "room-42");
		assert!(serde_json::from_str::<ChannelName>("\"\"").is_err());
		assert!(serde_json::from_str::<ChannelName>("\"a/b\"").is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ClientKey, u8> = HashMap::from_iter([(
			ClientKey::new("198.51.100.1").expect("Client key used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("198.51.100.1"), Some(&7));
	}
}
