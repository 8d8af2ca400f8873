//! Participant roles a channel token can carry.

// self
use crate::_prelude::*;

/// Whether the token holder may send media or only receive it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	/// May publish audio, video, and data streams.
	#[default]
	Publisher,
	/// May join and receive only.
	Subscriber,
}
impl Role {
	/// Returns the wire label used in query strings.
	pub const fn as_str(self) -> &'static str {
		match self {
			Role::Publisher => "publisher",
			Role::Subscriber => "subscriber",
		}
	}

	/// Returns `true` for roles that may publish media.
	pub const fn can_publish(self) -> bool {
		matches!(self, Role::Publisher)
	}
}
impl Display for Role {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Role {
	type Err = UnknownRole;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"publisher" => Ok(Role::Publisher),
			"subscriber" => Ok(Role::Subscriber),
			other => Err(UnknownRole(other.to_owned())),
		}
	}
}

/// Error returned when a role label is neither `publisher` nor `subscriber`.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unknown role `{0}`.")]
pub struct UnknownRole(pub String);

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parses_only_the_two_labels() {
		assert_eq!("publisher".parse::<Role>(), Ok(Role::Publisher));
		assert_eq!("subscriber".parse::<Role>(), Ok(Role::Subscriber));
		assert!("Publisher".parse::<Role>().is_err());
		assert!("admin".parse::<Role>().is_err());
		assert!("".parse::<Role>().is_err());
	}

	#[test]
	fn publisher_is_the_default() {
		assert_eq!(Role::default(), Role::Publisher);
		assert!(Role::Publisher.can_publish());
		assert!(!Role::Subscriber.can_publish());
	}
}
