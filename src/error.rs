//! Broker-level error types shared across the issuer, guards, stores, and the client fetcher.

// self
use crate::{_prelude::*, ext::RetryDirective};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Rate-limit storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeouts, socket binding).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The signing primitive refused the inputs or failed to mint.
	#[error(transparent)]
	Signing(#[from] crate::token::SigningError),

	/// Request fields are missing or malformed.
	#[error("Bad request: {reason}.")]
	BadRequest {
		/// Client-facing reason string.
		reason: &'static str,
	},
	/// The bearer session is absent, malformed, expired, or revoked.
	#[error("Unauthorized.")]
	Unauthorized,
	/// The caller exceeded its request budget for the current window.
	#[error("Rate limited; retry in {}s.", .0.retry_after_secs())]
	RateLimited(RetryDirective),
	/// Deployment configuration required for minting is absent.
	#[error("Server is misconfigured: {missing} is not set.")]
	ServerMisconfigured {
		/// Name of the missing setting.
		missing: &'static str,
	},
	/// No local session exists, so no token can be requested.
	#[error("No active session")]
	NoActiveSession,
	/// The token endpoint refused the request and repeating it unchanged will not help.
	#[error("Token endpoint rejected the request with status {status}: {message}.")]
	TokenEndpointRejected {
		/// HTTP status code.
		status: u16,
		/// Server-supplied message summarizing the rejection.
		message: String,
	},
}
impl Error {
	/// Missing `channel` or `uid` query parameter.
	pub const MISSING_PARAMETERS: &'static str = "Missing channel or uid parameter";
	/// `uid` did not parse as an unsigned 32-bit integer.
	pub const INVALID_UID: &'static str = "Invalid uid parameter";
	/// `role` is neither `publisher` nor `subscriber`.
	pub const INVALID_ROLE: &'static str = "Invalid role parameter";
	/// `channel` violates the channel alphabet or length rules.
	pub const INVALID_CHANNEL: &'static str = "Invalid channel parameter";

	/// Builds a [`Error::BadRequest`] with one of the reason constants.
	pub fn bad_request(reason: &'static str) -> Self {
		Self::BadRequest { reason }
	}

	/// Returns a stable label suitable for log or metric fields.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Storage(_) => "storage",
			Self::Config(_) => "config",
			Self::Transient(_) => "transient",
			Self::Transport(_) => "transport",
			Self::Signing(_) => "signing_failure",
			Self::BadRequest { .. } => "bad_request",
			Self::Unauthorized => "unauthorized",
			Self::RateLimited(_) => "rate_limited",
			Self::ServerMisconfigured { .. } => "server_misconfigured",
			Self::NoActiveSession => "no_active_session",
			Self::TokenEndpointRejected { .. } => "token_endpoint_rejected",
		}
	}

	/// Returns `true` when retrying the same request later may succeed.
	pub const fn is_retryable(&self) -> bool {
		matches!(self, Self::RateLimited(_) | Self::Transient(_) | Self::Transport(_))
	}
}

/// Configuration and validation failures raised while loading settings or building clients.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A required environment variable is not set.
	#[error("Environment variable `{name}` is required.")]
	MissingVar {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds a value that cannot be used.
	#[error("Environment variable `{name}` is invalid: {reason}.")]
	InvalidVar {
		/// Variable name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// A configured endpoint cannot be parsed.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Builds an [`ConfigError::InvalidVar`] from any displayable reason.
	pub fn invalid_var(name: &'static str, reason: impl Display) -> Self {
		Self::InvalidVar { name, reason: reason.to_string() }
	}
}
impl From<url::ParseError> for ConfigError {
	fn from(source: url::ParseError) -> Self {
		Self::InvalidEndpoint { source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// The token endpoint is throttling or temporarily unavailable (`429`, `502`, `503`, `504`).
	#[error("Token endpoint is temporarily unavailable: {message}.")]
	TokenEndpoint {
		/// Server-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// An endpoint responded with JSON that does not match the expected shape.
	#[error("The {endpoint} returned malformed JSON.")]
	ResponseParse {
		/// Human-readable label of the remote endpoint.
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The identity provider answered with an unexpected status.
	#[error("Identity provider returned status {status}.")]
	IdentityProvider {
		/// HTTP status code.
		status: u16,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// Human-readable label of the remote endpoint.
		target: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while serving or calling an endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		target: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { target, source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn kinds_are_stable_labels() {
		assert_eq!(Error::Unauthorized.kind(), "unauthorized");
		assert_eq!(Error::bad_request(Error::MISSING_PARAMETERS).kind(), "bad_request");
		assert_eq!(
			Error::ServerMisconfigured { missing: "AGORA_APP_ID" }.kind(),
			"server_misconfigured"
		);
		assert_eq!(Error::NoActiveSession.kind(), "no_active_session");
	}

	#[test]
	fn no_active_session_displays_bare_message() {
		assert_eq!(Error::NoActiveSession.to_string(), "No active session");
	}

	#[test]
	fn retryability_follows_taxonomy() {
		let directive = RetryDirective::new(OffsetDateTime::now_utc(), Duration::seconds(30));

		assert!(Error::RateLimited(directive).is_retryable());
		assert!(!Error::Unauthorized.is_retryable());
		assert!(!Error::bad_request(Error::INVALID_UID).is_retryable());
		assert!(!Error::ServerMisconfigured { missing: "AGORA_APP_CERT" }.is_retryable());

		let rejected = Error::TokenEndpointRejected { status: 400, message: "Bad".into() };

		assert!(!rejected.is_retryable());
		assert_eq!(rejected.kind(), "token_endpoint_rejected");
	}
}
