//! Environment-driven issuer configuration.
//!
//! Every setting is read through a lookup closure so tests can feed a map instead of mutating the
//! process environment. Empty values count as unset.

// std
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	ext::FixedWindow,
	issuer::{MintCredentials, TokenIssuer},
};

/// Identity provider endpoint and public API key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityConfig {
	/// Project URL of the identity provider (`SUPABASE_URL`).
	pub url: Url,
	/// Public API key sent alongside every lookup (`SUPABASE_ANON_KEY`).
	pub anon_key: TokenSecret,
}

/// Everything the token server needs to start.
#[derive(Clone, Debug)]
pub struct IssuerConfig {
	/// TCP port to listen on (`PORT`).
	pub port: u16,
	/// Allowed browser origin (`CLIENT_ORIGIN`); `None` allows any origin.
	pub client_origin: Option<String>,
	/// Signing credentials (`AGORA_APP_ID`, `AGORA_APP_CERT`); checked per request.
	pub credentials: MintCredentials,
	/// Token lifetime (`TOKEN_TTL_SECONDS`).
	pub ttl: Duration,
	/// Identity provider (`SUPABASE_URL`, `SUPABASE_ANON_KEY`).
	pub identity: Option<IdentityConfig>,
	/// Whether to key rate limits on the first `X-Forwarded-For` entry (`TRUST_PROXY`).
	pub trust_proxy: bool,
	/// Fixed-window budget (`RATE_LIMIT_WINDOW_MS`, `RATE_LIMIT_MAX`).
	pub rate_limit: FixedWindow,
}
impl IssuerConfig {
	/// Port used when `PORT` is unset.
	pub const DEFAULT_PORT: u16 = 3001;
	/// Longest accepted token lifetime in seconds.
	pub const MAX_TTL_SECONDS: i64 = 86_400;

	/// Loads `.env` when present, then reads the process environment.
	pub fn load() -> Result<Self, ConfigError> {
		dotenvy::dotenv().ok();

		Self::from_env()
	}

	/// Reads the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads settings through `lookup`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let port = match var("PORT") {
			Some(raw) => raw.trim().parse().map_err(|e| ConfigError::invalid_var("PORT", e))?,
			None => Self::DEFAULT_PORT,
		};
		let ttl_seconds = match var("TOKEN_TTL_SECONDS") {
			Some(raw) => parse_bounded("TOKEN_TTL_SECONDS", &raw, 1, Self::MAX_TTL_SECONDS)?,
			None => TokenIssuer::DEFAULT_TTL.whole_seconds(),
		};
		let window_ms = match var("RATE_LIMIT_WINDOW_MS") {
			Some(raw) => parse_bounded("RATE_LIMIT_WINDOW_MS", &raw, 1, i64::from(u32::MAX))?,
			None => FixedWindow::DEFAULT_WINDOW.whole_milliseconds() as i64,
		};
		let max_requests = match var("RATE_LIMIT_MAX") {
			Some(raw) => parse_bounded("RATE_LIMIT_MAX", &raw, 1, i64::from(u32::MAX))? as u32,
			None => FixedWindow::DEFAULT_MAX_REQUESTS,
		};
		let trust_proxy = match var("TRUST_PROXY") {
			Some(raw) => parse_flag("TRUST_PROXY", &raw)?,
			None => false,
		};
		let identity = match (var("SUPABASE_URL"), var("SUPABASE_ANON_KEY")) {
			(Some(url), Some(anon_key)) => Some(IdentityConfig {
				url: Url::parse(url.trim())?,
				anon_key: TokenSecret::new(anon_key.trim()),
			}),
			(None, None) => None,
			(Some(_), None) => return Err(ConfigError::MissingVar { name: "SUPABASE_ANON_KEY" }),
			(None, Some(_)) => return Err(ConfigError::MissingVar { name: "SUPABASE_URL" }),
		};

		Ok(Self {
			port,
			client_origin: var("CLIENT_ORIGIN").map(|origin| origin.trim().to_owned()),
			credentials: MintCredentials {
				app_id: var(MintCredentials::APP_ID_VAR).map(|id| id.trim().to_owned()),
				app_certificate: var(MintCredentials::APP_CERT_VAR)
					.map(|cert| TokenSecret::new(cert.trim())),
			},
			ttl: Duration::seconds(ttl_seconds),
			identity,
			trust_proxy,
			rate_limit: FixedWindow::new(Duration::milliseconds(window_ms), max_requests),
		})
	}

	/// Identity provider settings, required by the server binary.
	pub fn require_identity(&self) -> Result<&IdentityConfig, ConfigError> {
		self.identity.as_ref().ok_or(ConfigError::MissingVar { name: "SUPABASE_URL" })
	}

	/// Address the server binds to (all interfaces).
	pub fn bind_addr(&self) -> SocketAddr {
		SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
	}
}

fn parse_bounded(name: &'static str, raw: &str, min: i64, max: i64) -> Result<i64, ConfigError> {
	let value = raw.trim().parse::<i64>().map_err(|e| ConfigError::invalid_var(name, e))?;

	if !(min..=max).contains(&value) {
		return Err(ConfigError::invalid_var(name, format!("must be between {min} and {max}")));
	}

	Ok(value)
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" => Ok(true),
		"0" | "false" | "no" => Ok(false),
		other => Err(ConfigError::invalid_var(name, format!("`{other}` is not a boolean"))),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config(vars: &[(&str, &str)]) -> Result<IssuerConfig, ConfigError> {
		let vars = vars
			.iter()
			.map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
			.collect::<HashMap<_, _>>();

		IssuerConfig::from_lookup(|name| vars.get(name).cloned())
	}

	#[test]
	fn defaults_apply_when_unset() {
		let config = config(&[]).expect("Empty environment should load.");

		assert_eq!(config.port, 3001);
		assert_eq!(config.ttl, Duration::seconds(120));
		assert_eq!(config.rate_limit, FixedWindow::default());
		assert!(!config.trust_proxy);
		assert!(config.identity.is_none());
		assert!(config.credentials.app_id.is_none());
		assert!(matches!(
			config.require_identity(),
			Err(ConfigError::MissingVar { name: "SUPABASE_URL" })
		));
	}

	#[test]
	fn values_are_parsed() {
		let config = config(&[
			("PORT", "8080"),
			("CLIENT_ORIGIN", "https://market.example"),
			("AGORA_APP_ID", "app"),
			("AGORA_APP_CERT", "cert"),
			("TOKEN_TTL_SECONDS", "600"),
			("SUPABASE_URL", "https://project.supabase.example"),
			("SUPABASE_ANON_KEY", "anon"),
			("TRUST_PROXY", "true"),
			("RATE_LIMIT_WINDOW_MS", "1000"),
			("RATE_LIMIT_MAX", "3"),
		])
		.expect("Complete environment should load.");

		assert_eq!(config.port, 8080);
		assert_eq!(config.client_origin.as_deref(), Some("https://market.example"));
		assert_eq!(config.ttl, Duration::seconds(600));
		assert!(config.trust_proxy);
		assert_eq!(config.rate_limit, FixedWindow::new(Duration::seconds(1), 3));
		assert_eq!(
			config.require_identity().expect("Identity is configured.").url.as_str(),
			"https://project.supabase.example/"
		);
		config.credentials.signing_key().expect("Credentials are complete.");
	}

	#[test]
	fn invalid_values_are_rejected() {
		for vars in [
			[("TOKEN_TTL_SECONDS", "0")],
			[("TOKEN_TTL_SECONDS", "86401")],
			[("TOKEN_TTL_SECONDS", "two minutes")],
			[("PORT", "70000")],
			[("RATE_LIMIT_MAX", "0")],
			[("TRUST_PROXY", "maybe")],
		] {
			assert!(
				matches!(config(&vars), Err(ConfigError::InvalidVar { .. })),
				"{vars:?} should be rejected."
			);
		}
	}

	#[test]
	fn identity_settings_come_in_pairs() {
		assert!(matches!(
			config(&[("SUPABASE_URL", "https://project.supabase.example")]),
			Err(ConfigError::MissingVar { name: "SUPABASE_ANON_KEY" })
		));
		assert!(matches!(
			config(&[("SUPABASE_URL", "not a url"), ("SUPABASE_ANON_KEY", "anon")]),
			Err(ConfigError::InvalidEndpoint { .. })
		));
	}

	#[test]
	fn empty_values_count_as_unset() {
		let config =
			config(&[("PORT", ""), ("AGORA_APP_ID", "  ")]).expect("Blank values are unset.");

		assert_eq!(config.port, IssuerConfig::DEFAULT_PORT);
		assert!(config.credentials.app_id.is_none());
	}
}
