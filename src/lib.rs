//! Short-lived, role-scoped RTC channel tokens behind a rate-limited, session-authenticated HTTP
//! endpoint, plus the client fetcher and call orchestration that consume them.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod call;
#[cfg(feature = "reqwest")] pub mod client;
pub mod config;
pub mod error;
pub mod ext;
pub mod guard;
#[cfg(feature = "reqwest")] pub mod http;
pub mod issuer;
pub mod obs;
pub mod server;
pub mod store;
pub mod token;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		auth::TokenSecret,
		ext::{FixedWindow, SessionFuture, SessionIdentity, SessionProvider},
		issuer::{MintCredentials, TokenIssuer},
		store::MemoryRateLimitStore,
	};

	/// Application identifier used by test fixtures.
	pub const TEST_APP_ID: &str = "970CA35de60c44645bbae8a215061b33";
	/// Certificate used by test fixtures.
	pub const TEST_APP_CERT: &str = "5CFd2fd1755d40ecb72977518be15d3b";
	/// Bearer token [`StaticSessionProvider`] accepts.
	pub const TEST_BEARER: &str = "session-token-1";

	/// Session provider that accepts exactly one bearer token and counts lookups.
	#[derive(Debug)]
	pub struct StaticSessionProvider {
		valid: String,
		identity: SessionIdentity,
		calls: AtomicUsize,
	}
	impl StaticSessionProvider {
		/// Accepts `valid` as the session of `user_id`.
		pub fn new(valid: impl Into<String>, user_id: impl Into<String>) -> Self {
			Self {
				valid: valid.into(),
				identity: SessionIdentity::new(user_id),
				calls: AtomicUsize::new(0),
			}
		}

		/// Number of lookups performed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl Default for StaticSessionProvider {
		fn default() -> Self {
			Self::new(TEST_BEARER, "farmer-1")
		}
	}
	impl SessionProvider for StaticSessionProvider {
		fn resolve<'a>(&'a self, bearer: &'a TokenSecret) -> SessionFuture<'a> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let found = (bearer.expose() == self.valid).then(|| self.identity.clone());

			Box::pin(async move { Ok(found) })
		}
	}

	/// Complete signing credentials for fixtures.
	pub fn test_credentials() -> MintCredentials {
		MintCredentials::new(TEST_APP_ID, TokenSecret::new(TEST_APP_CERT))
	}

	/// Builds an issuer with the standard guards, an in-memory limiter enforcing `budget`, and a
	/// [`StaticSessionProvider`].
	pub fn build_test_issuer(
		budget: FixedWindow,
		credentials: MintCredentials,
	) -> (TokenIssuer, Arc<StaticSessionProvider>) {
		let provider = Arc::new(StaticSessionProvider::default());
		let authenticator = crate::auth::SessionAuthenticator::new(provider.clone());
		let limiter = Arc::new(MemoryRateLimitStore::new(budget));
		let issuer = TokenIssuer::new(limiter, authenticator, credentials);

		(issuer, provider)
	}

	/// Builds a reqwest HTTP client suitable for talking to `httpmock` servers.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> crate::http::ReqwestHttpClient {
		crate::http::ReqwestHttpClient::with_timeout(Duration::seconds(5))
			.expect("Failed to build Reqwest client for tests.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use error::{Error, Result};
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tower as _};
