//! HTTP surface: `GET /health` and `GET /api/token`.
//!
//! Handlers only translate between HTTP and [`TokenIssuer`]; every rejection is an [`Error`]
//! rendered by its [`IntoResponse`] impl so status codes and bodies stay in one table.

// std
use std::net::SocketAddr;
// crates.io
use axum::{
	Json, Router,
	extract::{ConnectInfo, Query, State},
	http::{
		HeaderMap, HeaderValue, Method, StatusCode,
		header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER},
	},
	response::{IntoResponse, Response},
	routing::get,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
// self
use crate::{
	_prelude::*,
	auth::ClientKey,
	error::{ConfigError, TransportError},
	guard::Caller,
	issuer::{RawTokenRequest, TokenIssuer},
	store::MemoryRateLimitStore,
};

/// Body of every `429` response.
pub const RATE_LIMITED_MESSAGE: &str =
	"Too many token requests from this IP, please try again later";
/// Body `error` field for configuration failures.
pub const MISCONFIGURED_MESSAGE: &str = "Server configuration error";
/// Body `error` field for every other server-side failure.
pub const MINT_FAILED_MESSAGE: &str = "Failed to generate token";

const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Clone)]
struct AppState {
	issuer: Arc<TokenIssuer>,
	trust_proxy: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthBody {
	status: &'static str,
	#[serde(with = "time::serde::rfc3339")]
	timestamp: OffsetDateTime,
}

/// Token server wiring: issuer, proxy trust, and CORS policy.
#[derive(Debug)]
pub struct TokenServer {
	issuer: Arc<TokenIssuer>,
	trust_proxy: bool,
	client_origin: Option<String>,
}
impl TokenServer {
	/// Creates a server that keys rate limits on the peer address and allows any origin.
	pub fn new(issuer: TokenIssuer) -> Self {
		Self { issuer: Arc::new(issuer), trust_proxy: false, client_origin: None }
	}

	/// Keys rate limits on the first `X-Forwarded-For` entry when `trust` is set.
	pub fn with_trust_proxy(mut self, trust: bool) -> Self {
		self.trust_proxy = trust;

		self
	}

	/// Restricts CORS to a single browser origin.
	pub fn with_client_origin(mut self, origin: impl Into<String>) -> Self {
		self.client_origin = Some(origin.into());

		self
	}

	/// Builds the router.
	///
	/// Handlers read the peer address from [`ConnectInfo`] when present; serve the router with
	/// `into_make_service_with_connect_info::<SocketAddr>()` so per-address limits apply.
	pub fn router(&self) -> Result<Router, ConfigError> {
		let cors = match &self.client_origin {
			Some(origin) => CorsLayer::new()
				.allow_origin(
					HeaderValue::from_str(origin)
						.map_err(|e| ConfigError::invalid_var("CLIENT_ORIGIN", e))?,
				)
				.allow_methods([Method::GET])
				.allow_headers([AUTHORIZATION, CONTENT_TYPE]),
			None => CorsLayer::permissive(),
		};
		let state = AppState { issuer: self.issuer.clone(), trust_proxy: self.trust_proxy };

		Ok(Router::new()
			.route("/health", get(health))
			.route("/api/token", get(issue_token))
			.layer(cors)
			.layer(TraceLayer::new_for_http())
			.with_state(state))
	}

	/// Serves on `listener` until `shutdown` resolves.
	pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
	where
		F: 'static + Send + Future<Output = ()>,
	{
		let router = self.router()?;

		if let Ok(addr) = listener.local_addr() {
			tracing::info!(%addr, trust_proxy = self.trust_proxy, "Token server listening.");
		}

		axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
			.with_graceful_shutdown(shutdown)
			.await
			.map_err(TransportError::from)?;

		Ok(())
	}
}

/// Resolves once the process receives Ctrl-C.
pub async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for the shutdown signal.");

		std::future::pending::<()>().await;
	}

	tracing::info!("Shutdown signal received.");
}

/// Periodically drops elapsed rate-limit windows so idle callers do not accumulate.
pub fn spawn_window_purge(store: MemoryRateLimitStore, every: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(every.unsigned_abs());

		loop {
			ticker.tick().await;

			let purged = store.purge_expired(OffsetDateTime::now_utc());

			if purged > 0 {
				tracing::debug!(purged, remaining = store.len(), "Purged idle rate-limit windows.");
			}
		}
	})
}

async fn health() -> Json<HealthBody> {
	Json(HealthBody { status: "ok", timestamp: OffsetDateTime::now_utc() })
}

async fn issue_token(
	State(state): State<AppState>,
	peer: Option<ConnectInfo<SocketAddr>>,
	headers: HeaderMap,
	Query(request): Query<RawTokenRequest>,
) -> Response {
	let client_key = client_key(&headers, peer.map(|ConnectInfo(addr)| addr), state.trust_proxy);
	let mut caller = Caller::new(client_key);

	if let Some(header) = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()) {
		caller = caller.with_authorization(header);
	}

	match state.issuer.issue(request, caller).await {
		Ok(issued) => Json(issued).into_response(),
		Err(e) => e.into_response(),
	}
}

fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> ClientKey {
	let forwarded = trust_proxy
		.then(|| headers.get(FORWARDED_FOR)?.to_str().ok()?.split(',').next().map(str::trim))
		.flatten()
		.filter(|entry| !entry.is_empty())
		.map(str::to_owned);

	forwarded
		.or_else(|| peer.map(|addr| addr.ip().to_string()))
		.and_then(|raw| ClientKey::new(raw).ok())
		.unwrap_or_else(ClientKey::unknown)
}

fn error_body(status: StatusCode, error: &'static str) -> Response {
	(status, Json(ErrorBody { error })).into_response()
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		match self {
			Error::BadRequest { reason } => error_body(StatusCode::BAD_REQUEST, reason),
			Error::Unauthorized => error_body(StatusCode::UNAUTHORIZED, "Unauthorized"),
			Error::RateLimited(directive) => (
				StatusCode::TOO_MANY_REQUESTS,
				[(RETRY_AFTER, directive.retry_after_secs().to_string())],
				RATE_LIMITED_MESSAGE,
			)
				.into_response(),
			Error::ServerMisconfigured { .. } | Error::Config(_) =>
				error_body(StatusCode::INTERNAL_SERVER_ERROR, MISCONFIGURED_MESSAGE),
			other => {
				tracing::error!(error = %other, kind = other.kind(), "Token request failed.");

				error_body(StatusCode::INTERNAL_SERVER_ERROR, MINT_FAILED_MESSAGE)
			},
		}
	}
}
