//! Token server binary: loads configuration from the environment and serves until Ctrl-C.

// std
use std::sync::Arc;
// crates.io
use tokio::net::TcpListener;
// self
use rtc_token_broker::{
	Result,
	auth::{GoTrueSessionProvider, SessionAuthenticator},
	config::IssuerConfig,
	error::TransportError,
	issuer::TokenIssuer,
	obs,
	server::{self, TokenServer},
	store::MemoryRateLimitStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	obs::init_tracing();

	let config = IssuerConfig::load()?;
	let identity = config.require_identity()?;
	let provider = GoTrueSessionProvider::new(&identity.url, identity.anon_key.clone())?;
	let limiter = MemoryRateLimitStore::new(config.rate_limit);
	let issuer = TokenIssuer::new(
		Arc::new(limiter.clone()),
		SessionAuthenticator::new(Arc::new(provider)),
		config.credentials.clone(),
	)
	.with_ttl(config.ttl);

	if let Err(e) = config.credentials.signing_key() {
		tracing::warn!(error = %e, "Token requests will fail until signing credentials are set.");
	}

	let mut server = TokenServer::new(issuer).with_trust_proxy(config.trust_proxy);

	if let Some(origin) = &config.client_origin {
		server = server.with_client_origin(origin);
	}

	let purge = server::spawn_window_purge(limiter, config.rate_limit.window);
	let listener = TcpListener::bind(config.bind_addr()).await.map_err(TransportError::from)?;
	let served = server.serve(listener, server::shutdown_signal()).await;

	purge.abort();

	served
}
