//! Call setup on top of a [`TokenSource`] and an [`RtcEngine`].
//!
//! The orchestrator fetches a token first and only touches the engine once it has one, so a
//! rejected fetch never leaves a half-initialized engine behind.

// self
use crate::{
	_prelude::*,
	auth::{ChannelName, Role},
	issuer::IssuedToken,
	obs::{self, OperationKind, OperationSpan, Outcome},
};

/// Boxed future returned by [`TokenSource::fetch`].
pub type TokenSourceFuture<'a> =
	Pin<Box<dyn Future<Output = Result<IssuedToken>> + 'a + Send>>;

/// Boxed future returned by [`RtcEngine`] operations.
pub type EngineFuture<'a> =
	Pin<Box<dyn Future<Output = Result<(), EngineError>> + 'a + Send>>;

/// Anything that can hand out channel tokens for the signed-in user.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Obtains a token for `channel`/`uid`/`role`.
	fn fetch<'a>(
		&'a self,
		channel: &'a ChannelName,
		uid: u32,
		role: Role,
	) -> TokenSourceFuture<'a>;
}

/// Media transport the call joins once a token is in hand.
pub trait RtcEngine
where
	Self: Send + Sync,
{
	/// Prepares the engine for `app_id`.
	fn initialize<'a>(&'a self, app_id: &'a str) -> EngineFuture<'a>;

	/// Joins `channel` as `uid` using `token`.
	fn join_channel<'a>(
		&'a self,
		token: &'a str,
		channel: &'a ChannelName,
		uid: u32,
	) -> EngineFuture<'a>;

	/// Leaves whatever channel the engine is in.
	fn leave_channel(&self) -> EngineFuture<'_>;
}

/// Failure reported by an [`RtcEngine`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("RTC engine failure: {message}.")]
pub struct EngineError {
	/// Engine-supplied description.
	pub message: String,
}
impl EngineError {
	/// Creates an engine error from any displayable message.
	pub fn new(message: impl Display) -> Self {
		Self { message: message.to_string() }
	}
}

/// Which user action the call setup served.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallIntent {
	/// The local user is placing the call.
	Start,
	/// The local user is answering an incoming call.
	Accept,
}
impl CallIntent {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallIntent::Start => "start_call",
			CallIntent::Accept => "accept_call",
		}
	}

	/// Message shown to the user when setup fails for any reason other than a missing session.
	pub const fn failure_message(self) -> &'static str {
		match self {
			CallIntent::Start => "Failed to start call",
			CallIntent::Accept => "Failed to accept call",
		}
	}
}

/// Underlying cause of a failed call setup.
#[derive(Debug, ThisError)]
pub enum CallFailure {
	/// The token could not be obtained.
	#[error(transparent)]
	Token(#[from] Error),
	/// The engine refused to initialize or join.
	#[error(transparent)]
	Engine(#[from] EngineError),
}

/// Call setup error whose `Display` is the message to show the user.
#[derive(Debug, ThisError)]
pub enum CallError {
	/// The user is signed out.
	#[error("No active session")]
	NoActiveSession,
	/// Setup failed; the cause is kept for logs only.
	#[error("{}", .intent.failure_message())]
	Failed {
		/// Action being served.
		intent: CallIntent,
		/// What went wrong.
		#[source]
		cause: CallFailure,
	},
}
impl CallError {
	fn from_failure(intent: CallIntent, cause: CallFailure) -> Self {
		match cause {
			CallFailure::Token(Error::NoActiveSession) => CallError::NoActiveSession,
			cause => CallError::Failed { intent, cause },
		}
	}

	/// Message to show the user.
	pub fn user_message(&self) -> String {
		self.to_string()
	}
}

/// A joined call; drop it without [`ActiveCall::leave`] only when the engine is torn down anyway.
#[derive(Clone)]
pub struct ActiveCall {
	engine: Arc<dyn RtcEngine>,
	/// Channel the engine joined.
	pub channel: ChannelName,
	/// Uid the engine joined as.
	pub uid: u32,
	/// Role the token granted.
	pub role: Role,
	/// When the token stops admitting new joins.
	pub token_expires_at: OffsetDateTime,
}
impl ActiveCall {
	/// Leaves the channel.
	pub async fn leave(self) -> Result<(), EngineError> {
		self.engine.leave_channel().await.inspect_err(|e| {
			tracing::warn!(error = %e, channel = %self.channel, "Leaving the channel failed.");
		})
	}
}
impl Debug for ActiveCall {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ActiveCall")
			.field("channel", &self.channel)
			.field("uid", &self.uid)
			.field("role", &self.role)
			.field("token_expires_at", &self.token_expires_at)
			.finish()
	}
}

/// Fetches a token and joins the channel for call start and call accept.
#[derive(Clone)]
pub struct CallOrchestrator {
	tokens: Arc<dyn TokenSource>,
	engine: Arc<dyn RtcEngine>,
}
impl CallOrchestrator {
	/// Creates an orchestrator over a token source and an engine.
	pub fn new(tokens: Arc<dyn TokenSource>, engine: Arc<dyn RtcEngine>) -> Self {
		Self { tokens, engine }
	}

	/// Places a call on `channel`.
	pub async fn start_call(
		&self,
		channel: &ChannelName,
		uid: u32,
		role: Role,
	) -> Result<ActiveCall, CallError> {
		self.connect(CallIntent::Start, channel, uid, role).await
	}

	/// Answers a call on `channel`.
	pub async fn accept_call(
		&self,
		channel: &ChannelName,
		uid: u32,
		role: Role,
	) -> Result<ActiveCall, CallError> {
		self.connect(CallIntent::Accept, channel, uid, role).await
	}

	async fn connect(
		&self,
		intent: CallIntent,
		channel: &ChannelName,
		uid: u32,
		role: Role,
	) -> Result<ActiveCall, CallError> {
		const KIND: OperationKind = OperationKind::SetupCall;

		let span = OperationSpan::new(KIND, intent.as_str());

		obs::record_operation_outcome(KIND, Outcome::Attempt);

		let result = span
			.instrument(async {
				let issued = self.tokens.fetch(channel, uid, role).await?;

				self.engine.initialize(&issued.app_id).await?;
				self.engine.join_channel(&issued.token, channel, uid).await?;

				Ok::<_, CallFailure>(issued)
			})
			.await;

		obs::record_operation_outcome(KIND, Outcome::of(&result));

		match result {
			Ok(issued) => Ok(ActiveCall {
				engine: self.engine.clone(),
				channel: channel.clone(),
				uid,
				role,
				token_expires_at: issued.expires_at,
			}),
			Err(cause) => {
				tracing::warn!(error = %cause, channel = %channel, uid, "Call setup failed.");

				Err(CallError::from_failure(intent, cause))
			},
		}
	}
}
impl Debug for CallOrchestrator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CallOrchestrator(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn user_messages_hide_causes() {
		let missing = CallError::from_failure(CallIntent::Start, Error::NoActiveSession.into());

		assert!(matches!(missing, CallError::NoActiveSession));
		assert_eq!(missing.user_message(), "No active session");

		let rejected = CallError::from_failure(
			CallIntent::Accept,
			Error::TokenEndpointRejected { status: 401, message: "Unauthorized".into() }.into(),
		);

		assert_eq!(rejected.user_message(), "Failed to accept call");

		let engine =
			CallError::from_failure(CallIntent::Start, EngineError::new("no camera").into());

		assert_eq!(engine.user_message(), "Failed to start call");
	}
}
