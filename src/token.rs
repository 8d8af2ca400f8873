//! Signing primitive for RTC channel access tokens.
//!
//! Tokens use the transport provider's `006` layout so the provider can verify them offline with
//! nothing but the shared certificate:
//!
//! ```text
//! message   = u32 salt | u32 ts | privileges
//! signature = HMAC-SHA256(certificate, app_id ‖ channel ‖ account ‖ message)
//! content   = bytes(signature) | u32 crc32(channel) | u32 crc32(account) | bytes(message)
//! token     = "006" ‖ app_id ‖ base64(content)
//! ```
//!
//! `account` is the decimal uid, or the empty string for uid `0`. Every privilege and `ts` carry
//! the same absolute expiry, expressed in unix seconds.

mod pack;

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	auth::{ChannelName, Role, TokenSecret},
	token::pack::{Packer, Unpacker},
};

type HmacSha256 = Hmac<Sha256>;

/// Version prefix of every token minted by this module.
pub const VERSION: &str = "006";

/// Errors raised while minting or verifying tokens.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SigningError {
	/// The application identifier is empty or contains whitespace.
	#[error("App ID must be a non-empty string without whitespace.")]
	InvalidAppId,
	/// The signing certificate is empty.
	#[error("App certificate must not be empty.")]
	EmptyCertificate,
	/// The HMAC implementation refused the certificate as a key.
	#[error("App certificate was rejected as an HMAC key.")]
	KeyRejected,
	/// The expiry instant cannot be represented as unsigned 32-bit unix seconds.
	#[error("Expiry {unix_seconds} is outside the supported unix-seconds range.")]
	ExpiryOutOfRange {
		/// Requested expiry in unix seconds.
		unix_seconds: i64,
	},
	/// The token does not start with the expected version prefix.
	#[error("Token version prefix is not `006`.")]
	VersionMismatch,
	/// The token was minted for a different application.
	#[error("Token was issued for a different app ID.")]
	AppIdMismatch,
	/// The token body cannot be decoded.
	#[error("Token is malformed: {reason}.")]
	Malformed {
		/// What was wrong with the body.
		reason: &'static str,
	},
	/// The token is not bound to the presented channel.
	#[error("Token is not bound to this channel.")]
	ChannelMismatch,
	/// The token is not bound to the presented uid.
	#[error("Token is not bound to this uid.")]
	UidMismatch,
	/// The signature does not match the content.
	#[error("Token signature does not match.")]
	SignatureMismatch,
}

/// Capabilities encoded in a token, keyed by the provider's numeric privilege codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
	/// Join the channel.
	JoinChannel,
	/// Publish an audio stream.
	PublishAudioStream,
	/// Publish a video stream.
	PublishVideoStream,
	/// Publish a data stream.
	PublishDataStream,
}
impl Privilege {
	/// Privileges granted to every role.
	pub const BASE: [Privilege; 1] = [Privilege::JoinChannel];
	/// Additional privileges granted to publishers.
	pub const PUBLISH: [Privilege; 3] = [
		Privilege::PublishAudioStream,
		Privilege::PublishVideoStream,
		Privilege::PublishDataStream,
	];

	/// Returns the provider's numeric code.
	pub const fn code(self) -> u16 {
		match self {
			Privilege::JoinChannel => 1,
			Privilege::PublishAudioStream => 2,
			Privilege::PublishVideoStream => 3,
			Privilege::PublishDataStream => 4,
		}
	}

	/// Maps a numeric code back to a privilege, if it is one this crate mints.
	pub const fn from_code(code: u16) -> Option<Self> {
		match code {
			1 => Some(Privilege::JoinChannel),
			2 => Some(Privilege::PublishAudioStream),
			3 => Some(Privilege::PublishVideoStream),
			4 => Some(Privilege::PublishDataStream),
			_ => None,
		}
	}

	/// Privileges implied by `role`.
	pub fn for_role(role: Role) -> Vec<Privilege> {
		let mut privileges = Privilege::BASE.to_vec();

		if role.can_publish() {
			privileges.extend(Privilege::PUBLISH);
		}

		privileges
	}
}

/// Everything a single token is scoped to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
	/// Channel the token is bound to.
	pub channel: ChannelName,
	/// Participant uid the token is bound to (`0` lets the provider assign one).
	pub uid: u32,
	/// Role determining the publish privileges.
	pub role: Role,
	/// Absolute expiry in unix seconds.
	pub expires_at: u32,
	/// Random value that makes otherwise identical tokens distinct.
	pub salt: u32,
}
impl TokenClaims {
	/// Upper bound (inclusive) of generated salts.
	pub const SALT_MAX: u32 = 99_999_999;

	/// Creates claims expiring at `expires_at` with a freshly drawn salt.
	pub fn new(
		channel: ChannelName,
		uid: u32,
		role: Role,
		expires_at: OffsetDateTime,
	) -> Result<Self, SigningError> {
		let unix_seconds = expires_at.unix_timestamp();
		let expires_at = u32::try_from(unix_seconds)
			.map_err(|_| SigningError::ExpiryOutOfRange { unix_seconds })?;
		let salt = rand::random_range(1..=Self::SALT_MAX);

		Ok(Self { channel, uid, role, expires_at, salt })
	}

	/// Overrides the salt, making the resulting token fully deterministic.
	pub fn with_salt(mut self, salt: u32) -> Self {
		self.salt = salt;

		self
	}

	/// Account string the signature binds to.
	pub fn account(&self) -> String {
		account_for(self.uid)
	}

	fn privileges(&self) -> BTreeMap<u16, u32> {
		Privilege::for_role(self.role)
			.into_iter()
			.map(|privilege| (privilege.code(), self.expires_at))
			.collect()
	}
}

/// Contents recovered from a token whose signature and bindings checked out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedToken {
	/// Salt mixed into the signature.
	pub salt: u32,
	/// Token expiry in unix seconds.
	pub expires_at: u32,
	/// Privileges and their expiries in unix seconds.
	pub privileges: BTreeMap<Privilege, u32>,
}
impl VerifiedToken {
	/// Token expiry as a UTC instant.
	pub fn expires_at_utc(&self) -> OffsetDateTime {
		// `u32` seconds always fall inside the representable range.
		OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.expires_at.into())
	}

	/// Role implied by the encoded privileges.
	pub fn role(&self) -> Role {
		if Privilege::PUBLISH.iter().all(|privilege| self.privileges.contains_key(privilege)) {
			Role::Publisher
		} else {
			Role::Subscriber
		}
	}

	/// Returns `true` when the token is still valid at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at_utc()
	}
}

/// Application identifier paired with the certificate that signs its tokens.
#[derive(Clone, Debug)]
pub struct SigningKey {
	app_id: String,
	certificate: TokenSecret,
}
impl SigningKey {
	/// Validates and pairs the application identifier with its certificate.
	pub fn new(app_id: impl Into<String>, certificate: TokenSecret) -> Result<Self, SigningError> {
		let app_id = app_id.into();

		if app_id.is_empty() || app_id.contains(char::is_whitespace) {
			return Err(SigningError::InvalidAppId);
		}
		if certificate.is_empty() {
			return Err(SigningError::EmptyCertificate);
		}

		Ok(Self { app_id, certificate })
	}

	/// Application identifier the tokens are minted for.
	pub fn app_id(&self) -> &str {
		&self.app_id
	}

	/// Mints a token for `claims`.
	///
	/// The output is a pure function of the key and the claims; the certificate never appears
	/// in it.
	pub fn sign(&self, claims: &TokenClaims) -> Result<String, SigningError> {
		let account = claims.account();
		let mut message = Packer::default();

		message
			.put_u32(claims.salt)
			.put_u32(claims.expires_at)
			.put_privileges(&claims.privileges())?;

		let message = message.into_bytes();
		let signature = self.signature(&claims.channel, &account, &message)?;
		let mut content = Packer::default();

		content
			.put_bytes(&signature)?
			.put_u32(crc32fast::hash(claims.channel.as_bytes()))
			.put_u32(crc32fast::hash(account.as_bytes()))
			.put_bytes(&message)?;

		Ok(format!("{VERSION}{}{}", self.app_id, STANDARD.encode(content.into_bytes())))
	}

	/// Checks that `token` was minted by this key for `channel` and `uid` and decodes it.
	///
	/// Expiry is reported, not enforced; use [`VerifiedToken::is_valid_at`].
	pub fn verify(
		&self,
		token: &str,
		channel: &ChannelName,
		uid: u32,
	) -> Result<VerifiedToken, SigningError> {
		let body = token.strip_prefix(VERSION).ok_or(SigningError::VersionMismatch)?;
		let body = body.strip_prefix(self.app_id.as_str()).ok_or(SigningError::AppIdMismatch)?;
		let content = STANDARD
			.decode(body)
			.map_err(|_| SigningError::Malformed { reason: "body is not base64" })?;
		let mut unpacker = Unpacker::new(&content);
		let signature = unpacker.get_bytes()?;
		let crc_channel = unpacker.get_u32()?;
		let crc_account = unpacker.get_u32()?;
		let message = unpacker.get_bytes()?;

		unpacker.finish()?;

		let account = account_for(uid);

		if crc_channel != crc32fast::hash(channel.as_bytes()) {
			return Err(SigningError::ChannelMismatch);
		}
		if crc_account != crc32fast::hash(account.as_bytes()) {
			return Err(SigningError::UidMismatch);
		}

		self.mac(channel, &account, message)?
			.verify_slice(signature)
			.map_err(|_| SigningError::SignatureMismatch)?;

		let mut unpacker = Unpacker::new(message);
		let salt = unpacker.get_u32()?;
		let expires_at = unpacker.get_u32()?;
		let privileges = unpacker
			.get_privileges()?
			.into_iter()
			.filter_map(|(code, expiry)| Privilege::from_code(code).map(|p| (p, expiry)))
			.collect();

		unpacker.finish()?;

		Ok(VerifiedToken { salt, expires_at, privileges })
	}

	fn mac(
		&self,
		channel: &ChannelName,
		account: &str,
		message: &[u8],
	) -> Result<HmacSha256, SigningError> {
		let mut mac = HmacSha256::new_from_slice(self.certificate.expose().as_bytes())
			.map_err(|_| SigningError::KeyRejected)?;

		mac.update(self.app_id.as_bytes());
		mac.update(channel.as_bytes());
		mac.update(account.as_bytes());
		mac.update(message);

		Ok(mac)
	}

	fn signature(
		&self,
		channel: &ChannelName,
		account: &str,
		message: &[u8],
	) -> Result<Vec<u8>, SigningError> {
		Ok(self.mac(channel, account, message)?.finalize().into_bytes().to_vec())
	}
}

fn account_for(uid: u32) -> String {
	if uid == 0 { String::new() } else { uid.to_string() }
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const APP_ID: &str = "970ca35de60c44645bbae8a215061b33";
	const APP_CERT: &str = "5cfd2fd1755d40ecb72977518be15d3b";

	fn key() -> SigningKey {
		SigningKey::new(APP_ID, TokenSecret::new(APP_CERT))
			.expect("Signing key fixture should be valid.")
	}

	fn channel(name: &str) -> ChannelName {
		ChannelName::new(name).expect("Channel fixture should be valid.")
	}

	fn claims(role: Role) -> TokenClaims {
		TokenClaims::new(channel("room-42"), 12_345, role, macros::datetime!(2026-01-01 00:02 UTC))
			.expect("Claims fixture should be valid.")
			.with_salt(1)
	}

	#[test]
	fn signing_is_deterministic_for_fixed_salt() {
		let first = key().sign(&claims(Role::Publisher)).expect("Publisher token should mint.");
		let second = key().sign(&claims(Role::Publisher)).expect("Publisher token should mint.");

		assert_eq!(first, second);
		assert!(first.starts_with("006970ca35de60c44645bbae8a215061b33"));
		assert!(!first.contains(APP_CERT), "Certificate must never leak into the token.");
	}

	#[test]
	fn salt_changes_the_token() {
		let a = key().sign(&claims(Role::Publisher)).expect("Token should mint.");
		let b = key().sign(&claims(Role::Publisher).with_salt(2)).expect("Token should mint.");

		assert_ne!(a, b);
	}

	#[test]
	fn verify_recovers_expiry_and_role() {
		let expiry = macros::datetime!(2026-01-01 00:02 UTC);
		let token = key().sign(&claims(Role::Publisher)).expect("Token should mint.");
		let verified =
			key().verify(&token, &channel("room-42"), 12_345).expect("Token should verify.");

		assert_eq!(verified.salt, 1);
		assert_eq!(verified.expires_at_utc(), expiry);
		assert_eq!(verified.role(), Role::Publisher);
		assert_eq!(verified.privileges.len(), 4);
		assert!(verified.privileges.values().all(|value| *value == verified.expires_at));
		assert!(verified.is_valid_at(expiry - Duration::seconds(1)));
		assert!(!verified.is_valid_at(expiry));
	}

	#[test]
	fn subscribers_only_join() {
		let token = key().sign(&claims(Role::Subscriber)).expect("Token should mint.");
		let verified =
			key().verify(&token, &channel("room-42"), 12_345).expect("Token should verify.");

		assert_eq!(verified.role(), Role::Subscriber);
		assert_eq!(verified.privileges.keys().copied().collect::<Vec<_>>(), vec![
			Privilege::JoinChannel
		]);
	}

	#[test]
	fn bindings_and_signature_are_enforced() {
		let token = key().sign(&claims(Role::Publisher)).expect("Token should mint.");

		assert_eq!(
			key().verify(&token, &channel("room-43"), 12_345),
			Err(SigningError::ChannelMismatch)
		);
		assert_eq!(key().verify(&token, &channel("room-42"), 1), Err(SigningError::UidMismatch));

		let other = SigningKey::new(APP_ID, TokenSecret::new("another-certificate"))
			.expect("Alternate key should be valid.");

		assert_eq!(
			other.verify(&token, &channel("room-42"), 12_345),
			Err(SigningError::SignatureMismatch)
		);

		let foreign = SigningKey::new("another-app", TokenSecret::new(APP_CERT))
			.expect("Foreign key should be valid.");

		assert_eq!(
			foreign.verify(&token, &channel("room-42"), 12_345),
			Err(SigningError::AppIdMismatch)
		);
		assert_eq!(
			key().verify(&token.replacen("006", "007", 1), &channel("room-42"), 12_345),
			Err(SigningError::VersionMismatch)
		);
	}

	#[test]
	fn tampered_body_is_rejected() {
		let token = key().sign(&claims(Role::Subscriber)).expect("Token should mint.");
		let prefix_len = VERSION.len() + APP_ID.len();
		let mut content =
			STANDARD.decode(&token[prefix_len..]).expect("Minted body should be base64.");
		let last = content.len() - 1;

		// Bump the last privilege expiry byte.
		content[last] ^= 0x01;

		let forged = format!("{}{}", &token[..prefix_len], STANDARD.encode(content));

		assert_eq!(
			key().verify(&forged, &channel("room-42"), 12_345),
			Err(SigningError::SignatureMismatch)
		);
	}

	#[test]
	fn uid_zero_binds_the_empty_account() {
		let claims = TokenClaims::new(
			channel("room-42"),
			0,
			Role::Publisher,
			macros::datetime!(2026-01-01 00:02 UTC),
		)
		.expect("Claims fixture should be valid.");

		assert_eq!(claims.account(), "");

		let token = key().sign(&claims).expect("Token should mint.");

		key().verify(&token, &channel("room-42"), 0).expect("Uid 0 token should verify.");
	}

	#[test]
	fn invalid_inputs_fail_fast() {
		assert_eq!(
			SigningKey::new("", TokenSecret::new(APP_CERT)).map(|_| ()),
			Err(SigningError::InvalidAppId)
		);
		assert_eq!(
			SigningKey::new(APP_ID, TokenSecret::new("")).map(|_| ()),
			Err(SigningError::EmptyCertificate)
		);
		assert!(matches!(
			TokenClaims::new(
				channel("room-42"),
				1,
				Role::Publisher,
				macros::datetime!(2200-01-01 00:00 UTC),
			),
			Err(SigningError::ExpiryOutOfRange { .. })
		));
		assert!(matches!(
			TokenClaims::new(
				channel("room-42"),
				1,
				Role::Publisher,
				macros::datetime!(1969-12-31 23:59 UTC),
			),
			Err(SigningError::ExpiryOutOfRange { .. })
		));
	}

	#[test]
	fn generated_salts_stay_in_range() {
		for _ in 0..64 {
			let salt = TokenClaims::new(
				channel("room-42"),
				7,
				Role::Subscriber,
				macros::datetime!(2026-01-01 00:00 UTC),
			)
			.expect("Claims fixture should be valid.")
			.salt;

			assert!((1..=TokenClaims::SALT_MAX).contains(&salt));
		}
	}
}
