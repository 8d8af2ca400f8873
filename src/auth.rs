//! Auth-domain identifiers, roles, redacted secrets, and bearer-session authentication.

#[cfg(feature = "reqwest")] pub mod gotrue;
pub mod id;
pub mod role;
pub mod secret;
pub mod session;

#[cfg(feature = "reqwest")] pub use gotrue::*;
pub use id::*;
pub use role::*;
pub use secret::*;
pub use session::*;
