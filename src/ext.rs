//! Public extension contracts (rate-limit budgeting, session lookup).
//!
//! Both seams are object-safe traits so deployments can swap the process-local defaults for
//! shared backends (a distributed counter, a different identity provider) without touching the
//! issuer.

pub mod rate_limit;
pub mod session;

pub use rate_limit::*;
pub use session::*;
