//! Rate limiting logic: identity resolution and the limiter engine.

mod admission;
mod key;
mod limiter;

pub use admission::{AdmissionControl, Decision};
pub use key::{IdentityKey, KeyResolver, ResolvedKey};
pub use limiter::{block_key, RateLimiter};
