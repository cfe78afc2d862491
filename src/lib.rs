//! Throttles HTTP clients by IP address on top of a pluggable key-value
//! store.
//!
//! ```no_run
//! use kv_throttler::{MemoryStore, Throttler};
//! use std::time::Duration;
//!
//! # async fn run() -> kv_throttler::Result<()> {
//! let throttler = Throttler::builder()
//!     .store(MemoryStore::new())
//!     .throttle_condition(Duration::from_secs(60), 100)
//!     .build()?;
//!
//! throttler.throttle_identity("203.0.113.7").await?;
//! assert_eq!(throttler.attempts_identity("203.0.113.7").await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod key_generator;
mod key_lock;
pub mod middleware;
pub mod record;
pub mod response;
pub mod server;
pub mod store;
pub mod throttler;
pub mod validation;

pub use config::Config;
pub use error::{Result, StoreError, ThrottlerError};
pub use identity::{IdentityProvider, RealIp, RemoteIp};
pub use key_generator::{IdentityKey, KeyGenerator, PrefixedKey, SanitizedKey};
pub use record::ThrottleRecord;
pub use server::create_app;
pub use store::{FsStore, MemoryStore, RedisStore, Store};
pub use throttler::{FailureMode, ThrottleCondition, ThrottleStatus, Throttler};
