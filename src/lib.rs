//! Floodgate - Fixed-Window Request Limiting
//!
//! This crate implements a fixed-window request limiter keyed by client
//! identity. A request-handling layer extracts a [`ClientKey`] for each
//! incoming request and asks the [`Limiter`] for a [`Decision`] before
//! processing it. The limiter can be embedded directly or run as a small
//! standalone decision service over TCP.
//!
//! ```
//! use floodgate::{ClientKey, Limiter, LimiterConfig};
//!
//! let config = LimiterConfig::new(1000, 3, "Too many requests").unwrap();
//! let limiter = Limiter::new(config);
//! let key = ClientKey::from("10.0.0.1");
//!
//! for t in 0..3 {
//!     assert!(limiter.check(&key, t).allowed);
//! }
//! assert!(!limiter.check(&key, 3).allowed);
//! assert!(limiter.check(&key, 1000).allowed);
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod server;

pub use error::{FloodgateError, Result};
pub use ratelimit::{ClientKey, Decision, Limiter, LimiterConfig};
