//! # wow-validate
//!
//! The five-gate validation pipeline for submitted solutions (Section 4.6
//! of the design): rate limit, format, timestamp, signature, and
//! proof-of-work, run in order with fail-fast semantics.
//!
//! ## Modules
//!
//! - [`rate_limit`] — fixed-window per-key rate limiting
//! - [`signature_cache`] — memoized signature verification outcomes
//! - [`seen`] — replay protection
//! - [`pipeline`] — the gate sequence itself

pub mod pipeline;
pub mod rate_limit;
pub mod seen;
pub mod signature_cache;

pub use pipeline::{Pipeline, RateLimitKeyKind, Stage, ValidationError};
