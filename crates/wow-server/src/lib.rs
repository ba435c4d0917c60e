//! # wow-server
//!
//! Ties the PoW protocol stack together into a TCP server: the accept loop,
//! per-connection state machine, and the process-wide collaborators each
//! connection depends on (Section 4.7 and Section 9 of the design).
//!
//! ## Modules
//!
//! - [`config`] — environment-variable configuration (Section 6)
//! - [`state`] — `ServerState`, the explicit, testable collection of
//!   process-wide singletons (Section 9)
//! - [`connection`] — the per-connection state machine (Section 4.7)
//! - [`accept`] — the accept loop, worker-pool backpressure, graceful
//!   shutdown (Section 5)
//! - [`quotes`] — the `QuoteSource` collaborator
//! - [`log_sink`] — the `LogSink` collaborator

pub mod accept;
pub mod config;
pub mod connection;
pub mod log_sink;
pub mod quotes;
pub mod state;
