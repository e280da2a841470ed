//! `advisorly-infra` — concrete backends for the session engine's seams.
//!
//! Two account-store flavors: an in-memory store for development and
//! integration tests, and an HTTP direct transport for the profile loader's
//! REST fallback path against the hosted backend.

pub mod http;
pub mod memory;

pub use http::HttpDirectTransport;
pub use memory::{MemoryAccountStore, MemoryReasonSink};
