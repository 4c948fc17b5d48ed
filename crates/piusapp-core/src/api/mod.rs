//! REST client module for the school backend.
//!
//! The backend serves the substitution schedule and the calendar as JSON
//! documents with an embedded digest. A client that sends the digest of its
//! cached copy gets `304 Not Modified` back when nothing changed.
//!
//! Requests are authenticated with HTTP basic credentials once the user has
//! logged in.

pub mod client;
pub mod error;

pub use client::{ApiClient, ConditionalFetch, FetchResponse, FetchStatus, DEFAULT_BASE_URL};
pub use error::ApiError;
