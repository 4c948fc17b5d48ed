//! Authentication module for backend credentials.
//!
//! This module provides:
//! - `Credentials`: username/password pair with the SHA-1 fingerprint the
//!   backend uses to match device tokens to accounts
//! - `CredentialStore`: secure OS-level password storage via keyring

pub mod credentials;

pub use credentials::{CredentialStore, Credentials};
