//! Core library for piusapp.
//!
//! Everything here is independent of the terminal front end:
//!
//! - `cache`: digest + payload artifacts per data domain on local storage
//! - `api`: conditional fetcher and backend calls (login check, device token)
//! - `models`: substitution schedule and school calendar parsers
//! - `screen`: per-screen load state machine with cancellable fetches
//! - `push`: push message handling and device token registration
//! - `sync`: refresh of every domain in one go
//! - `auth`, `config`: credentials and persisted settings

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod domain;
pub mod models;
pub mod push;
pub mod screen;
pub mod sync;
pub mod utils;

pub use domain::Domain;
