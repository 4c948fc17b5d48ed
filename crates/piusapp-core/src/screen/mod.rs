//! Per-screen load state machine.
//!
//! A screen starts `Idle`, moves to `Loading` when it appears or the user
//! refreshes, and ends up `Displaying` a parsed document or `Failed` with an
//! error for the dialog. Fetches run on a spawned task and report back
//! through a channel; completions of cancelled or superseded loads are
//! dropped.

pub mod controller;
pub mod error;

pub use controller::{
    resolve, Applied, LoadCompletion, LoadTicket, Resolution, ScreenController, ScreenState,
};
pub use error::ScreenError;
