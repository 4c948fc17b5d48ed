//! Push message handling.
//!
//! A push message always produces a user-visible notification. When it
//! embeds a fresh substitution schedule, the schedule is written to the
//! cache so the next screen load can answer from it.
//!
//! Device tokens are registered with the backend together with the
//! selected grade, the course list and a fingerprint of the login.

pub mod handler;
pub mod registration;

pub use handler::{
    DeepLink, MessageOutcome, Notification, NotificationSink, PushHandler, PushMessage,
    PushNotification, PushSettings,
};
pub use registration::{DeviceRegistrar, DeviceRegistration};
