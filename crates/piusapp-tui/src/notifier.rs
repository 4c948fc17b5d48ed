//! Notification sinks for the terminal client.

use tracing::info;

use piusapp_core::push::{Notification, NotificationSink};

/// Prints notifications to stdout, for the `--push` command.
pub struct ConsoleNotifier;

impl NotificationSink for ConsoleNotifier {
    fn show(&self, notification: &Notification) {
        println!("{}", notification.title);
        if !notification.body.is_empty() {
            println!("  {}", notification.body);
        }
    }

    fn refresh_widget(&self) {
        println!("  (cached schedule updated)");
    }
}

/// Only logs. Used while the full-screen UI owns the terminal.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn show(&self, notification: &Notification) {
        info!(title = %notification.title, "Notification");
    }
}
