use crate::config::Settings;
use std::sync::{Arc, Mutex};

/// User-visible notification sink. Fire and forget: the agent never waits
/// on it or reacts to failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: Option<&str>, message: &str);
}

/// Writes notifications to the log (host binary default)
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: Option<&str>, message: &str) {
        match title {
            Some(title) => log::info!("[waypointdb - {}] {}", title, message),
            None => log::info!("[waypointdb] {}", message),
        }
    }
}

/// Keeps every notification, for tests and for hosts that poll
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(Option<String>, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Option<String>, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<(Option<String>, String)> {
        self.messages
            .lock()
            .map(|mut m| std::mem::take(&mut *m))
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: Option<&str>, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((title.map(str::to_string), message.to_string()));
        }
    }
}

/// Forwards to the sink only while debug notifications are switched on
#[derive(Clone)]
pub struct DebugNotifier {
    sink: Arc<dyn Notifier>,
    settings: Settings,
}

impl DebugNotifier {
    pub fn new(sink: Arc<dyn Notifier>, settings: Settings) -> Self {
        DebugNotifier { sink, settings }
    }

    pub fn send(&self, message: &str) {
        self.send_titled(None, message);
    }

    pub fn send_titled(&self, title: Option<&str>, message: &str) {
        if !self.settings.get().debug_notifications {
            return;
        }
        log::debug!("sending notification: {}", message);
        self.sink.notify(title.filter(|t| !t.is_empty()), message);
    }
}
