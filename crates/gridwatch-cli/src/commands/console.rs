use std::io::Write;

use gridwatch_core::error::NotifyError;
use gridwatch_core::{Notification, Notifier, SoundCue, SoundPlayer};

/// Prints notifications to stdout.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "[{}] {}", notification.title, notification.body)
            .and_then(|_| out.flush())
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

/// Terminal bell as the platform sound.
#[derive(Debug, Default)]
pub struct Bell;

impl SoundPlayer for Bell {
    fn play(&self, cue: SoundCue) -> Result<(), NotifyError> {
        tracing::debug!(?cue, "bell");
        let mut out = std::io::stdout().lock();
        out.write_all(b"\x07")
            .and_then(|_| out.flush())
            .map_err(|e| NotifyError::Sound(e.to_string()))
    }
}
