//! Desktop notifications when a task reaches its daily goal.
//!
//! macOS goes through `osascript`, Linux through `notify-send`. Other
//! platforms are a no-op. Failures are logged and otherwise ignored.

#[cfg(any(target_os = "macos", target_os = "linux"))]
use std::process::Command;

use crate::timer::TimerEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TITLE: &str = "just 10 minutes";

/// Something that can show a "task finished" message
pub trait Notifier: Send + Sync {
    fn task_finished(&self, task_name: &str);
}

/// Native desktop notifications
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn task_finished(&self, task_name: &str) {
        notify_task_finished(task_name);
    }
}

/// Send a notification that `task_name` hit its goal for today
pub fn notify_task_finished(task_name: &str) {
    let body = format!("{task_name}: goal reached for today");

    #[cfg(target_os = "macos")]
    {
        let script = format!(
            r#"display notification "{}" with title "{}""#,
            body.replace('"', "\\\""),
            TITLE
        );
        if let Err(e) = Command::new("osascript").arg("-e").arg(&script).output() {
            warn!(error = %e, "osascript notification failed");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Err(e) = Command::new("notify-send").arg(TITLE).arg(&body).output() {
            warn!(error = %e, "notify-send notification failed");
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        debug!(%body, title = TITLE, "notifications unsupported on this platform");
    }
}

/// Turns [`TimerEvent::TaskFinished`] into notifications until cancelled.
pub struct NotificationForwarder {
    rx: broadcast::Receiver<TimerEvent>,
    notifier: Box<dyn Notifier>,
    enabled: bool,
    cancel: CancellationToken,
}

impl NotificationForwarder {
    pub fn new(
        rx: broadcast::Receiver<TimerEvent>,
        enabled: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_notifier(rx, Box::new(DesktopNotifier), enabled, cancel)
    }

    pub fn with_notifier(
        rx: broadcast::Receiver<TimerEvent>,
        notifier: Box<dyn Notifier>,
        enabled: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            notifier,
            enabled,
            cancel,
        }
    }

    /// Forward events until cancelled or the channel closes.
    ///
    /// Events already queued when cancellation arrives are still delivered.
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                event = self.rx.recv() => event,
                _ = self.cancel.cancelled() => break,
            };
            if !self.handle(event) {
                return;
            }
        }

        loop {
            let event = match self.rx.try_recv() {
                Ok(event) => Ok(event),
                Err(TryRecvError::Lagged(n)) => Err(RecvError::Lagged(n)),
                Err(_) => break,
            };
            self.handle(event);
        }
    }

    /// Returns whether to keep listening
    fn handle(&self, event: Result<TimerEvent, RecvError>) -> bool {
        match event {
            Ok(TimerEvent::TaskFinished { task_id, name }) => {
                info!(task_id, %name, "task finished");
                if self.enabled {
                    self.notifier.task_finished(&name);
                }
            }
            Ok(TimerEvent::Progress {
                task_id,
                completed_ms,
                goal_ms,
            }) => debug!(task_id, completed_ms, goal_ms, "timer progress"),
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                warn!(lagged = n, "notification forwarder lagged; some events were dropped");
            }
            Err(RecvError::Closed) => {
                debug!("timer event channel closed; stopping notification forwarder");
                return false;
            }
        }
        true
    }
}
