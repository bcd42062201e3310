use audiogrid_proto::protocol::{Notification, NotificationLevel, ShellEvent};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Best-effort user-visible notifications.  Callers ignore the result
/// beyond logging it.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Logs every notification and forwards it to connected desktop shells.
pub struct ShellNotifier {
    events: broadcast::Sender<ShellEvent>,
}

impl ShellNotifier {
    pub fn new(events: broadcast::Sender<ShellEvent>) -> Self {
        Self { events }
    }
}

impl NotificationSink for ShellNotifier {
    fn notify(&self, n: &Notification) -> anyhow::Result<()> {
        let line = format!("[{}] {}: {}", n.level.label(), n.title, n.body);
        match n.level {
            NotificationLevel::Error => error!("{}", line),
            NotificationLevel::Warning => warn!("{}", line),
            NotificationLevel::Info | NotificationLevel::Success => info!("{}", line),
        }

        // No shell attached is normal (headless runs).
        if self.events.receiver_count() == 0 {
            return Ok(());
        }
        self.events
            .send(n.clone().into())
            .map_err(|_| anyhow::anyhow!("shell event channel closed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_shell_is_ok() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let notifier = ShellNotifier::new(tx);
        let n = Notification::new(NotificationLevel::Error, "Error", "boom");
        assert!(notifier.notify(&n).is_ok());
    }

    #[test]
    fn test_forwards_to_shell() {
        let (tx, mut rx) = broadcast::channel(4);
        let notifier = ShellNotifier::new(tx);
        let n = Notification::new(NotificationLevel::Warning, "No audio found", "empty folder");
        notifier.notify(&n).unwrap();

        match rx.try_recv().unwrap() {
            ShellEvent::Notification { title, level, .. } => {
                assert_eq!(title, "No audio found");
                assert_eq!(level, NotificationLevel::Warning);
            }
            other => panic!("Wrong event: {:?}", other),
        }
    }
}
