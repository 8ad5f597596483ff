use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSeverity {
    Normal,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: NotificationSeverity,
}

impl Notification {
    pub fn normal(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: NotificationSeverity::Normal,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: NotificationSeverity::Destructive,
        }
    }

    pub fn connection_failed() -> Self {
        Self::destructive(
            "Соединение не удалось",
            "Не удалось подключиться к серверу. Проверьте адрес и что сервер запущен.",
        )
    }
}

/// Fire-and-forget sink for user-visible messages.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

/// Keeps only the most recent notification; overlapping messages replace each other.
pub struct LatestNotifier {
    tx: watch::Sender<Option<Notification>>,
}

impl LatestNotifier {
    pub fn new() -> (Self, watch::Receiver<Option<Notification>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

impl Notifier for LatestNotifier {
    fn notify(&self, notification: Notification) {
        self.tx.send_replace(Some(notification));
    }
}

/// Writes notifications to the log; used when nobody watches the terminal.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            NotificationSeverity::Normal => {
                info!(title = %n.title, description = %n.description, "уведомление")
            }
            NotificationSeverity::Destructive => {
                warn!(title = %n.title, description = %n.description, "уведомление")
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tracing_notifier_logs_by_severity() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingNotifier.notify(Notification::normal("Настройки сохранены", "ok"));
            TracingNotifier.notify(Notification::connection_failed());
        });

        let text = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("title=Настройки сохранены"));
        assert!(lines[0].contains("description=ok"));
        assert!(lines[1].contains("WARN"));
        assert!(lines[1].contains("title=Соединение не удалось"));
    }

    #[test]
    fn latest_notification_wins() {
        let (notifier, rx) = LatestNotifier::new();
        notifier.notify(Notification::normal("a", "first"));
        notifier.notify(Notification::connection_failed());
        let current = rx.borrow().clone().expect("есть уведомление");
        assert_eq!(current.severity, NotificationSeverity::Destructive);
        assert_eq!(current.title, "Соединение не удалось");
    }
}
