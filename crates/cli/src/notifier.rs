use std::io::Write;

use livechat_runtime_config::NotificationPermission;
use livechat_sync::Notifier;
use livechat_sync::notify::BoxError;

/// Terminal stand-in for the browser: the bell is the sound and a stderr
/// line is the OS notification.
pub struct TerminalNotifier {
    permission: NotificationPermission,
}

impl TerminalNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self { permission }
    }
}

impl Notifier for TerminalNotifier {
    fn play_sound(&self) -> Result<(), BoxError> {
        let mut err = std::io::stderr().lock();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }

    fn show_notification(&self, title: &str, body: &str) -> Result<(), BoxError> {
        let mut err = std::io::stderr().lock();
        writeln!(err, "{}", format_notification(title, body))?;
        Ok(())
    }

    fn permission(&self) -> NotificationPermission {
        self.permission
    }
}

pub fn format_notification(title: &str, body: &str) -> String {
    format!("** {title}: {body}")
}
