use std::time::{Duration, Instant};

/// How long a toast stays visible after its last `show`.
pub const TOAST_LIFETIME: Duration = Duration::from_millis(3000);

/// Transient notification with a single re-armable dismissal deadline.
///
/// A new `show` replaces the message and pushes the deadline out; there is
/// never more than one pending dismissal.
#[derive(Debug, Clone, Default)]
pub struct Toast {
    active: Option<ActiveToast>,
    shown: u64,
}

#[derive(Debug, Clone)]
struct ActiveToast {
    message: String,
    deadline: Instant,
    serial: u64,
}

/// Reported once when a toast's deadline passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastDismissed {
    pub message: String,
    pub serial: u64,
}

impl Toast {
    pub fn show(&mut self, message: impl Into<String>, now: Instant) -> u64 {
        self.shown += 1;
        self.active = Some(ActiveToast {
            message: message.into(),
            deadline: now + TOAST_LIFETIME,
            serial: self.shown,
        });
        self.shown
    }

    pub fn message(&self) -> Option<&str> {
        self.active.as_ref().map(|toast| toast.message.as_str())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|toast| toast.deadline)
    }

    pub fn expire(&mut self, now: Instant) -> Option<ToastDismissed> {
        let due = self
            .active
            .as_ref()
            .map(|toast| toast.deadline <= now)
            .unwrap_or(false);
        if !due {
            return None;
        }
        self.active.take().map(|toast| ToastDismissed {
            message: toast.message,
            serial: toast.serial,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{Toast, TOAST_LIFETIME};

    #[test]
    fn toast_dismisses_after_lifetime() {
        let start = Instant::now();
        let mut toast = Toast::default();
        toast.show("Shareable link copied!", start);

        assert_eq!(toast.message(), Some("Shareable link copied!"));
        assert!(toast.expire(start + Duration::from_millis(2999)).is_none());

        let dismissed = toast.expire(start + TOAST_LIFETIME);
        assert_eq!(
            dismissed.map(|event| event.message),
            Some("Shareable link copied!".to_string())
        );
        assert!(toast.message().is_none());
        assert!(toast.expire(start + Duration::from_secs(10)).is_none());
    }

    #[test]
    fn second_show_replaces_message_and_rearms_deadline() {
        let start = Instant::now();
        let mut toast = Toast::default();
        toast.show("first", start);
        let second_at = start + Duration::from_millis(800);
        let serial = toast.show("second", second_at);

        assert_eq!(toast.message(), Some("second"));
        assert_eq!(toast.deadline(), Some(second_at + TOAST_LIFETIME));
        assert!(toast.expire(start + TOAST_LIFETIME).is_none());

        let dismissed = toast.expire(second_at + TOAST_LIFETIME);
        assert_eq!(dismissed.map(|event| event.serial), Some(serial));
    }
}
