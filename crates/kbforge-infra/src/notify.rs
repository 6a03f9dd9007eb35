//! User-facing notifications for terminal pipeline events.
//!
//! The gateway never talks to a platform directly. Whatever surface shows the
//! notification (desktop, browser, log) is injected as a
//! [`NotificationCapability`], and the gateway only decides whether a
//! notification should be shown at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kbforge_core::models::KitType;
use kbforge_processing::UploadEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// The user has not been asked yet.
    Default,
}

/// Events of the same category share a tag, so a newer notification replaces
/// an older one instead of stacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Completion,
    Error,
}

impl NotificationCategory {
    pub fn tag(&self) -> &'static str {
        match self {
            NotificationCategory::Completion => "kbforge-completion",
            NotificationCategory::Error => "kbforge-error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub tag: &'static str,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Shown,
    Unsupported,
    NotPermitted,
    /// The user is looking at the client already.
    Foreground,
    /// The capability accepted the request but failed to display it.
    Failed,
}

/// Platform hooks the gateway depends on.
#[async_trait]
pub trait NotificationCapability: Send + Sync {
    fn is_supported(&self) -> bool;

    fn permission(&self) -> NotificationPermission;

    /// Ask the user for permission; returns the resulting state.
    async fn request_permission(&self) -> NotificationPermission;

    /// Whether the client currently has the user's focus.
    fn is_foreground(&self) -> bool;

    /// Display `notification`, replacing any shown notification with the same tag.
    fn show(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Terminal events of the remote content generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Completed {
        kit_id: String,
        kit_type: KitType,
        item_count: usize,
    },
    Failed {
        kit_type: Option<KitType>,
        reason: String,
    },
}

pub struct NotificationGateway {
    capability: Arc<dyn NotificationCapability>,
}

impl NotificationGateway {
    pub fn new(capability: Arc<dyn NotificationCapability>) -> Self {
        Self { capability }
    }

    /// Ask for permission unless the user already decided.
    pub async fn request_permission(&self) -> NotificationPermission {
        if !self.capability.is_supported() {
            return NotificationPermission::Denied;
        }
        match self.capability.permission() {
            NotificationPermission::Default => {
                let permission = self.capability.request_permission().await;
                tracing::debug!(permission = ?permission, "Notification permission requested");
                permission
            }
            decided => decided,
        }
    }

    /// Show a notification only when supported, permitted and the client is in the background.
    pub fn notify_if_hidden(
        &self,
        category: NotificationCategory,
        title: &str,
        body: &str,
    ) -> NotifyOutcome {
        if !self.capability.is_supported() {
            return NotifyOutcome::Unsupported;
        }
        if self.capability.permission() != NotificationPermission::Granted {
            return NotifyOutcome::NotPermitted;
        }
        if self.capability.is_foreground() {
            return NotifyOutcome::Foreground;
        }

        let notification = Notification {
            tag: category.tag(),
            title: title.to_string(),
            body: body.to_string(),
        };
        match self.capability.show(&notification) {
            Ok(()) => NotifyOutcome::Shown,
            Err(e) => {
                tracing::warn!(tag = notification.tag, error = %e, "Failed to show notification");
                NotifyOutcome::Failed
            }
        }
    }

    /// Notify about a finished or failed file. Non-terminal events are ignored.
    pub fn notify_upload_event(&self, event: &UploadEvent) -> Option<NotifyOutcome> {
        match event {
            UploadEvent::Completed {
                name, mail_stats, ..
            } => {
                let body = match mail_stats {
                    Some(stats) => format!(
                        "{} was added to your knowledge base ({} messages)",
                        name, stats.emitted
                    ),
                    None => format!("{} was added to your knowledge base", name),
                };
                Some(self.notify_if_hidden(NotificationCategory::Completion, "Upload complete", &body))
            }
            UploadEvent::Failed { name, reason, .. } => Some(self.notify_if_hidden(
                NotificationCategory::Error,
                "Upload failed",
                &format!("{}: {}", name, reason),
            )),
            UploadEvent::StateChanged { .. } | UploadEvent::Progress { .. } => None,
        }
    }

    pub fn notify_generation_event(&self, event: &GenerationEvent) -> NotifyOutcome {
        match event {
            GenerationEvent::Completed {
                kit_type,
                item_count,
                ..
            } => self.notify_if_hidden(
                NotificationCategory::Completion,
                "Content ready",
                &format!("{} new {} items are in your library", item_count, kit_type),
            ),
            GenerationEvent::Failed { kit_type, reason } => {
                let title = match kit_type {
                    Some(kit_type) => format!("Generating {} failed", kit_type),
                    None => "Generation failed".to_string(),
                };
                self.notify_if_hidden(NotificationCategory::Error, &title, reason)
            }
        }
    }
}

/// Headless capability that writes notifications to the log.
///
/// Always treated as backgrounded with permission granted. Keeps the latest
/// notification per tag.
#[derive(Default)]
pub struct LogNotifier {
    latest: Mutex<HashMap<&'static str, Notification>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently displayed notifications, one per tag.
    pub fn active(&self) -> Vec<Notification> {
        let latest = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut active: Vec<_> = latest.values().cloned().collect();
        active.sort_by_key(|n| n.tag);
        active
    }
}

#[async_trait]
impl NotificationCapability for LogNotifier {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Granted
    }

    async fn request_permission(&self) -> NotificationPermission {
        NotificationPermission::Granted
    }

    fn is_foreground(&self) -> bool {
        false
    }

    fn show(&self, notification: &Notification) -> anyhow::Result<()> {
        let mut latest = self
            .latest
            .lock()
            .map_err(|_| anyhow::anyhow!("notification state poisoned"))?;
        let replaced = latest
            .insert(notification.tag, notification.clone())
            .is_some();
        tracing::info!(
            tag = notification.tag,
            replaced,
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbforge_core::models::{FileId, ParseStats, ProgressPhase};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockCapability {
        supported: bool,
        permission: Mutex<NotificationPermission>,
        grant_on_request: bool,
        foreground: AtomicBool,
        requests: AtomicUsize,
        shown: Mutex<Vec<Notification>>,
    }

    impl MockCapability {
        fn new(supported: bool, permission: NotificationPermission, foreground: bool) -> Arc<Self> {
            Arc::new(Self {
                supported,
                permission: Mutex::new(permission),
                grant_on_request: true,
                foreground: AtomicBool::new(foreground),
                requests: AtomicUsize::new(0),
                shown: Mutex::new(Vec::new()),
            })
        }

        fn shown(&self) -> Vec<Notification> {
            self.shown.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationCapability for MockCapability {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn permission(&self) -> NotificationPermission {
            *self.permission.lock().unwrap()
        }

        async fn request_permission(&self) -> NotificationPermission {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let result = if self.grant_on_request {
                NotificationPermission::Granted
            } else {
                NotificationPermission::Denied
            };
            *self.permission.lock().unwrap() = result;
            result
        }

        fn is_foreground(&self) -> bool {
            self.foreground.load(Ordering::SeqCst)
        }

        fn show(&self, notification: &Notification) -> anyhow::Result<()> {
            self.shown.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[test]
    fn test_shows_only_when_hidden_and_permitted() {
        let cap = MockCapability::new(true, NotificationPermission::Granted, true);
        let gateway = NotificationGateway::new(cap.clone());

        assert_eq!(
            gateway.notify_if_hidden(NotificationCategory::Completion, "t", "b"),
            NotifyOutcome::Foreground
        );
        cap.foreground.store(false, Ordering::SeqCst);
        assert_eq!(
            gateway.notify_if_hidden(NotificationCategory::Completion, "t", "b"),
            NotifyOutcome::Shown
        );
        assert_eq!(cap.shown().len(), 1);
        assert_eq!(cap.shown()[0].tag, "kbforge-completion");
    }

    #[test]
    fn test_unsupported_and_not_permitted() {
        let unsupported = NotificationGateway::new(MockCapability::new(
            false,
            NotificationPermission::Granted,
            false,
        ));
        assert_eq!(
            unsupported.notify_if_hidden(NotificationCategory::Error, "t", "b"),
            NotifyOutcome::Unsupported
        );

        for permission in [NotificationPermission::Denied, NotificationPermission::Default] {
            let cap = MockCapability::new(true, permission, false);
            let gateway = NotificationGateway::new(cap.clone());
            assert_eq!(
                gateway.notify_if_hidden(NotificationCategory::Error, "t", "b"),
                NotifyOutcome::NotPermitted
            );
            assert!(cap.shown().is_empty());
        }
    }

    #[tokio::test]
    async fn test_request_permission_asks_only_when_undecided() {
        let cap = MockCapability::new(true, NotificationPermission::Default, false);
        let gateway = NotificationGateway::new(cap.clone());
        assert_eq!(gateway.request_permission().await, NotificationPermission::Granted);
        assert_eq!(gateway.request_permission().await, NotificationPermission::Granted);
        assert_eq!(cap.requests.load(Ordering::SeqCst), 1);

        let denied = MockCapability::new(true, NotificationPermission::Denied, false);
        let gateway = NotificationGateway::new(denied.clone());
        assert_eq!(gateway.request_permission().await, NotificationPermission::Denied);
        assert_eq!(denied.requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_upload_events_map_to_categories() {
        let cap = MockCapability::new(true, NotificationPermission::Granted, false);
        let gateway = NotificationGateway::new(cap.clone());
        let id = FileId::new_v4();

        let progress = UploadEvent::Progress {
            id,
            percent: 40,
            phase: ProgressPhase::Reading,
            indeterminate: false,
        };
        assert_eq!(gateway.notify_upload_event(&progress), None);

        let done = UploadEvent::Completed {
            id,
            name: "archive.mbox".to_string(),
            remote_id: Some("src-1".to_string()),
            mail_stats: Some(ParseStats {
                emitted: 12,
                ..ParseStats::default()
            }),
        };
        assert_eq!(gateway.notify_upload_event(&done), Some(NotifyOutcome::Shown));

        let failed = UploadEvent::Failed {
            id,
            name: "talk.mp4".to_string(),
            reason: "upload failed: connection reset".to_string(),
        };
        assert_eq!(gateway.notify_upload_event(&failed), Some(NotifyOutcome::Shown));

        let shown = cap.shown();
        assert_eq!(shown[0].tag, NotificationCategory::Completion.tag());
        assert!(shown[0].body.contains("12 messages"));
        assert_eq!(shown[1].tag, NotificationCategory::Error.tag());
        assert_eq!(shown[1].body, "talk.mp4: upload failed: connection reset");
    }

    #[test]
    fn test_generation_events() {
        let cap = MockCapability::new(true, NotificationPermission::Granted, false);
        let gateway = NotificationGateway::new(cap.clone());

        gateway.notify_generation_event(&GenerationEvent::Completed {
            kit_id: "k1".to_string(),
            kit_type: KitType::Carousels,
            item_count: 4,
        });
        gateway.notify_generation_event(&GenerationEvent::Failed {
            kit_type: Some(KitType::Videos),
            reason: "quota exceeded".to_string(),
        });

        let shown = cap.shown();
        assert_eq!(shown[0].body, "4 new carousels items are in your library");
        assert_eq!(shown[1].title, "Generating videos failed");
        assert_eq!(shown[1].tag, "kbforge-error");
    }

    #[test]
    fn test_log_notifier_coalesces_by_tag() {
        let notifier = Arc::new(LogNotifier::new());
        let gateway = NotificationGateway::new(notifier.clone());

        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            gateway.notify_upload_event(&UploadEvent::Completed {
                id: FileId::new_v4(),
                name: name.to_string(),
                remote_id: None,
                mail_stats: None,
            });
        }
        gateway.notify_if_hidden(NotificationCategory::Error, "Upload failed", "d.pdf: rejected");

        let active = notifier.active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].body, "c.pdf was added to your knowledge base");
        assert_eq!(active[1].tag, "kbforge-error");
    }
}
