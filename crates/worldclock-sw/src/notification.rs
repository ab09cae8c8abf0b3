//! Push notifications.

use serde::{Deserialize, Serialize};

/// Title of every notification the worker shows.
pub const NOTIFICATION_TITLE: &str = "World Clock";

/// Body used when a push carries no text.
pub const DEFAULT_BODY: &str = "Time update available";

/// Action that opens the clock.
pub const VIEW_ACTION: &str = "view";

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A notification to display (`registration.showNotification`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build the notification for a push payload.
    pub fn from_push(payload: Option<&str>) -> Self {
        let body = payload
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_BODY);

        Self {
            title: NOTIFICATION_TITLE.to_string(),
            body: body.to_string(),
            icon: "/logo.svg".to_string(),
            badge: "/logo.svg".to_string(),
            vibrate: vec![100, 50, 100],
            actions: vec![NotificationAction {
                action: VIEW_ACTION.to_string(),
                title: "View Clock".to_string(),
            }],
        }
    }
}
