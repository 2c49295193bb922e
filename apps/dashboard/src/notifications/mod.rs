//! Notification feed: polled alerts and messages shown in the dashboard header.
//!
//! The feed keeps the last successful fetch. A failed poll is recorded and the
//! cached items stay visible until the next successful one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::notification::{Notification, NotificationCategory};
use crate::service_client::{AnalysisService, ServiceError};
use crate::tracking::polling::PollingClock;

const DEFAULT_SENDER: &str = "System AI";

/// Human "time ago" label, matching the dashboard header.
pub fn time_ago(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return String::new();
    };
    let seconds = (now - at).num_seconds().max(0) as f64;
    let units: [(f64, &str); 5] = [
        (31_536_000.0, "y"),
        (2_592_000.0, "mo"),
        (86_400.0, "d"),
        (3_600.0, "h"),
        (60.0, "m"),
    ];
    for (size, suffix) in units {
        let n = seconds / size;
        if n > 1.0 {
            return format!("{}{} ago", n.floor() as i64, suffix);
        }
    }
    "Just now".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertItem {
    pub id: i64,
    pub text: String,
    pub time: String,
    pub unread: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageItem {
    pub id: i64,
    pub from: String,
    pub text: String,
    pub time: String,
    pub unread: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationSummary {
    pub alerts: Vec<AlertItem>,
    pub messages: Vec<MessageItem>,
    pub unread_alerts: usize,
    pub unread_messages: usize,
    pub error: Option<String>,
}

pub fn summarize(items: &[Notification], error: Option<String>, now: DateTime<Utc>) -> NotificationSummary {
    let alerts: Vec<AlertItem> = items
        .iter()
        .filter(|n| n.category == NotificationCategory::Alert)
        .map(|n| AlertItem {
            id: n.id,
            text: n.content.clone(),
            time: time_ago(n.timestamp, now),
            unread: !n.is_read,
        })
        .collect();
    let messages: Vec<MessageItem> = items
        .iter()
        .filter(|n| n.category == NotificationCategory::Message)
        .map(|n| MessageItem {
            id: n.id,
            from: n.title.clone().unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            text: n.content.clone(),
            time: time_ago(n.timestamp, now),
            unread: !n.is_read,
        })
        .collect();

    NotificationSummary {
        unread_alerts: alerts.iter().filter(|a| a.unread).count(),
        unread_messages: messages.iter().filter(|m| m.unread).count(),
        alerts,
        messages,
        error,
    }
}

#[derive(Default)]
struct FeedState {
    items: Vec<Notification>,
    error: Option<String>,
}

pub struct NotificationFeed {
    service: Arc<dyn AnalysisService>,
    limit: usize,
    state: Arc<Mutex<FeedState>>,
    clock: PollingClock,
}

impl NotificationFeed {
    pub fn new(service: Arc<dyn AnalysisService>, limit: usize) -> Self {
        Self {
            service,
            limit,
            state: Arc::new(Mutex::new(FeedState::default())),
            clock: PollingClock::new("notifications"),
        }
    }

    pub fn start(&self, every: Duration) {
        let service = Arc::clone(&self.service);
        let state = Arc::clone(&self.state);
        let limit = self.limit;
        self.clock.start(every, move || {
            let service = Arc::clone(&service);
            let state = Arc::clone(&state);
            async move {
                refresh_into(service.as_ref(), &state, limit).await;
            }
        });
    }

    pub fn stop(&self) {
        self.clock.stop();
    }

    /// One fetch outside the schedule.
    pub async fn refresh(&self) {
        refresh_into(self.service.as_ref(), &self.state, self.limit).await;
    }

    pub fn summary(&self, now: DateTime<Utc>) -> NotificationSummary {
        let state = self.state.lock();
        summarize(&state.items, state.error.clone(), now)
    }

    /// Marks `ids` (or everything, for `None`) read on the server, then locally.
    pub async fn mark_read(&self, ids: Option<Vec<i64>>) -> Result<(), ServiceError> {
        self.service.mark_notifications_read(ids.clone()).await?;
        let mut state = self.state.lock();
        for item in state.items.iter_mut() {
            if ids.as_ref().map_or(true, |ids| ids.contains(&item.id)) {
                item.is_read = true;
            }
        }
        Ok(())
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        self.clock.stop();
    }
}

async fn refresh_into(service: &dyn AnalysisService, state: &Mutex<FeedState>, limit: usize) {
    match service.notifications(limit).await {
        Ok(items) => {
            debug!(count = items.len(), "Notifications refreshed");
            let mut state = state.lock();
            state.items = items;
            state.error = None;
        }
        Err(e) => {
            warn!("Notification poll failed: {e}");
            state.lock().error = Some(e.to_string());
        }
    }
}
