//! Last-activity recording, at most one store write per user per day.

use std::sync::Arc;

use apigate_core::{ActivityStore, UserId};
use chrono::NaiveDate;
use dashmap::DashMap;

/// Result of [`ActivityRecorder::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    Updated,
    Unchanged,
}

/// Records a user's last activity date.
///
/// A process-local cache remembers the last date written per user, so
/// repeated requests on the same day skip the store entirely.
#[derive(Clone)]
pub struct ActivityRecorder {
    store: Arc<dyn ActivityStore>,
    recent: Arc<DashMap<UserId, NaiveDate>>,
}

impl ActivityRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            recent: Arc::new(DashMap::new()),
        }
    }

    /// Upserts `today` as the user's last activity unless it already is.
    ///
    /// # Errors
    ///
    /// Propagates store failures. The cache is only updated after a
    /// successful read or write.
    pub async fn record(&self, user: UserId, today: NaiveDate) -> anyhow::Result<ActivityOutcome> {
        if self.recent.get(&user).is_some_and(|date| *date == today) {
            return Ok(ActivityOutcome::Unchanged);
        }

        if self.store.last_activity_on(user).await? == Some(today) {
            self.recent.insert(user, today);
            return Ok(ActivityOutcome::Unchanged);
        }

        self.store.set_last_activity_on(user, today).await?;
        self.recent.insert(user, today);
        tracing::debug!(user = %user, date = %today, "last activity updated");
        Ok(ActivityOutcome::Updated)
    }

    /// Fire-and-forget variant used by the dispatch pipeline. Failures are
    /// logged and never retried.
    pub fn spawn_record(&self, user: UserId, today: NaiveDate) -> tokio::task::JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(async move {
            if let Err(e) = recorder.record(user, today).await {
                tracing::warn!(user = %user, error = %e, "failed to record user activity");
            }
        })
    }
}
