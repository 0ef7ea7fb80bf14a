//! Per-browser pick flows.
//!
//! `begin` creates an upstream session and spawns a watcher task that drives
//! it to a terminal phase: poll until `MEDIA_ITEMS_SET`, list, replace the
//! selection, delete the session. Browsers only read the in-memory phase, so
//! any number of page refreshes never adds upstream traffic.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::client::PickerClient;
use crate::errors::AppError;
use crate::models::picker::{PickerSession, SessionState};
use crate::store::SelectionStore;

/// Consecutive failed polls tolerated before the flow gives up.
const MAX_POLL_FAILURES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowPhase {
    Pending,
    Completed { count: usize },
    Expired,
    Failed { message: String },
}

impl FlowPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowPhase::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct PickFlow {
    pub session: PickerSession,
    pub phase: FlowPhase,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct FlowEntry {
    flow: PickFlow,
    watcher: Option<JoinHandle<()>>,
}

impl Drop for FlowEntry {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.take() {
            handle.abort();
        }
    }
}

pub struct PickFlows {
    picker: Arc<PickerClient>,
    selection: Arc<SelectionStore>,
    flows: DashMap<String, FlowEntry>,
    timeout: Duration,
}

impl PickFlows {
    pub fn new(picker: Arc<PickerClient>, selection: Arc<SelectionStore>, timeout: Duration) -> Self {
        Self {
            picker,
            selection,
            flows: DashMap::new(),
            timeout,
        }
    }

    pub fn picker(&self) -> &PickerClient {
        &self.picker
    }

    /// Start a new pick for `owner`, replacing (and cancelling) any previous one.
    pub async fn begin(self: &Arc<Self>, owner: &str) -> Result<PickerSession, AppError> {
        let session = self.picker.create_session().await?;
        let now = Utc::now();

        let entry = FlowEntry {
            flow: PickFlow {
                session: session.clone(),
                phase: FlowPhase::Pending,
                started_at: now,
                updated_at: now,
            },
            watcher: None,
        };
        if let Some(previous) = self.flows.insert(owner.to_string(), entry) {
            tracing::info!(
                owner,
                replaced = %previous.flow.session.session_id,
                "Replacing unfinished pick flow"
            );
            self.picker.forget(&previous.flow.session.session_id);
        }

        let handle = tokio::spawn(Arc::clone(self).watch(owner.to_string(), session.session_id.clone()));
        match self.flows.get_mut(owner) {
            Some(mut entry) if entry.flow.session.session_id == session.session_id => {
                entry.watcher = Some(handle);
            }
            // Replaced again before we got here; the newer flow owns the slot.
            _ => handle.abort(),
        }

        tracing::info!(owner, session_id = %session.session_id, "Pick flow started");
        Ok(session)
    }

    pub fn get(&self, owner: &str) -> Option<PickFlow> {
        self.flows.get(owner).map(|e| e.flow.clone())
    }

    pub fn remove(&self, owner: &str) -> Option<PickFlow> {
        self.flows.remove(owner).map(|(_, entry)| {
            self.picker.forget(&entry.flow.session.session_id);
            entry.flow.clone()
        })
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Drop flows not touched for `max_age`. Returns how many were removed.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };
        let stale: Vec<String> = self
            .flows
            .iter()
            .filter(|e| e.flow.updated_at < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for owner in &stale {
            self.remove(owner);
        }
        stale.len()
    }

    async fn watch(self: Arc<Self>, owner: String, session_id: String) {
        let phase = match tokio::time::timeout(self.timeout, self.drive(&session_id)).await {
            Ok(phase) => phase,
            Err(_) => {
                tracing::warn!(session_id = %session_id, timeout = ?self.timeout, "Pick flow timed out");
                self.picker.forget(&session_id);
                FlowPhase::Expired
            }
        };
        self.finish(&owner, &session_id, phase);
    }

    async fn drive(&self, session_id: &str) -> FlowPhase {
        let mut failures = 0;
        loop {
            match self.picker.poll_session(session_id).await {
                Ok(outcome) => match outcome.state {
                    SessionState::Pending => {
                        failures = 0;
                        self.touch(session_id);
                    }
                    SessionState::MediaItemsSet => return self.collect(session_id).await,
                    SessionState::Expired => return FlowPhase::Expired,
                },
                Err(AppError::SessionExpired) => return FlowPhase::Expired,
                Err(e) if e.is_transient() && failures < MAX_POLL_FAILURES => {
                    failures += 1;
                    tracing::warn!(session_id, failures, "Poll failed, will retry: {}", e);
                }
                Err(e) => {
                    tracing::error!(session_id, "Giving up on pick flow: {}", e);
                    return FlowPhase::Failed {
                        message: e.to_string(),
                    };
                }
            }
        }
    }

    async fn collect(&self, session_id: &str) -> FlowPhase {
        let items = match self.picker.list_media_items(session_id).await {
            Ok(items) => items,
            Err(AppError::SessionExpired) => return FlowPhase::Expired,
            Err(e) => {
                return FlowPhase::Failed {
                    message: e.to_string(),
                }
            }
        };

        let phase = if items.is_empty() {
            tracing::warn!(session_id, "Pick completed with nothing selected; keeping current selection");
            FlowPhase::Failed {
                message: "No photos were selected. The current slideshow is unchanged.".into(),
            }
        } else {
            match self.selection.save(&items).await {
                Ok(()) => FlowPhase::Completed { count: items.len() },
                Err(e) => FlowPhase::Failed {
                    message: e.to_string(),
                },
            }
        };

        self.picker.delete_session(session_id).await;
        phase
    }

    fn touch(&self, session_id: &str) {
        for mut entry in self.flows.iter_mut() {
            if entry.flow.session.session_id == session_id {
                entry.flow.updated_at = Utc::now();
            }
        }
    }

    /// Record the terminal phase, unless a newer flow took over the slot.
    fn finish(&self, owner: &str, session_id: &str, phase: FlowPhase) {
        if let Some(mut entry) = self.flows.get_mut(owner) {
            if entry.flow.session.session_id == session_id {
                tracing::info!(owner, session_id, ?phase, "Pick flow finished");
                entry.flow.phase = phase;
                entry.flow.updated_at = Utc::now();
                // The task is ending on its own; do not abort it on drop.
                entry.watcher = None;
                return;
            }
        }
        tracing::debug!(owner, session_id, "Finished flow was superseded");
    }
}
