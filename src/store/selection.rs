//! The durable "what the slideshow shows" record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::atomic;
use crate::errors::AppError;
use crate::models::picker::MediaItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    pub items: Vec<MediaItem>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectionDocument {
    Current(Selection),
    /// Bare array written by earlier versions.
    Legacy(Vec<MediaItem>),
}

pub struct SelectionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the current selection.
    pub async fn save(&self, items: &[MediaItem]) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let doc = Selection {
            saved_at: Some(Utc::now()),
            items: items.to_vec(),
        };
        atomic::write_json(&self.path, &doc).await.map_err(|e| {
            tracing::error!(path = %self.path.display(), "Failed to save selection: {:#}", e);
            AppError::Storage(format!("{:#}", e))
        })?;
        tracing::info!(count = items.len(), "Selection saved");
        Ok(())
    }

    /// Current selection; empty when none was ever saved or the file is unusable.
    pub async fn load(&self) -> Vec<MediaItem> {
        match self.try_load().await {
            Ok(Some(selection)) => selection.items,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("{}; showing an empty selection", e);
                Vec::new()
            }
        }
    }

    /// Like `load`, but reports unreadable files instead of hiding them.
    pub async fn try_load(&self) -> Result<Option<Selection>, AppError> {
        let doc = atomic::read_json::<SelectionDocument>(&self.path)
            .await
            .map_err(|e| AppError::Storage(format!("{:#}", e)))?;
        Ok(doc.map(|doc| match doc {
            SelectionDocument::Current(selection) => selection,
            SelectionDocument::Legacy(items) => Selection {
                saved_at: None,
                items,
            },
        }))
    }

    pub async fn clear(&self) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        atomic::remove(&self.path)
            .await
            .map_err(|e| AppError::Storage(format!("{:#}", e)))
    }
}
