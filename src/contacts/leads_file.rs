//! Lead snapshot file
//!
//! Optional flat JSON file mapping canonical phone → last CRM submission.
//! Writes go through a temp file + rename so a crash never leaves a torn file.

use super::types::Profile;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSnapshot {
    pub lead_id: Uuid,
    pub received_at: DateTime<Utc>,
    /// Phone exactly as typed in the form.
    pub raw_phone: String,
    pub profile: Profile,
}

pub struct LeadFile {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl LeadFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every snapshot. A missing file is an empty map.
    pub async fn load(&self) -> Result<BTreeMap<String, LeadSnapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(body) if body.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace the snapshot for `id`.
    pub async fn record(&self, id: &str, snapshot: LeadSnapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut leads = self.load().await?;
        leads.insert(id.to_string(), snapshot);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&leads)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!("Leads: {} snapshot(s) in {}", leads.len(), self.path.display());
        Ok(())
    }
}
