//! Append-only usage log and usage summary.
//!
//! Every validation attempt is appended, successful or not. The summary
//! buckets today's usage by UTC date via the Clock trait.

use crate::clock::Clock;
use crate::errors::KeygateResult;
use crate::store::keys::{KeyStatus, LicenseKey};
use crate::store::UsageBackend;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One validation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLogEntry {
    /// Entry id.
    pub id: String,

    /// Key string as submitted, whether or not it exists.
    pub key_id: String,

    /// Client IP of the attempt.
    pub ip: String,

    /// Hardware id presented, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwid: Option<String>,

    /// When the attempt happened.
    pub timestamp: DateTime<Utc>,

    /// Whether validation succeeded.
    pub success: bool,
}

/// Aggregate usage figures for the administrative dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Keys in the store.
    pub total_keys: u64,

    /// Keys that are active and not past expiry.
    pub active_keys: u64,

    /// Sum of successful validations across all keys.
    pub total_usage: u64,

    /// Successful validations logged on the current UTC day.
    pub today_usage: u64,
}

/// Format a DateTime as YYYY-MM-DD for daily bucketing.
fn format_date(dt: &DateTime<Utc>) -> String {
    format!("{:04}-{:02}-{:02}", dt.year(), dt.month(), dt.day())
}

/// Usage log over a storage backend.
#[derive(Clone)]
pub struct UsageLog {
    backend: Arc<dyn UsageBackend>,
    clock: Arc<dyn Clock>,
}

impl UsageLog {
    /// Create a log over `backend`.
    pub fn new(backend: Arc<dyn UsageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Record one validation attempt.
    pub fn append(
        &self,
        key_id: &str,
        ip: &str,
        hwid: Option<&str>,
        success: bool,
    ) -> KeygateResult<UsageLogEntry> {
        let entry = UsageLogEntry {
            id: Uuid::new_v4().to_string(),
            key_id: key_id.to_string(),
            ip: ip.to_string(),
            hwid: hwid.map(str::to_string),
            timestamp: self.clock.now_utc(),
            success,
        };
        self.backend.append(entry.clone())?;
        Ok(entry)
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> KeygateResult<Vec<UsageLogEntry>> {
        let mut entries = self.backend.entries()?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    /// All entries for one submitted key string, in append order.
    pub fn for_key(&self, key_id: &str) -> KeygateResult<Vec<UsageLogEntry>> {
        Ok(self
            .backend
            .entries()?
            .into_iter()
            .filter(|entry| entry.key_id == key_id)
            .collect())
    }

    /// Summarize usage against the given key snapshot.
    pub fn summary(&self, keys: &[LicenseKey]) -> KeygateResult<UsageSummary> {
        let now = self.clock.now_utc();
        let today = format_date(&now);

        let today_usage = self
            .backend
            .entries()?
            .iter()
            .filter(|entry| entry.success && format_date(&entry.timestamp) == today)
            .count() as u64;

        Ok(UsageSummary {
            total_keys: keys.len() as u64,
            active_keys: keys
                .iter()
                .filter(|k| k.status == KeyStatus::Active && !k.is_past_expiry(now))
                .count() as u64,
            total_usage: keys.iter().map(|k| k.used_count).sum(),
            today_usage,
        })
    }
}
