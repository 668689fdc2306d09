//! Persistent mapping from the message shown to the admin back to the client
//! who submitted it.
//!
//! Records live in a single JSON document (`{"items": [...]}`). Every
//! operation loads, mutates and saves the whole document; retention is
//! enforced on each load and before each save.

use crate::error::StoreError;
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    New,
    Answered,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp")]
    pub received_at: Option<DateTime<Utc>>,
    pub admin_chat_id: i64,
    pub admin_message_id: i32,
    #[serde(default)]
    pub client_chat_id: Option<i64>,
    #[serde(default)]
    pub client_username: String,
    #[serde(default)]
    pub client_name: String,
    pub status: RequestStatus,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_reply_message_id: Option<i32>,
}

impl RequestRecord {
    pub fn key(admin_chat_id: i64, admin_message_id: i32) -> String {
        format!("{admin_chat_id}:{admin_message_id}")
    }

    fn matches(&self, admin_chat_id: i64, admin_message_id: i32) -> bool {
        self.admin_chat_id == admin_chat_id && self.admin_message_id == admin_message_id
    }

    /// The instant retention is measured from.
    fn age_anchor(&self) -> Option<DateTime<Utc>> {
        self.created_at.or(self.received_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub retention_days: u32,
    pub max_items: usize,
}

/// Drop records older than the retention window (or with no usable
/// timestamp), then keep only the newest `max_items`. Returns whether
/// anything was removed.
pub fn cleanup(records: &mut Vec<RequestRecord>, policy: RetentionPolicy, now: DateTime<Utc>) -> bool {
    let before = records.len();
    // A window reaching past the representable range purges nothing by age.
    let cutoff = Duration::try_days(i64::from(policy.retention_days))
        .and_then(|window| now.checked_sub_signed(window));
    records.retain(|record| match (record.age_anchor(), cutoff) {
        (Some(at), Some(cutoff)) => at >= cutoff,
        (Some(_), None) => true,
        (None, _) => false,
    });

    if records.len() > policy.max_items {
        let excess = records.len() - policy.max_items;
        records.drain(..excess);
    }

    records.len() != before
}

/// Repository over forwarded requests.
pub trait RequestStore: Send + Sync {
    fn load(&self) -> Result<Vec<RequestRecord>, StoreError>;

    fn append(&self, record: RequestRecord) -> Result<(), StoreError>;

    /// Most recently appended match wins when keys repeat.
    fn find_by_admin_message(
        &self,
        admin_chat_id: i64,
        admin_message_id: i32,
    ) -> Result<Option<RequestRecord>, StoreError>;

    /// Returns `false` when no record matches.
    fn mark_answered(
        &self,
        admin_chat_id: i64,
        admin_message_id: i32,
        reply_message_id: i32,
    ) -> Result<bool, StoreError>;
}

#[derive(Serialize)]
struct StoreDocument<'a> {
    items: &'a [RequestRecord],
}

pub struct JsonFileStore {
    path: PathBuf,
    policy: RetentionPolicy,
    // Serializes load-modify-save cycles across concurrent handlers.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, policy: RetentionPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_pruned(&self) -> Result<Vec<RequestRecord>, StoreError> {
        let mut records = self.read_records();
        if cleanup(&mut records, self.policy, Utc::now()) {
            tracing::debug!(remaining = records.len(), "Pruned request store");
            self.save(&records)?;
        }
        Ok(records)
    }

    /// Anything that is not a readable `{"items": [...]}` document is an
    /// empty store. Entries that do not decode as records are dropped.
    fn read_records(&self) -> Vec<RequestRecord> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), "Cannot read request store: {e}");
                }
                return Vec::new();
            }
        };

        let document: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Request store is not valid JSON: {e}");
                return Vec::new();
            }
        };

        let Some(items) = document.get("items").and_then(serde_json::Value::as_array) else {
            return Vec::new();
        };

        items
            .iter()
            .filter(|item| item.is_object())
            .filter_map(|item| match serde_json::from_value(item.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!("Dropping malformed request record: {e}");
                    None
                }
            })
            .collect()
    }

    fn save(&self, records: &[RequestRecord]) -> Result<(), StoreError> {
        let write_err = |source: std::io::Error| StoreError::Write {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(&StoreDocument { items: records })?;
        std::fs::write(&self.path, json).map_err(write_err)
    }
}

impl RequestStore for JsonFileStore {
    fn load(&self) -> Result<Vec<RequestRecord>, StoreError> {
        let _guard = self.guard();
        self.load_pruned()
    }

    fn append(&self, record: RequestRecord) -> Result<(), StoreError> {
        let _guard = self.guard();
        let mut records = self.load_pruned()?;
        records.push(record);
        cleanup(&mut records, self.policy, Utc::now());
        self.save(&records)
    }

    fn find_by_admin_message(
        &self,
        admin_chat_id: i64,
        admin_message_id: i32,
    ) -> Result<Option<RequestRecord>, StoreError> {
        let _guard = self.guard();
        Ok(self
            .load_pruned()?
            .into_iter()
            .rev()
            .find(|record| record.matches(admin_chat_id, admin_message_id)))
    }

    fn mark_answered(
        &self,
        admin_chat_id: i64,
        admin_message_id: i32,
        reply_message_id: i32,
    ) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let mut records = self.load_pruned()?;
        let Some(record) = records
            .iter_mut()
            .rev()
            .find(|record| record.matches(admin_chat_id, admin_message_id))
        else {
            return Ok(false);
        };

        record.status = RequestStatus::Answered;
        record.answered_at = Some(now_seconds());
        record.admin_reply_message_id = Some(reply_message_id);
        cleanup(&mut records, self.policy, Utc::now());
        self.save(&records)?;
        Ok(true)
    }
}

/// Current time truncated to whole seconds, the precision records are stored with.
pub fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

/// Accepts RFC 3339 (`Z` or an offset) and offset-less ISO timestamps,
/// which are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Optional timestamps; unparsable or non-string values read as `None`.
mod timestamp {
    use super::{DateTime, Deserialize, Deserializer, Serializer, Utc};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_str(&super::format_timestamp(*at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(raw
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .and_then(super::parse_timestamp))
    }
}
