use super::error::RuleError;
use crate::persistence::JsonLinesFile;
use crate::util::{now_ms, StorageError};
use log::info;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub const MAX_CHANGELOG_CHARS: usize = 2000;
pub const MAX_VERSION_ID_CHARS: usize = 64;

/// Structured rule document (topics, policy types, matching parameters).
/// Stored verbatim; this crate never interprets it.
pub type RuleContent = serde_json::Map<String, serde_json::Value>;

/// Durable, strictly increasing identifier of a published rule version.
/// Rendered as `v<sequence>` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleVersionId(u64);

impl RuleVersionId {
    pub const FIRST: RuleVersionId = RuleVersionId(1);

    pub fn new(sequence: u64) -> Option<Self> {
        (sequence > 0).then_some(Self(sequence))
    }

    pub fn sequence(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RuleVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid rule version id `{0}` (expected v<n>, n >= 1)")]
pub struct ParseVersionIdError(pub String);

impl FromStr for RuleVersionId {
    type Err = ParseVersionIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.len() > MAX_VERSION_ID_CHARS {
            return Err(ParseVersionIdError(trimmed.chars().take(16).collect()));
        }
        trimmed
            .strip_prefix('v')
            .filter(|digits| {
                !digits.is_empty()
                    && !digits.starts_with('0')
                    && digits.bytes().all(|b| b.is_ascii_digit())
            })
            .and_then(|digits| digits.parse::<u64>().ok())
            .and_then(RuleVersionId::new)
            .ok_or_else(|| ParseVersionIdError(trimmed.to_string()))
    }
}

impl Serialize for RuleVersionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RuleVersionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Immutable snapshot of rule content plus its changelog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleVersion {
    pub id: RuleVersionId,
    pub changelog: String,
    pub content: RuleContent,
    pub created_at_ms: u64,
}

/// One page of versions, newest first. `next_cursor` is passed back to
/// continue with strictly older versions.
#[derive(Debug, Clone)]
pub struct VersionPage {
    pub items: Vec<Arc<RuleVersion>>,
    pub next_cursor: Option<RuleVersionId>,
}

/// Append-only registry of rule versions.
///
/// Appends are serialised by the log mutex, which also owns identifier
/// assignment. Readers only take the index lock, and a record becomes visible
/// there after it is durable, so `list` never observes a partial publish.
#[derive(Debug)]
pub struct VersionStore {
    log: Mutex<JsonLinesFile>,
    versions: RwLock<Vec<Arc<RuleVersion>>>,
}

impl VersionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let log = JsonLinesFile::new(path);
        let records: Vec<RuleVersion> = log.load_all()?;
        let mut previous: Option<RuleVersionId> = None;
        for (idx, record) in records.iter().enumerate() {
            if previous.is_some_and(|prev| record.id <= prev) {
                return Err(StorageError::CorruptRecord {
                    file: log.path().display().to_string(),
                    line: idx + 1,
                    details: format!("version id {} is not increasing", record.id),
                });
            }
            previous = Some(record.id);
        }
        info!(
            "event=version_store_open path={} versions={} latest={}",
            log.path().display(),
            records.len(),
            previous.map(|id| id.to_string()).unwrap_or_else(|| "none".into())
        );
        Ok(Self {
            log: Mutex::new(log),
            versions: RwLock::new(records.into_iter().map(Arc::new).collect()),
        })
    }

    /// Validates and durably appends a new candidate version. The new version
    /// is neither activated nor marked gray.
    pub fn publish(
        &self,
        changelog: &str,
        content: serde_json::Value,
    ) -> Result<Arc<RuleVersion>, RuleError> {
        let changelog = validate_changelog(changelog)?;
        let content = validate_content(content)?;
        let log = self.log.lock();
        let id = self
            .versions
            .read()
            .last()
            .map(|latest| latest.id.next())
            .unwrap_or(RuleVersionId::FIRST);
        let record = RuleVersion {
            id,
            changelog,
            content,
            created_at_ms: now_ms(),
        };
        log.append(&record)?;
        let record = Arc::new(record);
        self.versions.write().push(record.clone());
        drop(log);
        info!(
            "event=rule_version_published id={} changelog_chars={}",
            record.id,
            record.changelog.chars().count()
        );
        Ok(record)
    }

    pub fn get(&self, id: RuleVersionId) -> Result<Arc<RuleVersion>, RuleError> {
        let versions = self.versions.read();
        versions
            .binary_search_by_key(&id, |version| version.id)
            .map(|pos| versions[pos].clone())
            .map_err(|_| RuleError::NotFound { id })
    }

    pub fn contains(&self, id: RuleVersionId) -> bool {
        self.versions
            .read()
            .binary_search_by_key(&id, |version| version.id)
            .is_ok()
    }

    /// Lists up to `limit` versions older than `cursor` (or from the newest
    /// when no cursor is given), newest first.
    pub fn list(
        &self,
        limit: usize,
        cursor: Option<RuleVersionId>,
    ) -> Result<VersionPage, RuleError> {
        if limit == 0 {
            return Err(RuleError::validation("limit must be greater than zero"));
        }
        let versions = self.versions.read();
        let end = match cursor {
            Some(cursor) => versions.partition_point(|version| version.id < cursor),
            None => versions.len(),
        };
        let items: Vec<Arc<RuleVersion>> =
            versions[..end].iter().rev().take(limit).cloned().collect();
        let next_cursor = if end > items.len() {
            items.last().map(|version| version.id)
        } else {
            None
        };
        Ok(VersionPage { items, next_cursor })
    }

    pub fn latest(&self) -> Option<Arc<RuleVersion>> {
        self.versions.read().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.versions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.read().is_empty()
    }
}

fn validate_changelog(raw: &str) -> Result<String, RuleError> {
    let changelog = raw.trim();
    if changelog.is_empty() {
        return Err(RuleError::validation("changelog must not be empty"));
    }
    if changelog.chars().count() > MAX_CHANGELOG_CHARS {
        return Err(RuleError::validation(format!(
            "changelog exceeds {MAX_CHANGELOG_CHARS} characters"
        )));
    }
    Ok(changelog.to_string())
}

fn validate_content(content: serde_json::Value) -> Result<RuleContent, RuleError> {
    match content {
        serde_json::Value::Object(map) if map.is_empty() => {
            Err(RuleError::validation("content must not be empty"))
        }
        serde_json::Value::Object(map) => Ok(map),
        other => Err(RuleError::validation(format!(
            "content must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
