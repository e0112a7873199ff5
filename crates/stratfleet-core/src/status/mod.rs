//! Durable per-strategy status tracking.
//!
//! The tracker file is a single JSON object mapping strategy name to a
//! status value in the legacy shape: `0` for pending, `1` for success, and a
//! string for an error message (`"skipped"` is reserved for strategies that
//! were deliberately excluded). Every mutation rewrites the whole file via a
//! temp-file-then-rename so a crash can never leave a torn tracker behind.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Reserved string value for [`UnitStatus::Skipped`] in the tracker file.
const SKIPPED: &str = "skipped";

/// Status of a single strategy in the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Not yet processed (serialized as `0`).
    Pending,
    /// Results harvested and saved (serialized as `1`).
    Success,
    /// Processing failed; carries the diagnostic text (serialized as the
    /// message string).
    Error(String),
    /// Deliberately excluded from scheduling (serialized as `"skipped"`).
    Skipped,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Success => f.write_str("success"),
            Self::Error(msg) => write!(f, "error: {msg}"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

impl Serialize for UnitStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Pending => serializer.serialize_u64(0),
            Self::Success => serializer.serialize_u64(1),
            Self::Error(msg) => serializer.serialize_str(msg),
            Self::Skipped => serializer.serialize_str(SKIPPED),
        }
    }
}

struct UnitStatusVisitor;

impl<'de> Visitor<'de> for UnitStatusVisitor {
    type Value = UnitStatus;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0, 1, or an error message string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<UnitStatus, E> {
        match v {
            0 => Ok(UnitStatus::Pending),
            1 => Ok(UnitStatus::Success),
            other => Err(E::custom(format!("invalid status code: {other}"))),
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<UnitStatus, E> {
        u64::try_from(v)
            .map_err(|_| E::custom(format!("invalid status code: {v}")))
            .and_then(|v| self.visit_u64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<UnitStatus, E> {
        if v == SKIPPED {
            Ok(UnitStatus::Skipped)
        } else {
            Ok(UnitStatus::Error(v.to_owned()))
        }
    }
}

impl<'de> Deserialize<'de> for UnitStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UnitStatusVisitor)
    }
}

/// Durable name -> status mapping, persisted after every mutation.
///
/// Entries keep their discovery/file order so the pending list (and therefore
/// batch composition) is reproducible across runs. Single-writer: concurrent
/// orchestrator instances against the same tracker file are not supported.
#[derive(Debug)]
pub struct StatusStore {
    path: PathBuf,
    entries: Vec<(String, UnitStatus)>,
}

impl StatusStore {
    /// Load the tracker from `path`, or initialize it from the discovered
    /// strategy names if the file does not exist.
    ///
    /// Names in `discovered` that are missing from an existing file are added
    /// as [`UnitStatus::Pending`]; statuses already on disk are kept as-is.
    /// Strategies are never removed, only transitioned.
    pub fn load(path: impl Into<PathBuf>, discovered: &[String]) -> Result<Self> {
        let path = path.into();

        let mut entries: Vec<(String, UnitStatus)> = Vec::new();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read tracker file {}", path.display()))?;
            let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse tracker file {}", path.display()))?;
            for (name, value) in map {
                let status: UnitStatus = serde_json::from_value(value)
                    .with_context(|| format!("invalid status for strategy {name:?}"))?;
                entries.push((name, status));
            }
        }

        let mut store = Self { path, entries };

        let mut added = false;
        for name in discovered {
            if store.find(name).is_none() {
                store.entries.push((name.clone(), UnitStatus::Pending));
                added = true;
            }
        }
        if added {
            store.persist()?;
        }

        Ok(store)
    }

    /// Path of the backing tracker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    /// Current status of a strategy, if tracked.
    pub fn get(&self, name: &str) -> Option<&UnitStatus> {
        self.find(name).map(|i| &self.entries[i].1)
    }

    /// Set a strategy's status and persist the whole tracker before returning.
    ///
    /// An unknown name is appended rather than rejected, matching the file's
    /// open-population semantics.
    pub fn set(&mut self, name: &str, status: UnitStatus) -> Result<()> {
        match self.find(name) {
            Some(i) => self.entries[i].1 = status,
            None => self.entries.push((name.to_owned(), status)),
        }
        self.persist()
    }

    /// Names still pending, in tracker order.
    ///
    /// With `retry_errors`, every [`UnitStatus::Error`] strategy is first
    /// reset to pending (persisting the reset) and included after the
    /// already-pending names. A name never appears twice.
    pub fn pending(&mut self, retry_errors: bool) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, s)| *s == UnitStatus::Pending)
            .map(|(n, _)| n.clone())
            .collect();

        if retry_errors {
            let mut reset = Vec::new();
            for (name, status) in &mut self.entries {
                if matches!(status, UnitStatus::Error(_)) {
                    *status = UnitStatus::Pending;
                    reset.push(name.clone());
                }
            }
            if !reset.is_empty() {
                self.persist()?;
                names.extend(reset);
            }
        }

        Ok(names)
    }

    /// Iterate over all tracked strategies in tracker order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UnitStatus)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Number of tracked strategies.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no strategies are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the whole tracker atomically: serialize to a sibling temp file,
    /// then rename over the target. Readers observe either the old or the new
    /// complete file, never a partial write.
    fn persist(&self) -> Result<()> {
        let mut map = serde_json::Map::with_capacity(self.entries.len());
        for (name, status) in &self.entries {
            map.insert(name.clone(), serde_json::to_value(status)?);
        }
        let contents = serde_json::to_string_pretty(&map)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &contents)
            .with_context(|| format!("failed to write temp tracker file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).with_context(|| {
            format!("failed to replace tracker file {}", self.path.display())
        })?;

        Ok(())
    }
}
