//! The Checkpoint Store (spec §4.5, §6.3): a single JSON document recording
//! orchestrator progress, persisted with atomic write-temp-then-rename
//! semantics so a crash never leaves a half-written file behind.
//!
//! A checkpoint is only useful if it matches the run it would resume: the
//! [`ConfigFingerprint`] captures the namespace set, rate limit, and mode
//! declared at the start of the run that produced it, and a caller must
//! compare it against the requested run before resuming (spec §4.11 step 1).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wikivault_types::{CheckpointError, RunMode};

/// The run configuration a checkpoint was produced under. A checkpoint is
/// only safe to resume from when this matches the requested run exactly
/// (spec §4.5: "its configuration fingerprint matches the requested run").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFingerprint {
    pub namespaces: Vec<i32>,
    pub rate_limit_per_second: f64,
    pub mode: RunMode,
}

/// Progress counters carried in the checkpoint (spec §6.3 `stats`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub pages_scraped: u64,
    pub revisions_scraped: u64,
    pub files_downloaded: u64,
}

/// Orchestrator progress snapshot (spec §6.3).
///
/// `completed_page_ids` is scoped to `current_namespace` only — it is reset
/// when a namespace completes, keeping the file bounded in size regardless
/// of how large the wiki is (spec §8's boundary behaviour).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub fingerprint: ConfigFingerprint,
    pub run_mode: RunMode,
    pub namespaces: Vec<i32>,
    pub completed_namespaces: Vec<i32>,
    pub current_namespace: Option<i32>,
    pub completed_page_ids: Vec<u64>,
    pub stats: CheckpointStats,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Start a fresh checkpoint for a run declaring `fingerprint`. The first
    /// namespace in the declared set becomes the in-flight one.
    pub fn new(fingerprint: ConfigFingerprint) -> Self {
        let namespaces = fingerprint.namespaces.clone();
        let current_namespace = namespaces.first().copied();
        Self {
            run_mode: fingerprint.mode,
            namespaces,
            completed_namespaces: Vec::new(),
            current_namespace,
            completed_page_ids: Vec::new(),
            stats: CheckpointStats::default(),
            fingerprint,
            timestamp: Utc::now(),
        }
    }

    /// Whether this checkpoint was produced by the same run configuration as
    /// `other` — the precondition for resuming rather than starting over.
    pub fn matches_fingerprint(&self, other: &ConfigFingerprint) -> bool {
        self.fingerprint == *other
    }

    pub fn is_namespace_complete(&self, namespace: i32) -> bool {
        self.completed_namespaces.contains(&namespace)
    }

    pub fn is_page_complete(&self, page_id: u64) -> bool {
        self.completed_page_ids.contains(&page_id)
    }

    fn mark_page_complete(&mut self, page_id: u64) {
        if !self.completed_page_ids.contains(&page_id) {
            self.completed_page_ids.push(page_id);
        }
        self.timestamp = Utc::now();
    }

    /// Mark `namespace` complete and advance to the next not-yet-completed
    /// namespace in declared order, clearing `completed_page_ids` since it is
    /// scoped to the namespace that was just finished.
    fn mark_namespace_complete(&mut self, namespace: i32) {
        if !self.completed_namespaces.contains(&namespace) {
            self.completed_namespaces.push(namespace);
        }
        self.completed_page_ids.clear();
        self.current_namespace = self
            .namespaces
            .iter()
            .copied()
            .find(|ns| !self.completed_namespaces.contains(ns));
        self.timestamp = Utc::now();
    }
}

/// Default checkpoint file name, appended to a caller-supplied directory
/// unless [`CheckpointStore::at_path`] is used directly.
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Persistent store for a single [`Checkpoint`], backed by atomic
/// write-temp-then-rename writes (spec §6.3).
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// A checkpoint store at `dir`/`checkpoint.json`.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CHECKPOINT_FILE),
        }
    }

    /// A checkpoint store at an explicit file path.
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint, if any. Returns `Ok(None)` when no file is
    /// present. A present-but-unparseable file is logged and reported as
    /// [`CheckpointError::Corrupt`]; per spec §4.5, callers must treat that
    /// as equivalent to no-checkpoint rather than aborting the run.
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "checkpoint file is corrupt, proceeding as if no checkpoint exists"
                );
                Err(CheckpointError::Corrupt(e.to_string()))
            }
        }
    }

    /// True only when a checkpoint is present AND parses successfully.
    pub fn exists(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }

    /// Write `checkpoint` atomically: serialize to a sibling temp file, then
    /// rename over the target.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| CheckpointError::WriteFailed(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        let file = fs::File::create(&tmp_path)?;
        {
            use std::io::Write;
            let mut file = &file;
            file.write_all(json.as_bytes())?;
        }
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Mark `page_id` complete within `checkpoint.current_namespace` and
    /// persist before returning, per spec §4.5's "persisted before
    /// returning" contract.
    pub fn mark_page_complete(
        &self,
        checkpoint: &mut Checkpoint,
        page_id: u64,
    ) -> Result<(), CheckpointError> {
        checkpoint.mark_page_complete(page_id);
        self.save(checkpoint)
    }

    /// Mark `namespace` complete, advance to the next namespace, and persist
    /// before returning.
    pub fn mark_namespace_complete(
        &self,
        checkpoint: &mut Checkpoint,
        namespace: i32,
    ) -> Result<(), CheckpointError> {
        checkpoint.mark_namespace_complete(namespace);
        self.save(checkpoint)
    }

    /// Delete the checkpoint file, if present (spec §4.11 step 6: called on
    /// successful run completion).
    pub fn delete(&self) -> Result<(), CheckpointError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fingerprint() -> ConfigFingerprint {
        ConfigFingerprint {
            namespaces: vec![0, 14],
            rate_limit_per_second: 2.0,
            mode: RunMode::Full,
        }
    }

    #[test]
    fn new_checkpoint_starts_on_first_declared_namespace() {
        let checkpoint = Checkpoint::new(fingerprint());
        assert_eq!(checkpoint.current_namespace, Some(0));
        assert!(checkpoint.completed_namespaces.is_empty());
    }

    #[test]
    fn load_returns_none_when_absent() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut checkpoint = Checkpoint::new(fingerprint());
        store.mark_page_complete(&mut checkpoint, 1).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.completed_page_ids, vec![1]);
        assert!(store.exists());
    }

    #[test]
    fn mark_page_complete_is_idempotent() {
        let mut checkpoint = Checkpoint::new(fingerprint());
        checkpoint.mark_page_complete(1);
        checkpoint.mark_page_complete(1);
        assert_eq!(checkpoint.completed_page_ids, vec![1]);
    }

    #[test]
    fn mark_namespace_complete_advances_and_clears_pages() {
        let mut checkpoint = Checkpoint::new(fingerprint());
        checkpoint.mark_page_complete(1);
        checkpoint.mark_page_complete(2);
        checkpoint.mark_namespace_complete(0);

        assert_eq!(checkpoint.completed_namespaces, vec![0]);
        assert!(checkpoint.completed_page_ids.is_empty());
        assert_eq!(checkpoint.current_namespace, Some(14));
    }

    #[test]
    fn mark_namespace_complete_leaves_none_when_all_done() {
        let mut checkpoint = Checkpoint::new(ConfigFingerprint {
            namespaces: vec![0],
            rate_limit_per_second: 2.0,
            mode: RunMode::Full,
        });
        checkpoint.mark_namespace_complete(0);
        assert_eq!(checkpoint.current_namespace, None);
    }

    #[test]
    fn corrupt_file_is_reported_and_not_silently_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);
        fs::write(&path, "{not json").unwrap();

        let store = CheckpointStore::new(dir.path());
        let err = store.load().unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt(_)));
        assert!(!store.exists());
    }

    #[test]
    fn delete_removes_file_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = Checkpoint::new(fingerprint());
        store.save(&checkpoint).unwrap();
        assert!(store.exists());

        store.delete().unwrap();
        assert!(!store.exists());
        store.delete().unwrap();
    }

    #[test]
    fn matches_fingerprint_detects_divergent_run_config() {
        let checkpoint = Checkpoint::new(fingerprint());
        let mut other = fingerprint();
        other.rate_limit_per_second = 5.0;
        assert!(!checkpoint.matches_fingerprint(&other));
        assert!(checkpoint.matches_fingerprint(&fingerprint()));
    }
}
