//! Workspace registry: tracks every workspace this installation has indexed
//! — primary and reference alike — independent of which one is currently
//! open. Backed by a single `registry.json` file, written atomically
//! (temp file + fsync + rename) so a crash mid-write never leaves a
//! truncated or half-written registry behind.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub use oc_core::WorkspaceType;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

const REGISTRY_FILE: &str = "registry.json";

/// One row of the registry. `symbol_count`/`file_count` are a cached
/// snapshot taken at last index time — callers needing current truth
/// (`health`, `stats`) should prefer a live count from the graph store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub workspace_id: String,
    pub path: PathBuf,
    pub name: String,
    pub workspace_type: WorkspaceType,
    pub created_at: String,
    pub last_indexed: Option<String>,
    pub symbol_count: u64,
    pub file_count: u64,
}

/// The registry itself: an ordered list of entries keyed by `workspace_id`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    workspaces: Vec<WorkspaceEntry>,
}

/// Loads, mutates, and atomically persists `registry.json`.
pub struct WorkspaceRegistry {
    path: PathBuf,
    entries: Vec<WorkspaceEntry>,
}

impl WorkspaceRegistry {
    /// Open the registry rooted at `registry_root` (a directory, typically
    /// the parent of per-workspace `.openace/` directories). Creates an
    /// empty registry in memory if the file doesn't exist yet; nothing is
    /// written to disk until the first mutation.
    pub fn open(registry_root: &Path) -> Result<Self, StorageError> {
        let path = registry_root.join(REGISTRY_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<RegistryFile>(&raw)?.workspaces,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::Io(e)),
        };
        Ok(Self { path, entries })
    }

    pub fn entries(&self) -> &[WorkspaceEntry] {
        &self.entries
    }

    pub fn get(&self, workspace_id: &str) -> Option<&WorkspaceEntry> {
        self.entries.iter().find(|e| e.workspace_id == workspace_id)
    }

    /// Insert a new entry or overwrite an existing one with the same id,
    /// then persist. Returns the previous entry, if any.
    pub fn upsert(&mut self, entry: WorkspaceEntry) -> Result<Option<WorkspaceEntry>, StorageError> {
        let previous = self.remove_in_memory(&entry.workspace_id);
        self.entries.push(entry);
        self.flush()?;
        Ok(previous)
    }

    /// Remove an entry by id and persist. Returns the removed entry, if any.
    pub fn remove(&mut self, workspace_id: &str) -> Result<Option<WorkspaceEntry>, StorageError> {
        let removed = self.remove_in_memory(workspace_id);
        if removed.is_some() {
            self.flush()?;
        }
        Ok(removed)
    }

    /// Update `last_indexed`, `symbol_count`, and `file_count` for an
    /// existing entry, then persist. Errors if the workspace isn't registered.
    pub fn record_index_run(
        &mut self,
        workspace_id: &str,
        indexed_at: &str,
        symbol_count: u64,
        file_count: u64,
    ) -> Result<(), StorageError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.workspace_id == workspace_id)
            .ok_or_else(|| StorageError::WorkspaceNotFound { workspace_id: workspace_id.to_string() })?;
        entry.last_indexed = Some(indexed_at.to_string());
        entry.symbol_count = symbol_count;
        entry.file_count = file_count;
        self.flush()
    }

    /// Reset an entry's cached counts and `last_indexed` back to empty,
    /// used after the on-disk index for a workspace has been wiped.
    pub fn mark_cleaned(&mut self, workspace_id: &str) -> Result<(), StorageError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.workspace_id == workspace_id)
            .ok_or_else(|| StorageError::WorkspaceNotFound { workspace_id: workspace_id.to_string() })?;
        entry.last_indexed = None;
        entry.symbol_count = 0;
        entry.file_count = 0;
        self.flush()
    }

    fn remove_in_memory(&mut self, workspace_id: &str) -> Option<WorkspaceEntry> {
        let idx = self.entries.iter().position(|e| e.workspace_id == workspace_id)?;
        Some(self.entries.remove(idx))
    }

    /// Write the registry to disk atomically: serialize to a sibling
    /// `.tmp` file, fsync it, then rename over the real path. The rename
    /// is atomic on the same filesystem, so readers never observe a
    /// partially-written file.
    fn flush(&self) -> Result<(), StorageError> {
        let body = RegistryFile { workspaces: self.entries.clone() };
        let json = serde_json::to_string_pretty(&body)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(json.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_entry(id: &str) -> WorkspaceEntry {
        WorkspaceEntry {
            workspace_id: id.to_string(),
            path: PathBuf::from("/repo"),
            name: "repo".to_string(),
            workspace_type: WorkspaceType::Primary,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            last_indexed: None,
            symbol_count: 0,
            file_count: 0,
        }
    }

    #[test]
    fn opens_empty_when_missing() {
        let tmp = TempDir::new().unwrap();
        let registry = WorkspaceRegistry::open(tmp.path()).unwrap();
        assert!(registry.entries().is_empty());
    }

    #[test]
    fn upsert_then_reopen_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let mut registry = WorkspaceRegistry::open(tmp.path()).unwrap();
        registry.upsert(sample_entry("ws-1")).unwrap();

        let reopened = WorkspaceRegistry::open(tmp.path()).unwrap();
        assert_eq!(reopened.entries().len(), 1);
        assert_eq!(reopened.get("ws-1").unwrap().name, "repo");
    }

    #[test]
    fn upsert_overwrites_existing_id() {
        let tmp = TempDir::new().unwrap();
        let mut registry = WorkspaceRegistry::open(tmp.path()).unwrap();
        registry.upsert(sample_entry("ws-1")).unwrap();
        let mut updated = sample_entry("ws-1");
        updated.name = "renamed".to_string();
        registry.upsert(updated).unwrap();

        assert_eq!(registry.entries().len(), 1);
        assert_eq!(registry.get("ws-1").unwrap().name, "renamed");
    }

    #[test]
    fn remove_deletes_entry() {
        let tmp = TempDir::new().unwrap();
        let mut registry = WorkspaceRegistry::open(tmp.path()).unwrap();
        registry.upsert(sample_entry("ws-1")).unwrap();
        let removed = registry.remove("ws-1").unwrap();
        assert!(removed.is_some());
        assert!(registry.get("ws-1").is_none());
    }

    #[test]
    fn record_index_run_updates_counts() {
        let tmp = TempDir::new().unwrap();
        let mut registry = WorkspaceRegistry::open(tmp.path()).unwrap();
        registry.upsert(sample_entry("ws-1")).unwrap();
        registry.record_index_run("ws-1", "2026-02-01T00:00:00Z", 42, 7).unwrap();

        let entry = registry.get("ws-1").unwrap();
        assert_eq!(entry.symbol_count, 42);
        assert_eq!(entry.file_count, 7);
        assert_eq!(entry.last_indexed.as_deref(), Some("2026-02-01T00:00:00Z"));
    }

    #[test]
    fn mark_cleaned_resets_counts() {
        let tmp = TempDir::new().unwrap();
        let mut registry = WorkspaceRegistry::open(tmp.path()).unwrap();
        registry.upsert(sample_entry("ws-1")).unwrap();
        registry.record_index_run("ws-1", "2026-02-01T00:00:00Z", 42, 7).unwrap();
        registry.mark_cleaned("ws-1").unwrap();

        let entry = registry.get("ws-1").unwrap();
        assert_eq!(entry.symbol_count, 0);
        assert_eq!(entry.file_count, 0);
        assert!(entry.last_indexed.is_none());
    }

    #[test]
    fn record_index_run_missing_workspace_errors() {
        let tmp = TempDir::new().unwrap();
        let mut registry = WorkspaceRegistry::open(tmp.path()).unwrap();
        let err = registry.record_index_run("nope", "2026-01-01", 0, 0).unwrap_err();
        assert!(matches!(err, StorageError::WorkspaceNotFound { .. }));
    }
}
