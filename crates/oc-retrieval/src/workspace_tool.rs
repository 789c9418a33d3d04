//! `manage_workspace`: the Path/Workspace Registry's tool-facing surface.
//!
//! Unlike [`crate::tools::QueryTools`], which wraps one already-open
//! [`StorageManager`] for the workspace currently in focus, this tool owns
//! the registry file and opens/closes storage for whichever workspace a
//! given sub-operation names — workspaces may be registered without ever
//! being the one a caller has open right now.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use oc_indexer::report::IndexConfig;
use oc_storage::manager::StorageManager;
use oc_storage::workspace::{WorkspaceEntry, WorkspaceRegistry, WorkspaceType};

use crate::error::RetrievalError;

const DEFAULT_EMBEDDING_DIM: usize = 384;
const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub enum ManageWorkspaceRequest {
    List,
    Stats {
        workspace_id: String,
    },
    /// Register (if new) and run a full index of a workspace.
    Index {
        workspace_id: String,
        path: PathBuf,
        name: String,
        workspace_type: WorkspaceType,
    },
    /// Register a workspace in the registry without indexing it.
    Add {
        workspace_id: String,
        path: PathBuf,
        name: String,
        workspace_type: WorkspaceType,
    },
    Remove {
        workspace_id: String,
        /// If true, also delete the workspace's `.openace/` directory.
        delete_index: bool,
    },
    /// Re-index a previously registered workspace incrementally.
    Refresh {
        workspace_id: String,
    },
    /// Wipe a workspace's on-disk index, keeping its registry entry.
    Clean {
        workspace_id: String,
    },
    Health {
        workspace_id: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceCounts {
    pub symbol_count: u64,
    pub file_count: u64,
}

#[derive(Debug, Clone)]
pub struct ManageWorkspaceResult {
    pub operation: &'static str,
    pub workspace_id: Option<String>,
    pub workspaces: Vec<WorkspaceEntry>,
    pub before: Option<WorkspaceCounts>,
    pub after: Option<WorkspaceCounts>,
    pub healthy: Option<bool>,
    pub message: String,
}

impl ManageWorkspaceResult {
    pub fn render_text(&self) -> String {
        let mut out = format!("manage_workspace[{}]: {}\n", self.operation, self.message);
        if !self.workspaces.is_empty() {
            for w in &self.workspaces {
                out.push_str(&format!(
                    "  {} ({:?}) {} symbols={} files={} last_indexed={}\n",
                    w.workspace_id,
                    w.workspace_type,
                    w.path.display(),
                    w.symbol_count,
                    w.file_count,
                    w.last_indexed.as_deref().unwrap_or("never"),
                ));
            }
        }
        if let (Some(before), Some(after)) = (&self.before, &self.after) {
            out.push_str(&format!(
                "  before: symbols={} files={}\n  after:  symbols={} files={}\n",
                before.symbol_count, before.file_count, after.symbol_count, after.file_count
            ));
        }
        if let Some(healthy) = self.healthy {
            out.push_str(&format!("  healthy: {healthy}\n"));
        }
        out
    }
}

/// Opens the workspace registry rooted at `registry_root` and executes
/// `manage_workspace` sub-operations against it.
pub struct WorkspaceManager {
    registry_root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(registry_root: impl Into<PathBuf>) -> Self {
        Self { registry_root: registry_root.into() }
    }

    #[tracing::instrument(skip(self, request))]
    pub fn manage(&self, request: &ManageWorkspaceRequest) -> Result<ManageWorkspaceResult, RetrievalError> {
        let mut registry = WorkspaceRegistry::open(&self.registry_root)?;
        match request {
            ManageWorkspaceRequest::List => Ok(ManageWorkspaceResult {
                operation: "list",
                workspace_id: None,
                workspaces: registry.entries().to_vec(),
                before: None,
                after: None,
                healthy: None,
                message: format!("{} registered workspace(s)", registry.entries().len()),
            }),

            ManageWorkspaceRequest::Stats { workspace_id } => {
                let entry = registry
                    .get(workspace_id)
                    .ok_or_else(|| not_registered(workspace_id))?
                    .clone();
                let counts = live_counts(&entry.path)?;
                Ok(ManageWorkspaceResult {
                    operation: "stats",
                    workspace_id: Some(workspace_id.clone()),
                    workspaces: vec![entry],
                    before: None,
                    after: Some(counts),
                    healthy: None,
                    message: "live counts from the graph store".to_string(),
                })
            }

            ManageWorkspaceRequest::Index { workspace_id, path, name, workspace_type } => {
                let before = live_counts(path).unwrap_or_default();
                let config = index_config(workspace_id);
                let report = oc_indexer::index(path, &config)?;
                let after = live_counts(path)?;
                let now = now_iso8601();

                if registry.get(workspace_id).is_none() {
                    registry.upsert(WorkspaceEntry {
                        workspace_id: workspace_id.clone(),
                        path: path.clone(),
                        name: name.clone(),
                        workspace_type: *workspace_type,
                        created_at: now.clone(),
                        last_indexed: None,
                        symbol_count: 0,
                        file_count: 0,
                    })?;
                }
                registry.record_index_run(workspace_id, &now, after.symbol_count, after.file_count)?;

                Ok(ManageWorkspaceResult {
                    operation: "index",
                    workspace_id: Some(workspace_id.clone()),
                    workspaces: vec![registry.get(workspace_id).unwrap().clone()],
                    before: Some(before),
                    after: Some(after),
                    healthy: None,
                    message: format!("indexed {} file(s)", report.files_indexed),
                })
            }

            ManageWorkspaceRequest::Add { workspace_id, path, name, workspace_type } => {
                let now = now_iso8601();
                registry.upsert(WorkspaceEntry {
                    workspace_id: workspace_id.clone(),
                    path: path.clone(),
                    name: name.clone(),
                    workspace_type: *workspace_type,
                    created_at: now,
                    last_indexed: None,
                    symbol_count: 0,
                    file_count: 0,
                })?;
                Ok(ManageWorkspaceResult {
                    operation: "add",
                    workspace_id: Some(workspace_id.clone()),
                    workspaces: vec![registry.get(workspace_id).unwrap().clone()],
                    before: None,
                    after: None,
                    healthy: None,
                    message: "registered without indexing".to_string(),
                })
            }

            ManageWorkspaceRequest::Remove { workspace_id, delete_index } => {
                let entry = registry.remove(workspace_id)?.ok_or_else(|| not_registered(workspace_id))?;
                if *delete_index {
                    let openace_dir = entry.path.join(".openace");
                    if openace_dir.exists() {
                        std::fs::remove_dir_all(&openace_dir).map_err(oc_storage::StorageError::Io)?;
                    }
                }
                Ok(ManageWorkspaceResult {
                    operation: "remove",
                    workspace_id: Some(workspace_id.clone()),
                    workspaces: vec![entry],
                    before: None,
                    after: None,
                    healthy: None,
                    message: if *delete_index {
                        "removed and deleted on-disk index".to_string()
                    } else {
                        "removed from registry".to_string()
                    },
                })
            }

            ManageWorkspaceRequest::Refresh { workspace_id } => {
                let entry = registry.get(workspace_id).ok_or_else(|| not_registered(workspace_id))?.clone();
                let before = live_counts(&entry.path).unwrap_or_default();
                let config = index_config(workspace_id);
                let result = oc_indexer::index_incremental(&entry.path, &config)?;
                let after = live_counts(&entry.path)?;
                let now = now_iso8601();
                registry.record_index_run(workspace_id, &now, after.symbol_count, after.file_count)?;

                Ok(ManageWorkspaceResult {
                    operation: "refresh",
                    workspace_id: Some(workspace_id.clone()),
                    workspaces: vec![registry.get(workspace_id).unwrap().clone()],
                    before: Some(before),
                    after: Some(after),
                    healthy: None,
                    message: format!(
                        "refreshed: {} indexed, {} unchanged, {} deleted",
                        result.report.files_indexed, result.files_unchanged, result.files_deleted
                    ),
                })
            }

            ManageWorkspaceRequest::Clean { workspace_id } => {
                let entry = registry.get(workspace_id).ok_or_else(|| not_registered(workspace_id))?.clone();
                let before = live_counts(&entry.path).unwrap_or_default();
                let openace_dir = entry.path.join(".openace");
                if openace_dir.exists() {
                    std::fs::remove_dir_all(&openace_dir).map_err(oc_storage::StorageError::Io)?;
                }
                registry.mark_cleaned(workspace_id)?;

                Ok(ManageWorkspaceResult {
                    operation: "clean",
                    workspace_id: Some(workspace_id.clone()),
                    workspaces: vec![registry.get(workspace_id).unwrap().clone()],
                    before: Some(before),
                    after: Some(WorkspaceCounts::default()),
                    healthy: None,
                    message: "on-disk index wiped, registry entry kept".to_string(),
                })
            }

            ManageWorkspaceRequest::Health { workspace_id } => {
                let entry = registry.get(workspace_id).ok_or_else(|| not_registered(workspace_id))?.clone();
                let (healthy, message) = match StorageManager::open(&entry.path) {
                    Ok(storage) => {
                        let live = WorkspaceCounts {
                            symbol_count: storage.graph().count_symbols().unwrap_or(0) as u64,
                            file_count: storage.graph().count_files().unwrap_or(0) as u64,
                        };
                        let stale = live.symbol_count != entry.symbol_count || live.file_count != entry.file_count;
                        (true, if stale { "opens cleanly; registry counts are stale".to_string() } else { "opens cleanly; registry counts current".to_string() })
                    }
                    Err(e) => (false, format!("failed to open storage: {e}")),
                };
                Ok(ManageWorkspaceResult {
                    operation: "health",
                    workspace_id: Some(workspace_id.clone()),
                    workspaces: vec![entry],
                    before: None,
                    after: None,
                    healthy: Some(healthy),
                    message,
                })
            }
        }
    }
}

fn not_registered(workspace_id: &str) -> RetrievalError {
    RetrievalError::Storage(oc_storage::StorageError::WorkspaceNotFound { workspace_id: workspace_id.to_string() })
}

fn index_config(workspace_id: &str) -> IndexConfig {
    IndexConfig {
        repo_id: workspace_id.to_string(),
        batch_size: DEFAULT_BATCH_SIZE,
        embedding_dim: DEFAULT_EMBEDDING_DIM,
    }
}

fn live_counts(path: &Path) -> Result<WorkspaceCounts, RetrievalError> {
    let storage = StorageManager::open(path)?;
    Ok(WorkspaceCounts {
        symbol_count: storage.graph().count_symbols()? as u64,
        file_count: storage.graph().count_files()? as u64,
    })
}

fn now_iso8601() -> String {
    let dur = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = dur.as_secs();
    let days = secs / 86400;
    let time_of_day = secs % 86400;
    let (hours, minutes, seconds) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);
    let (year, month, day) = days_to_ymd(days);
    format!("{year:04}-{month:02}-{day:02}T{hours:02}:{minutes:02}:{seconds:02}Z")
}

fn days_to_ymd(mut days: u64) -> (u64, u64, u64) {
    let mut year = 1970u64;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }
    let leap = is_leap(year);
    let months: [u64; 12] = [31, if leap { 29 } else { 28 }, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1u64;
    for len in months {
        if days < len {
            break;
        }
        days -= len;
        month += 1;
    }
    (year, month, days + 1)
}

fn is_leap(y: u64) -> bool {
    y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)
}
