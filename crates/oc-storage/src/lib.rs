pub mod error;
pub mod fulltext;
pub mod graph;
pub mod manager;
pub mod vector;
pub mod workspace;

pub use error::StorageError;
pub use fulltext::{FullTextHit, FullTextStore};
pub use graph::{AtomicUpdateCounts, FileMetadata, GraphStore, RepoMetadata, TraversalDirection, TraversalHit};
pub use manager::StorageManager;
pub use vector::{VectorHit, VectorStore};
pub use workspace::{WorkspaceEntry, WorkspaceRegistry, WorkspaceType};
