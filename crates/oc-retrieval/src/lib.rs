pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod tools;
pub mod trace;
pub mod workspace_tool;

pub use engine::{
    CallChainNode, FunctionContext, RetrievalEngine, SearchMethod, SearchQuery, SearchResult,
};
pub use error::RetrievalError;
pub use lifecycle::{
    LifecycleConfig, LifecycleOrchestrator, Phase, StartupReport, WatcherPumpReport,
};
pub use tools::{
    ExploreRequest, ExploreResult, FastSearchRequest, FastSearchResult, LookupHit,
    LookupMatchKind, LookupRequest, LookupResult, OutputFormat, QueryTools, RefsRequest,
    RefsResult, RenameRequest, RenameResult, RenameScope, SimilarExploreResult, SymbolBodyMode,
    SymbolsRequest, SymbolsResult, TypeExploreResult,
};
pub use trace::{
    MatchType, TraceDirection, TraceEngine, TraceNode, TraceOptions, TracePath, format_as_tree,
};
pub use workspace_tool::{
    ManageWorkspaceRequest, ManageWorkspaceResult, WorkspaceCounts, WorkspaceManager,
};
