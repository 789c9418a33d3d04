pub mod buffer;
pub mod embedding;
pub mod error;
pub mod ignore_engine;
pub mod incremental;
pub mod naming;
pub mod pipeline;
pub mod reachability;
pub mod report;
pub mod resolver;
pub mod scanner;
pub mod watcher;

pub use buffer::{FileAction, FileRecord, IndexingBuffer, DEFAULT_MAX_FILES, DEFAULT_MAX_SYMBOLS};
pub use embedding::{embed_symbols, embedding_text, HashEmbedder, TextEmbedder};
pub use ignore_engine::{ensure_ocignore, IGNORE_FILE_NAME};
pub use incremental::{
    delete_file as incremental_delete, diff_symbols, process_events, update_file,
    IncrementalReport, SymbolDiff,
};
pub use naming::{
    generate_variants, parse_symbol_words, pluralize, singularize, strip_common_prefixes,
    strip_common_suffixes,
};
pub use pipeline::{index, index_incremental, IncrementalIndexResult};
pub use reachability::{
    compute_transitive_closure, is_reachability_stale, refresh_reachability,
    should_compute_closure, DEFAULT_MAX_DEPTH,
};
pub use report::{IndexConfig, IndexReport, SkipReason};
pub use resolver::ResolutionStats;
pub use scanner::scan_files;
pub use watcher::{start_watching, ChangeEvent, WatcherHandle};
