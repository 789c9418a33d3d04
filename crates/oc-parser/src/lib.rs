pub mod error;
mod body_hash;
mod file_check;
mod file_level;
mod registry;
mod visitor;

pub use file_check::{check_file_size, is_binary};
pub use file_level::file_level_output;
pub use registry::ParserRegistry;
pub use visitor::{parse_file, parse_file_with_tree, ParseOutput, ParseOutputWithTree};
