//! Production capabilities.
//!
//! - [`search`] — `TavilySearch`, web search used by the planner and researcher
//! - [`files`] — workspace `list_directory`, `read_file` and `write_file`

pub mod files;
pub mod search;

pub use files::{Workspace, LIST_DIRECTORY, READ_FILE, WRITE_FILE};
pub use search::{TavilySearch, WEB_SEARCH};

/// Every capability name a team member can be configured with.
pub const KNOWN_CAPABILITIES: [&str; 4] = [WEB_SEARCH, LIST_DIRECTORY, READ_FILE, WRITE_FILE];
