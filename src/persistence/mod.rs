//! Durable files backing the rule registry: an append-only JSON-lines log
//! and atomically replaced JSON state documents.

pub mod json_lines;
pub mod state_file;

pub use json_lines::JsonLinesFile;
pub use state_file::JsonStateFile;

pub const VERSIONS_FILE: &str = "versions.log";
pub const ACTIVATION_FILE: &str = "activation.json";
pub const GRAY_FILE: &str = "gray.json";
pub const AUDIT_FILE: &str = "audit.log";
