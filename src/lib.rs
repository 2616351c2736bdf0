// This is a metapackage for the end-to-end ledger scenarios
// Re-export the workspace crates so tests can reach both

pub use account_service;
pub use common;
