//! Bulk contact import: status alias table, taxonomy normalizer, the CSV
//! reconciler and the legacy alias-status merge job.

pub mod aliases;
pub mod config;
pub mod merge;
pub mod reconcile;
pub mod taxonomy;

pub use aliases::StatusAliasTable;
pub use config::ImportConfig;
pub use merge::{merge_alias_statuses, MergeReport};
pub use reconcile::{decode_payload, ImportError, ImportReconciler};
pub use taxonomy::StatusNormalizer;

pub const CRATE_NAME: &str = "contacts-import";
