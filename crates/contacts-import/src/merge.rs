use contacts_storage::{ContactStore, StoreError};
use serde::Serialize;
use tracing::{info, warn};

use crate::aliases::StatusAliasTable;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub migrated_contacts: u64,
    pub deleted_statuses: Vec<String>,
}

/// Folds statuses stored under an alias name (e.g. a legacy `"nowy"` row)
/// into their canonical entry, then removes the alias rows.
///
/// Safe to re-run: aliases with no stored row are skipped.
pub async fn merge_alias_statuses(
    store: &dyn ContactStore,
    aliases: &StatusAliasTable,
) -> Result<MergeReport, StoreError> {
    let mut report = MergeReport::default();

    for (alias, canonical) in aliases.iter() {
        let Some(legacy) = store.find_status(alias).await? else {
            continue;
        };
        if legacy.name == canonical {
            continue;
        }

        let target = store.find_or_create_status(canonical).await?;
        let moved = store.reassign_status(legacy.id, target.id).await?;
        report.migrated_contacts += moved;

        match store.delete_status(legacy.id).await {
            Ok(()) => {
                info!(alias = %legacy.name, canonical, moved, "merged alias status");
                report.deleted_statuses.push(legacy.name);
            }
            Err(StoreError::StatusInUse(name)) => {
                warn!(status = %name, "alias status still referenced after reassignment; left in place");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}
