use std::sync::Arc;

use contacts_core::CanonicalStatus;
use contacts_storage::{ContactStore, StoreError};
use tokio::sync::OnceCell;
use tracing::info;

use crate::aliases::StatusAliasTable;

/// Status used when an import row leaves `status` blank and the taxonomy is
/// still empty.
pub const FALLBACK_STATUS: &str = "new";

/// Maps raw status text onto canonical taxonomy entries, creating entries on
/// demand through the store's find-or-create.
#[derive(Clone)]
pub struct StatusNormalizer {
    store: Arc<dyn ContactStore>,
    aliases: Arc<StatusAliasTable>,
    seeded: Arc<OnceCell<Vec<CanonicalStatus>>>,
}

impl StatusNormalizer {
    pub fn new(store: Arc<dyn ContactStore>, aliases: Arc<StatusAliasTable>) -> Self {
        Self {
            store,
            aliases,
            seeded: Arc::new(OnceCell::new()),
        }
    }

    pub fn aliases(&self) -> &StatusAliasTable {
        &self.aliases
    }

    /// Canonical name for `raw` without touching the store.
    pub fn canonical_name(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self.aliases.canonical_for(trimmed) {
            Some(canonical) => canonical.to_string(),
            None => trimmed.to_string(),
        }
    }

    /// Blank input resolves to [`StatusNormalizer::default_status`].
    pub async fn normalize(&self, raw: &str) -> Result<CanonicalStatus, StoreError> {
        let name = self.canonical_name(raw);
        if name.is_empty() {
            return self.default_status().await;
        }
        self.store.find_or_create_status(&name).await
    }

    /// Creates the default statuses once per normalizer (and its clones).
    /// Later calls return the first result without touching the store.
    pub async fn seed_defaults(&self) -> Result<&[CanonicalStatus], StoreError> {
        let seeded = self
            .seeded
            .get_or_try_init(|| async {
                let mut statuses = Vec::with_capacity(self.aliases.defaults().len());
                for name in self.aliases.defaults() {
                    statuses.push(self.store.find_or_create_status(name).await?);
                }
                info!(count = statuses.len(), "status taxonomy seeded");
                Ok::<_, StoreError>(statuses)
            })
            .await?;
        Ok(seeded.as_slice())
    }

    /// First status by name, or a freshly created `"new"` on an empty
    /// taxonomy.
    pub async fn default_status(&self) -> Result<CanonicalStatus, StoreError> {
        match self.store.first_status().await? {
            Some(status) => Ok(status),
            None => self.store.find_or_create_status(FALLBACK_STATUS).await,
        }
    }
}
