use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use contacts_core::{
    CanonicalStatus, Contact, ContactQuery, NewContact, RequiredField, SkipReason, UniqueField,
};
use contacts_import::{
    merge_alias_statuses, ImportError, ImportReconciler, StatusAliasTable, StatusNormalizer,
};
use contacts_storage::{ContactStore, MemoryContactStore, StoreError};

const HEADER: &str = "first_name,last_name,phone_number,email,city,status";

fn reconciler(store: Arc<dyn ContactStore>) -> (StatusNormalizer, ImportReconciler) {
    let aliases = Arc::new(StatusAliasTable::builtin().expect("builtin aliases"));
    let normalizer = StatusNormalizer::new(Arc::clone(&store), aliases);
    let reconciler = ImportReconciler::new(store, normalizer.clone());
    (normalizer, reconciler)
}

fn csv(rows: &[&str]) -> Vec<u8> {
    let mut text = String::from(HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text.into_bytes()
}

async fn contacts(store: &MemoryContactStore) -> Vec<Contact> {
    store.list_contacts(&ContactQuery::default()).await.unwrap()
}

async fn status_names(store: &MemoryContactStore) -> Vec<String> {
    store
        .list_statuses()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect()
}

#[tokio::test]
async fn single_row_is_created_with_its_status() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let outcome = reconciler
        .reconcile(&csv(&["John,Doe,+48123456789,john@x.com,Warsaw,new"]))
        .await
        .unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.skipped, 0);
    let stored = contacts(&store).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].display_name(), "John Doe");
    assert_eq!(stored[0].phone, "+48123456789");
    assert_eq!(stored[0].city, "Warsaw");
    assert_eq!(stored[0].status.name, "new");
}

#[tokio::test]
async fn reimporting_the_same_file_skips_every_row() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());
    let file = csv(&["John,Doe,123,j@x.com,Paris,new"]);

    reconciler.reconcile(&file).await.unwrap();
    let second = reconciler.reconcile(&file).await.unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(
        second.skips[0].reason,
        SkipReason::Duplicate(UniqueField::Phone)
    );
    assert_eq!(contacts(&store).await.len(), 1);
}

#[tokio::test]
async fn alias_status_lands_on_canonical_entry() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let outcome = reconciler
        .reconcile(&csv(&[
            "Anna,Nowak,111,anna@x.pl,Kraków,nowy",
            "Piotr,Kowal,222,piotr@x.pl,Gdańsk,new",
            "Ewa,Lis,333,ewa@x.pl,Łódź,  W Trakcie ",
        ]))
        .await
        .unwrap();

    assert_eq!(outcome.created, 3);
    let names = status_names(&store).await;
    assert!(!names.iter().any(|n| n == "nowy"));
    assert!(names.iter().any(|n| n == "new"));
    assert!(names.iter().any(|n| n == "in progress"));

    let stored = contacts(&store).await;
    let anna = stored.iter().find(|c| c.first_name == "Anna").unwrap();
    assert_eq!(anna.status.name, "new");
}

#[tokio::test]
async fn rows_missing_required_fields_are_skipped() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let outcome = reconciler
        .reconcile(&csv(&[
            ",Doe,123,j@x.com,Paris,new",
            "John,Doe,124,j2@x.com,   ,new",
            "Jane,Roe,125,jane@x.com,Lyon,new",
        ]))
        .await
        .unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.skipped, 2);
    assert_eq!(
        outcome.skips[0].reason,
        SkipReason::MissingField(RequiredField::FirstName)
    );
    assert_eq!(outcome.skips[0].line, 2);
    assert_eq!(
        outcome.skips[1].reason,
        SkipReason::MissingField(RequiredField::City)
    );
    assert_eq!(outcome.skips[1].line, 3);
}

#[tokio::test]
async fn duplicates_inside_one_file_keep_the_first_row() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let outcome = reconciler
        .reconcile(&csv(&[
            "John,Doe,123,j@x.com,Paris,new",
            "Johnny,Doe,123,other@x.com,Paris,new",
            "Jon,Doe,999,j@x.com,Paris,new",
        ]))
        .await
        .unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.skipped, 2);
    assert_eq!(
        outcome.skips[0].reason,
        SkipReason::Duplicate(UniqueField::Phone)
    );
    assert_eq!(
        outcome.skips[1].reason,
        SkipReason::Duplicate(UniqueField::Email)
    );
    assert_eq!(contacts(&store).await[0].first_name, "John");
}

#[tokio::test]
async fn empty_and_header_only_files_do_nothing() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    for file in [Vec::new(), format!("{HEADER}\n").into_bytes()] {
        let outcome = reconciler.reconcile(&file).await.unwrap();
        assert_eq!((outcome.created, outcome.skipped), (0, 0));
    }
    assert!(contacts(&store).await.is_empty());
    assert!(status_names(&store).await.is_empty());
}

#[tokio::test]
async fn byte_order_mark_does_not_hide_first_column() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let mut file = b"\xEF\xBB\xBF".to_vec();
    file.extend_from_slice(&csv(&["Łucja,Wróbel,500,lucja@x.pl,Łódź,nowy"]));
    let outcome = reconciler.reconcile(&file).await.unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(contacts(&store).await[0].first_name, "Łucja");
}

#[tokio::test]
async fn blank_status_on_empty_taxonomy_creates_new() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let outcome = reconciler
        .reconcile(&csv(&[
            "John,Doe,123,j@x.com,Paris,",
            "Jane,Roe,124,jane@x.com,Lyon,",
        ]))
        .await
        .unwrap();

    assert_eq!(outcome.created, 2);
    assert_eq!(status_names(&store).await, ["new"]);
}

#[tokio::test]
async fn blank_status_uses_first_status_by_name_once_seeded() {
    let store = Arc::new(MemoryContactStore::new());
    let (normalizer, reconciler) = reconciler(store.clone());
    normalizer.seed_defaults().await.unwrap();

    reconciler
        .reconcile(&csv(&["John,Doe,123,j@x.com,Paris,"]))
        .await
        .unwrap();

    assert_eq!(contacts(&store).await[0].status.name, "in progress");
}

#[tokio::test]
async fn blank_status_default_ignores_statuses_added_by_earlier_rows() {
    let store = Arc::new(MemoryContactStore::new());
    let (normalizer, reconciler) = reconciler(store.clone());
    normalizer.seed_defaults().await.unwrap();

    let outcome = reconciler
        .reconcile(&csv(&[
            "Ada,Adams,101,ada@x.com,Warsaw,VIP",
            "Ben,Brown,102,ben@x.com,Warsaw,",
        ]))
        .await
        .unwrap();

    assert_eq!(outcome.created, 2);
    let stored = contacts(&store).await;
    let ada = stored.iter().find(|c| c.first_name == "Ada").unwrap();
    let ben = stored.iter().find(|c| c.first_name == "Ben").unwrap();
    assert_eq!(ada.status.name, "VIP");
    assert_eq!(ben.status.name, "in progress");
}

#[tokio::test]
async fn oversized_values_skip_only_their_row() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());
    let wide_phone = format!("John,Doe,{},j@x.com,Paris,new", "1".repeat(31));
    let wide_status = format!("Jane,Roe,124,jane@x.com,Lyon,{}", "s".repeat(51));

    let outcome = reconciler
        .reconcile(&csv(&[
            wide_phone.as_str(),
            wide_status.as_str(),
            "Jim,Poe,125,jim@x.com,Nice,new",
        ]))
        .await
        .unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.skipped, 2);
    assert!(matches!(
        &outcome.skips[0].reason,
        SkipReason::InvalidValue(detail) if detail.contains("phone_number")
    ));
    assert!(matches!(
        &outcome.skips[1].reason,
        SkipReason::InvalidValue(detail) if detail.contains("status")
    ));
    assert_eq!(contacts(&store).await[0].first_name, "Jim");
    assert_eq!(status_names(&store).await, ["new"]);
}

#[tokio::test]
async fn non_utf8_upload_fails_before_any_write() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let mut file = csv(&["John,Doe,123,j@x.com,Paris,new"]);
    file.extend_from_slice(b"Jos\xe9,Roe,124,jose@x.com,Lyon,new\n");

    let err = reconciler.reconcile(&file).await.unwrap_err();
    assert!(matches!(err, ImportError::Decode { .. }));
    assert!(contacts(&store).await.is_empty());
}

#[tokio::test]
async fn extra_columns_are_ignored_and_short_rows_skipped() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let file = "notes,first_name,last_name,phone_number,email,city\n\
                vip,John,Doe,123,j@x.com,Paris,trailing\n\
                ,Jane,Roe,124\n";
    let outcome = reconciler.reconcile(file.as_bytes()).await.unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(
        outcome.skips[0].reason,
        SkipReason::MissingField(RequiredField::Email)
    );
}

#[tokio::test]
async fn header_without_required_columns_skips_every_row() {
    let store = Arc::new(MemoryContactStore::new());
    let (_, reconciler) = reconciler(store.clone());

    let outcome = reconciler
        .reconcile(b"name,phone\nJohn Doe,123\n")
        .await
        .unwrap();

    assert_eq!(outcome.created, 0);
    assert_eq!(outcome.skipped, 1);
}

/// Fails every contact write after the first `allowed` succeed.
struct FlakyStore {
    inner: MemoryContactStore,
    allowed: usize,
    writes: AtomicUsize,
}

#[async_trait]
impl ContactStore for FlakyStore {
    async fn create_contact(&self, contact: NewContact) -> Result<Contact, StoreError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(StoreError::NotFound {
                entity: "connection",
                id: 0,
            });
        }
        self.inner.create_contact(contact).await
    }

    async fn update_contact(&self, id: i64, contact: NewContact) -> Result<Contact, StoreError> {
        self.inner.update_contact(id, contact).await
    }

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, StoreError> {
        self.inner.get_contact(id).await
    }

    async fn delete_contact(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete_contact(id).await
    }

    async fn list_contacts(&self, query: &ContactQuery) -> Result<Vec<Contact>, StoreError> {
        self.inner.list_contacts(query).await
    }

    async fn find_or_create_status(&self, name: &str) -> Result<CanonicalStatus, StoreError> {
        self.inner.find_or_create_status(name).await
    }

    async fn find_status(&self, name: &str) -> Result<Option<CanonicalStatus>, StoreError> {
        self.inner.find_status(name).await
    }

    async fn first_status(&self) -> Result<Option<CanonicalStatus>, StoreError> {
        self.inner.first_status().await
    }

    async fn list_statuses(&self) -> Result<Vec<CanonicalStatus>, StoreError> {
        self.inner.list_statuses().await
    }

    async fn reassign_status(&self, from_id: i64, to_id: i64) -> Result<u64, StoreError> {
        self.inner.reassign_status(from_id, to_id).await
    }

    async fn delete_status(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete_status(id).await
    }
}

#[tokio::test]
async fn store_failure_aborts_but_keeps_committed_rows() {
    let store = Arc::new(FlakyStore {
        inner: MemoryContactStore::new(),
        allowed: 1,
        writes: AtomicUsize::new(0),
    });
    let (_, reconciler) = reconciler(store.clone());

    let err = reconciler
        .reconcile(&csv(&[
            "John,Doe,123,j@x.com,Paris,new",
            "Jane,Roe,124,jane@x.com,Lyon,new",
        ]))
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Store(_)));
    assert_eq!(store.inner.contact_count().await, 1);
}

#[tokio::test]
async fn merge_job_folds_legacy_alias_statuses() {
    let store = Arc::new(MemoryContactStore::new());
    let legacy = store.find_or_create_status("nowy").await.unwrap();
    store
        .create_contact(NewContact {
            first_name: "Anna".into(),
            last_name: "Nowak".into(),
            phone: "111".into(),
            email: "anna@x.pl".into(),
            city: "Kraków".into(),
            status_id: legacy.id,
        })
        .await
        .unwrap();

    let aliases = StatusAliasTable::builtin().unwrap();
    let report = merge_alias_statuses(&*store, &aliases).await.unwrap();
    assert_eq!(report.migrated_contacts, 1);

    // Imports after the merge reuse the canonical entry.
    let (_, reconciler) = reconciler(store.clone());
    reconciler
        .reconcile(&csv(&["Jan,Nowak,222,jan@x.pl,Kraków,nowy"]))
        .await
        .unwrap();

    assert_eq!(status_names(&store).await, ["new"]);
    assert!(contacts(&store).await.iter().all(|c| c.status.name == "new"));
}
