use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contacts_core::{
    check_status_name, CanonicalStatus, Contact, ContactQuery, ContactSort, NewContact,
    UniqueField,
};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::cache::{CacheError, CacheStore, Cached};
use crate::records::{ContactStore, StoreError};

/// `value too long for type character varying(n)`
const STRING_DATA_RIGHT_TRUNCATION: &str = "22001";
const CHECK_VIOLATION: &str = "23514";

const CONTACT_COLUMNS: &str = r#"
    c.id, c.first_name, c.last_name, c.phone_number, c.email, c.city, c.created_at,
    s.id AS status_id, s.name AS status_name
"#;

/// Record store over the `contacts` / `contact_statuses` schema in
/// `migrations/`.
#[derive(Debug, Clone)]
pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to contacts database")?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("running contacts migrations")?;
        info!("contacts schema is up to date");
        Ok(())
    }

    /// Cache backed by the same pool.
    pub fn cache(&self) -> PgCacheStore {
        PgCacheStore::new(self.pool.clone())
    }

    async fn fetch_contact(&self, id: i64) -> Result<Option<Contact>, StoreError> {
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts c JOIN contact_statuses s ON s.id = c.status_id WHERE c.id = $1"
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| contact_from_row(&r)).transpose()
    }
}

fn contact_from_row(row: &PgRow) -> Result<Contact, StoreError> {
    Ok(Contact {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone_number")?,
        email: row.try_get("email")?,
        city: row.try_get("city")?,
        status: CanonicalStatus {
            id: row.try_get("status_id")?,
            name: row.try_get("status_name")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

fn status_from_row(row: &PgRow) -> Result<CanonicalStatus, StoreError> {
    Ok(CanonicalStatus {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

/// Column width and check failures are row-level problems, not outages.
fn map_value_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(
            db.code().as_deref(),
            Some(STRING_DATA_RIGHT_TRUNCATION) | Some(CHECK_VIOLATION)
        ) {
            return StoreError::InvalidValue(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

/// Translates constraint failures on contact writes into domain errors.
fn map_contact_write_error(err: sqlx::Error, status_id: i64) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(name) if name.contains("email") => UniqueField::Email,
                _ => UniqueField::Phone,
            };
            return StoreError::UniquenessViolation(field);
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound {
                entity: "status",
                id: status_id,
            };
        }
    }
    map_value_error(err)
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn create_contact(&self, contact: NewContact) -> Result<Contact, StoreError> {
        contact.check_lengths()?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO contacts (first_name, last_name, phone_number, email, city, status_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.phone)
        .bind(&contact.email)
        .bind(&contact.city)
        .bind(contact.status_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_contact_write_error(err, contact.status_id))?;

        self.fetch_contact(id).await?.ok_or(StoreError::NotFound {
            entity: "contact",
            id,
        })
    }

    async fn update_contact(&self, id: i64, contact: NewContact) -> Result<Contact, StoreError> {
        contact.check_lengths()?;
        let result = sqlx::query(
            r#"
            UPDATE contacts
               SET first_name = $2,
                   last_name = $3,
                   phone_number = $4,
                   email = $5,
                   city = $6,
                   status_id = $7
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.phone)
        .bind(&contact.email)
        .bind(&contact.city)
        .bind(contact.status_id)
        .execute(&self.pool)
        .await
        .map_err(|err| map_contact_write_error(err, contact.status_id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "contact",
                id,
            });
        }
        self.fetch_contact(id).await?.ok_or(StoreError::NotFound {
            entity: "contact",
            id,
        })
    }

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, StoreError> {
        self.fetch_contact(id).await
    }

    async fn delete_contact(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "contact",
                id,
            });
        }
        Ok(())
    }

    async fn list_contacts(&self, query: &ContactQuery) -> Result<Vec<Contact>, StoreError> {
        let order = match query.sort {
            ContactSort::LastName => "c.last_name, c.first_name",
            ContactSort::CreatedAt => "c.created_at DESC, c.id DESC",
        };
        let sql = format!(
            r#"
            SELECT {CONTACT_COLUMNS}
              FROM contacts c
              JOIN contact_statuses s ON s.id = c.status_id
             WHERE $1::text IS NULL
                OR c.first_name ILIKE $1
                OR c.last_name ILIKE $1
                OR c.email ILIKE $1
                OR c.phone_number ILIKE $1
                OR c.city ILIKE $1
             ORDER BY {order}
            "#
        );
        let pattern = query.needle().map(like_pattern);
        let rows = sqlx::query(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(contact_from_row).collect()
    }

    async fn find_or_create_status(&self, name: &str) -> Result<CanonicalStatus, StoreError> {
        check_status_name(name)?;
        sqlx::query("INSERT INTO contact_statuses (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_value_error)?;
        let row = sqlx::query("SELECT id, name FROM contact_statuses WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        status_from_row(&row)
    }

    async fn find_status(&self, name: &str) -> Result<Option<CanonicalStatus>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM contact_statuses WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| status_from_row(&r)).transpose()
    }

    async fn first_status(&self) -> Result<Option<CanonicalStatus>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM contact_statuses ORDER BY name LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| status_from_row(&r)).transpose()
    }

    async fn list_statuses(&self) -> Result<Vec<CanonicalStatus>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM contact_statuses ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(status_from_row).collect()
    }

    async fn reassign_status(&self, from_id: i64, to_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE contacts SET status_id = $2 WHERE status_id = $1")
            .bind(from_id)
            .bind(to_id)
            .execute(&self.pool)
            .await
            .map_err(|err| map_contact_write_error(err, to_id))?;
        Ok(result.rows_affected())
    }

    async fn delete_status(&self, id: i64) -> Result<(), StoreError> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM contact_statuses WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(name) = name else {
            return Err(StoreError::NotFound {
                entity: "status",
                id,
            });
        };

        match sqlx::query("DELETE FROM contact_statuses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::StatusInUse(name))
            }
            Err(err) => Err(StoreError::Database(err)),
        }
    }
}

/// `CacheStore` over the `cache_entries` table, so entries outlive the
/// process. Expiry is stamped from the application clock.
#[derive(Debug, Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drops every expired entry; returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(cache_backend)?;
        Ok(result.rows_affected())
    }
}

fn cache_backend(err: sqlx::Error) -> CacheError {
    CacheError::Backend(err.to_string())
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, CacheError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| CacheError::Backend(format!("cache ttl {ttl:?} is out of range")))
}

/// Decodes a stored row, or `None` once it has expired.
fn live_entry(
    entry: JsonValue,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<Cached<JsonValue>>, CacheError> {
    if expires_at <= now {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(entry)?))
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Cached<JsonValue>>, CacheError> {
        let row = sqlx::query("SELECT entry, expires_at FROM cache_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(cache_backend)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let entry: JsonValue = row.try_get("entry").map_err(cache_backend)?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(cache_backend)?;
        let live = live_entry(entry, expires_at, Utc::now())?;
        if live.is_none() {
            debug!(key, "evicting expired cache entry");
            sqlx::query("DELETE FROM cache_entries WHERE key = $1 AND expires_at <= $2")
                .bind(key)
                .bind(Utc::now())
                .execute(&self.pool)
                .await
                .map_err(cache_backend)?;
        }
        Ok(live)
    }

    async fn set(
        &self,
        key: &str,
        value: Cached<JsonValue>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = expiry_after(Utc::now(), ttl)?;
        let entry = serde_json::to_value(&value)?;
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, entry, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
               SET entry = EXCLUDED.entry,
                   expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(entry)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(cache_backend)?;
        Ok(())
    }
}
