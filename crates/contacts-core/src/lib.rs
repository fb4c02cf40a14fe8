//! Core domain model for the contact directory: statuses, contacts, import rows
//! and the enrichment value types shared by the import and weather crates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "contacts-core";

/// Authoritative taxonomy entry. Names are unique and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalStatus {
    pub id: i64,
    pub name: String,
}

/// Durable contact record as returned by a record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub city: String,
    pub status: CanonicalStatus,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields needed to create or overwrite a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub city: String,
    pub status_id: i64,
}

impl NewContact {
    /// Checks every field against its column width in `migrations/`.
    pub fn check_lengths(&self) -> Result<(), FieldTooLong> {
        let columns = [
            ("first_name", &self.first_name, 80),
            ("last_name", &self.last_name, 80),
            ("phone_number", &self.phone, 30),
            ("email", &self.email, 254),
            ("city", &self.city, 120),
        ];
        for (column, value, max_chars) in columns {
            if value.chars().count() > max_chars {
                return Err(FieldTooLong::new(column, max_chars));
            }
        }
        Ok(())
    }
}

pub const STATUS_NAME_MAX_CHARS: usize = 50;

pub fn check_status_name(name: &str) -> Result<(), FieldTooLong> {
    if name.chars().count() > STATUS_NAME_MAX_CHARS {
        return Err(FieldTooLong::new("status", STATUS_NAME_MAX_CHARS));
    }
    Ok(())
}

/// A value wider than its column. Widths count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTooLong {
    pub column: String,
    pub max_chars: usize,
}

impl FieldTooLong {
    pub fn new(column: &str, max_chars: usize) -> Self {
        Self {
            column: column.to_string(),
            max_chars,
        }
    }
}

impl fmt::Display for FieldTooLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} exceeds {} characters", self.column, self.max_chars)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSort {
    #[default]
    LastName,
    CreatedAt,
}

/// Listing filter: case-insensitive substring search plus ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactQuery {
    pub search: Option<String>,
    pub sort: ContactSort,
}

impl ContactQuery {
    /// The trimmed, non-empty search needle, if any.
    pub fn needle(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn matches(&self, contact: &Contact) -> bool {
        let Some(needle) = self.needle() else {
            return true;
        };
        let needle = needle.to_lowercase();
        [
            &contact.first_name,
            &contact.last_name,
            &contact.email,
            &contact.phone,
            &contact.city,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// One raw CSV record. Absent columns deserialize as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, rename = "phone_number")]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub city: String,
    #[serde(default, rename = "status")]
    pub status_name: String,
}

impl ImportRow {
    pub fn trimmed(&self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            city: self.city.trim().to_string(),
            status_name: self.status_name.trim().to_string(),
        }
    }

    /// First required field that is blank, in column order.
    pub fn missing_required(&self) -> Option<RequiredField> {
        RequiredField::ALL
            .into_iter()
            .find(|field| self.value_of(*field).trim().is_empty())
    }

    pub fn value_of(&self, field: RequiredField) -> &str {
        match field {
            RequiredField::FirstName => &self.first_name,
            RequiredField::LastName => &self.last_name,
            RequiredField::Phone => &self.phone,
            RequiredField::Email => &self.email,
            RequiredField::City => &self.city,
        }
    }

    pub fn into_new_contact(self, status_id: i64) -> NewContact {
        NewContact {
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            email: self.email,
            city: self.city,
            status_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    FirstName,
    LastName,
    Phone,
    Email,
    City,
}

impl RequiredField {
    pub const ALL: [RequiredField; 5] = [
        RequiredField::FirstName,
        RequiredField::LastName,
        RequiredField::Phone,
        RequiredField::Email,
        RequiredField::City,
    ];

    /// CSV column name.
    pub fn column(self) -> &'static str {
        match self {
            RequiredField::FirstName => "first_name",
            RequiredField::LastName => "last_name",
            RequiredField::Phone => "phone_number",
            RequiredField::Email => "email",
            RequiredField::City => "city",
        }
    }
}

/// Columns guarded by a uniqueness constraint in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueField {
    Phone,
    Email,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Phone => f.write_str("phone_number"),
            UniqueField::Email => f.write_str("email"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    MissingField(RequiredField),
    Duplicate(UniqueField),
    /// Rejected by the store's column constraints.
    InvalidValue(String),
    Malformed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingField(field) => write!(f, "missing {}", field.column()),
            SkipReason::Duplicate(field) => write!(f, "duplicate {field}"),
            SkipReason::InvalidValue(detail) => write!(f, "invalid value: {detail}"),
            SkipReason::Malformed(detail) => write!(f, "malformed record: {detail}"),
        }
    }
}

/// Per-row result folded into a [`ReconciliationOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Created(Contact),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSkip {
    /// 1-based line of the record in the source file, header included.
    pub line: u64,
    pub reason: SkipReason,
}

/// Aggregate result of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created: usize,
    pub skipped: usize,
    pub skips: Vec<RowSkip>,
}

/// Mutable accumulator; [`OutcomeTally::finish`] freezes it into an outcome.
#[derive(Debug)]
pub struct OutcomeTally {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    created: usize,
    skips: Vec<RowSkip>,
}

impl OutcomeTally {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            created: 0,
            skips: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&mut self, line: u64, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Created(_) => self.created += 1,
            RowOutcome::Skipped(reason) => self.skips.push(RowSkip { line, reason }),
        }
    }

    pub fn finish(self) -> ReconciliationOutcome {
        ReconciliationOutcome {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            created: self.created,
            skipped: self.skips.len(),
            skips: self.skips,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Current conditions for a city. Any field may be missing upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub relative_humidity: Option<f64>,
}

/// Cache key fragment shared by the geo and weather namespaces.
pub fn city_key(city: &str) -> String {
    city.trim().to_lowercase()
}
