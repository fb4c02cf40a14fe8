use std::sync::Arc;

use contacts_core::{
    CanonicalStatus, ImportRow, OutcomeTally, ReconciliationOutcome, RequiredField, RowOutcome,
    SkipReason,
};
use contacts_storage::{ContactStore, StoreError};
use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::taxonomy::{StatusNormalizer, FALLBACK_STATUS};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import file is not UTF-8 text (invalid byte at offset {valid_up_to})")]
    Decode { valid_up_to: usize },
    #[error("reading CSV header: {0}")]
    Header(#[source] csv::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Decodes an upload as UTF-8, accepting and dropping a leading byte-order
/// mark.
pub fn decode_payload(bytes: &[u8]) -> Result<&str, ImportError> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(body).map_err(|err| ImportError::Decode {
        valid_up_to: err.valid_up_to() + (bytes.len() - body.len()),
    })
}

/// Turns a CSV upload into contacts. Rows are independent: a bad or
/// duplicate row is counted as skipped and never undoes rows already
/// created.
#[derive(Clone)]
pub struct ImportReconciler {
    store: Arc<dyn ContactStore>,
    normalizer: StatusNormalizer,
}

impl ImportReconciler {
    pub fn new(store: Arc<dyn ContactStore>, normalizer: StatusNormalizer) -> Self {
        Self { store, normalizer }
    }

    pub async fn reconcile(&self, bytes: &[u8]) -> Result<ReconciliationOutcome, ImportError> {
        let text = decode_payload(bytes)?;
        let mut tally = OutcomeTally::start();
        let span = info_span!("import", run_id = %tally.run_id(), bytes = bytes.len());

        async move {
            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .trim(Trim::All)
                .from_reader(text.as_bytes());
            let headers = reader.headers().map_err(ImportError::Header)?.clone();
            warn_on_missing_columns(&headers);

            // Fixed before any row can add statuses of its own.
            let mut default_status = self.store.first_status().await?;
            for (idx, record) in reader.records().enumerate() {
                let fallback_line = idx as u64 + 2;
                let (line, outcome) = match record {
                    Ok(mut record) => {
                        let line = record.position().map_or(fallback_line, |p| p.line());
                        // Short rows read as blank trailing fields.
                        while record.len() < headers.len() {
                            record.push_field("");
                        }
                        let outcome = match record.deserialize::<ImportRow>(Some(&headers)) {
                            Ok(row) => self.reconcile_row(row, &mut default_status).await?,
                            Err(err) => RowOutcome::Skipped(SkipReason::Malformed(err.to_string())),
                        };
                        (line, outcome)
                    }
                    Err(err) => {
                        let line = err.position().map_or(fallback_line, |p| p.line());
                        (line, RowOutcome::Skipped(SkipReason::Malformed(err.to_string())))
                    }
                };

                if let RowOutcome::Skipped(reason) = &outcome {
                    debug!(line, %reason, "row skipped");
                }
                tally.record(line, outcome);
            }

            let outcome = tally.finish();
            info!(
                created = outcome.created,
                skipped = outcome.skipped,
                "import finished"
            );
            Ok::<_, ImportError>(outcome)
        }
        .instrument(span)
        .await
    }

    async fn reconcile_row(
        &self,
        row: ImportRow,
        default_status: &mut Option<CanonicalStatus>,
    ) -> Result<RowOutcome, ImportError> {
        let row = row.trimmed();
        if let Some(field) = row.missing_required() {
            return Ok(RowOutcome::Skipped(SkipReason::MissingField(field)));
        }

        let status = if row.status_name.is_empty() {
            match default_status {
                Some(status) => Ok(status.clone()),
                None => {
                    let created = self.store.find_or_create_status(FALLBACK_STATUS).await;
                    if let Ok(status) = &created {
                        *default_status = Some(status.clone());
                    }
                    created
                }
            }
        } else {
            self.normalizer.normalize(&row.status_name).await
        };
        let status = match status {
            Ok(status) => status,
            Err(StoreError::InvalidValue(detail)) => {
                return Ok(RowOutcome::Skipped(SkipReason::InvalidValue(detail)))
            }
            Err(err) => return Err(err.into()),
        };

        match self.store.create_contact(row.into_new_contact(status.id)).await {
            Ok(contact) => Ok(RowOutcome::Created(contact)),
            Err(StoreError::UniquenessViolation(field)) => {
                Ok(RowOutcome::Skipped(SkipReason::Duplicate(field)))
            }
            Err(StoreError::InvalidValue(detail)) => {
                Ok(RowOutcome::Skipped(SkipReason::InvalidValue(detail)))
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn warn_on_missing_columns(headers: &StringRecord) {
    if headers.is_empty() {
        return;
    }
    let missing: Vec<&str> = RequiredField::ALL
        .iter()
        .map(|f| f.column())
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "import header lacks required columns; every row will be skipped");
    }
}
