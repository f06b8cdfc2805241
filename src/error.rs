use thiserror::Error;

use crate::models::MissingField;

/// Failure of the storage medium itself. Logical misses (unknown id, empty
/// result) are never reported through this type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("database handle poisoned by a panicked writer")]
    Poisoned,

    #[error("live queries need a running tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Why a rate lookup failed. Absorbed by [`crate::currency::CurrencyClient::get_rate`].
#[derive(Debug, Error)]
pub enum CurrencyError {
    #[error("rate request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate provider returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("rate response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected rate envelope: {0}")]
    Envelope(String),

    #[error("no {target} rate in {base} table")]
    MissingRate { base: String, target: String },

    #[error("unusable {target} rate: {rate}")]
    InvalidRate { target: String, rate: f64 },
}

/// Outcome of a use case that did not produce a value.
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("missing required fields: {}", join_fields(.fields))]
    Validation { fields: Vec<MissingField> },

    #[error("invalid email address: {email}")]
    InvalidEmailFormat { email: String },

    #[error("conversion to {currency} is unavailable")]
    ConversionUnavailable { currency: String },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

fn join_fields(fields: &[MissingField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
