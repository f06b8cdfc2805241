//! User-facing operations over the candidate store and the rate provider.
//! Validation lives here; the store accepts whatever it is given.

use chrono::{SubsecRound, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::currency::RateProvider;
use crate::error::CandidateError;
use crate::models::{Candidate, CandidateFilter, CandidateForm, MissingField};
use crate::store::{CandidateStore, LiveQuery};

type Result<T> = std::result::Result<T, CandidateError>;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// An expected salary expressed in the target currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertedSalary {
    pub amount: f64,
    pub rate: f64,
    pub currency: String,
}

impl fmt::Display for ConvertedSalary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match currency_symbol(&self.currency) {
            Some(symbol) => write!(f, "{symbol} {:.2}", self.amount),
            None => write!(f, "{} {:.2}", self.currency.to_uppercase(), self.amount),
        }
    }
}

fn currency_symbol(code: &str) -> Option<&'static str> {
    match code.to_lowercase().as_str() {
        "gbp" => Some("£"),
        "eur" => Some("€"),
        "usd" => Some("$"),
        _ => None,
    }
}

pub struct CandidateUseCases<R> {
    store: CandidateStore,
    rates: R,
    target_currency: String,
}

impl<R: RateProvider> CandidateUseCases<R> {
    pub fn new(store: CandidateStore, rates: R, target_currency: &str) -> Self {
        Self {
            store,
            rates,
            target_currency: target_currency.to_lowercase(),
        }
    }

    pub fn store(&self) -> &CandidateStore {
        &self.store
    }

    pub fn target_currency(&self) -> &str {
        &self.target_currency
    }

    pub fn get_all(&self) -> Result<LiveQuery<Vec<Candidate>>> {
        self.get_filtered(CandidateFilter::all())
    }

    pub fn get_filtered(&self, filter: CandidateFilter) -> Result<LiveQuery<Vec<Candidate>>> {
        Ok(self.store.get_filtered(filter)?)
    }

    pub fn get_by_id(&self, id: i64) -> Result<LiveQuery<Option<Candidate>>> {
        Ok(self.store.get_by_id(id)?)
    }

    /// Validates and stores a new candidate, returning its id.
    pub async fn insert(&self, form: CandidateForm) -> Result<i64> {
        let candidate = validate(form)?;
        let id = self.store.insert(&candidate).await?;
        info!(id, "candidate added");
        Ok(id)
    }

    /// Validates and replaces an existing candidate. Returns the number of rows
    /// updated: 0 when the id is unset or unknown.
    pub async fn update(&self, form: CandidateForm) -> Result<usize> {
        let candidate = validate(form)?;
        let updated = self.store.update(&candidate).await?;
        debug!(id = candidate.id, updated, "candidate update applied");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<usize> {
        Ok(self.store.delete_by_id(id).await?)
    }

    pub async fn delete_all(&self) -> Result<usize> {
        Ok(self.store.delete_all().await?)
    }

    /// Inverts the favorite flag. Returns the new state, or `None` when no
    /// candidate has `id`.
    pub async fn toggle_favorite(&self, id: i64) -> Result<Option<bool>> {
        let Some(current) = self.store.fetch_by_id(id).await? else {
            return Ok(None);
        };
        let favorite = !current.is_favorite;
        let updated = self.store.toggle_favorite_status(id, favorite).await?;
        Ok((updated > 0).then_some(favorite))
    }

    /// Converts a home-currency salary into the target currency.
    pub async fn convert_salary(&self, salary: u32) -> Result<ConvertedSalary> {
        let rate = self.rates.get_rate(&self.target_currency).await.ok_or_else(|| {
            CandidateError::ConversionUnavailable {
                currency: self.target_currency.clone(),
            }
        })?;
        Ok(ConvertedSalary {
            amount: f64::from(salary) * rate,
            rate,
            currency: self.target_currency.clone(),
        })
    }

    /// Adds the sample candidate a fresh database used to ship with.
    pub async fn seed_sample(&self) -> Result<i64> {
        let form = CandidateForm {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            phone_number: "123456789".to_string(),
            email: "john.doe@email.com".to_string(),
            date_of_birth: Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).single(),
            expected_salary: 1000,
            note: Some("ma note".to_string()),
            ..CandidateForm::default()
        };
        self.insert(form).await
    }
}

/// Checks required fields and email shape before anything touches the store.
pub fn validate(form: CandidateForm) -> Result<Candidate> {
    let mut missing = Vec::new();
    if form.first_name.trim().is_empty() {
        missing.push(MissingField::FirstName);
    }
    if form.last_name.trim().is_empty() {
        missing.push(MissingField::LastName);
    }
    if form.phone_number.trim().is_empty() {
        missing.push(MissingField::PhoneNumber);
    }
    if form.email.trim().is_empty() {
        missing.push(MissingField::Email);
    }
    let Some(date_of_birth) = form.date_of_birth else {
        missing.push(MissingField::DateOfBirth);
        return Err(CandidateError::Validation { fields: missing });
    };
    if !missing.is_empty() {
        return Err(CandidateError::Validation { fields: missing });
    }

    let email = form.email.trim().to_string();
    if !EMAIL_RE.is_match(&email) {
        return Err(CandidateError::InvalidEmailFormat { email });
    }

    Ok(Candidate {
        id: form.id.unwrap_or(0),
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        photo: form.photo,
        phone_number: form.phone_number.trim().to_string(),
        email,
        // Stored as epoch milliseconds.
        date_of_birth: date_of_birth.trunc_subsecs(3),
        expected_salary: form.expected_salary,
        note: form.note.unwrap_or_default(),
        is_favorite: form.is_favorite,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Rate provider returning a fixed answer and counting lookups.
    struct FixedRate {
        rate: Option<f64>,
        calls: AtomicUsize,
    }

    impl FixedRate {
        fn new(rate: Option<f64>) -> Self {
            Self {
                rate,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RateProvider for FixedRate {
        async fn get_rate(&self, _target: &str) -> Option<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rate
        }
    }

    fn use_cases(rate: Option<f64>) -> CandidateUseCases<FixedRate> {
        let store = CandidateStore::open_in_memory().unwrap();
        CandidateUseCases::new(store, FixedRate::new(rate), "GBP")
    }

    fn form(first: &str, last: &str) -> CandidateForm {
        CandidateForm {
            first_name: first.to_string(),
            last_name: last.to_string(),
            phone_number: "0612345678".to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            date_of_birth: Utc.with_ymd_and_hms(1985, 7, 20, 0, 0, 0).single(),
            expected_salary: 3000,
            ..CandidateForm::default()
        }
    }

    #[tokio::test]
    async fn test_insert_then_get_by_id_round_trips() {
        let uc = use_cases(None);
        let mut input = form("John", "Doe");
        input.id = Some(99);
        input.photo = vec![0xff, 0xd8];
        let id = uc.insert(input.clone()).await.unwrap();

        let mut live = uc.get_by_id(id).unwrap();
        let stored = timeout(Duration::from_secs(5), live.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.first_name, "John");
        assert_eq!(stored.photo, vec![0xff, 0xd8]);
        assert_eq!(stored.note, "");
        assert!(!stored.is_favorite);
    }

    #[tokio::test]
    async fn test_insert_rejects_blank_fields_without_writing() {
        let uc = use_cases(None);
        let input = CandidateForm {
            first_name: "  ".to_string(),
            email: String::new(),
            date_of_birth: None,
            ..form("John", "Doe")
        };

        match uc.insert(input).await {
            Err(CandidateError::Validation { fields }) => assert_eq!(
                fields,
                vec![
                    MissingField::FirstName,
                    MissingField::Email,
                    MissingField::DateOfBirth
                ]
            ),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(uc.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_rejects_malformed_email() {
        let uc = use_cases(None);
        for email in ["john", "john@", "@example.com", "john@example", "jo hn@example.com"] {
            let input = CandidateForm {
                email: email.to_string(),
                ..form("John", "Doe")
            };
            assert!(
                matches!(uc.insert(input).await, Err(CandidateError::InvalidEmailFormat { .. })),
                "{email} should be rejected"
            );
        }
        assert_eq!(uc.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_birth_date_keeps_millisecond_precision() {
        let uc = use_cases(None);
        let dob = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::microseconds(1_500);
        let input = CandidateForm {
            date_of_birth: Some(dob),
            ..form("John", "Doe")
        };

        let expected = validate(input.clone()).unwrap();
        assert_eq!(expected.date_of_birth.timestamp_subsec_micros(), 1_000);

        let id = uc.insert(input).await.unwrap();
        let stored = uc.store().fetch_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored, Candidate { id, ..expected });
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vitesse.db");
        let store = CandidateStore::new(Database::open(&path).unwrap());
        let uc = CandidateUseCases::new(store, FixedRate::new(None), "gbp");
        let id = uc.insert(form("John", "Doe")).await.unwrap();

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute("DROP TABLE candidates", [])
            .unwrap();

        assert!(matches!(
            uc.insert(form("Jane", "Roe")).await,
            Err(CandidateError::Storage(StoreError::Sqlite(_)))
        ));
        let input = CandidateForm {
            id: Some(id),
            ..form("John", "Doe")
        };
        assert!(matches!(
            uc.update(input).await,
            Err(CandidateError::Storage(StoreError::Sqlite(_)))
        ));
        assert!(matches!(
            uc.toggle_favorite(id).await,
            Err(CandidateError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_zero() {
        let uc = use_cases(None);
        let input = CandidateForm {
            id: Some(404),
            ..form("John", "Doe")
        };
        assert_eq!(uc.update(input).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_replaces_row() {
        let uc = use_cases(None);
        let id = uc.insert(form("John", "Doe")).await.unwrap();
        let input = CandidateForm {
            id: Some(id),
            note: Some("second interview".to_string()),
            expected_salary: 4200,
            ..form("John", "Doe")
        };
        assert_eq!(uc.update(input).await.unwrap(), 1);

        let stored = uc.store().fetch_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.note, "second interview");
        assert_eq!(stored.expected_salary, 4200);
    }

    #[tokio::test]
    async fn test_toggle_favorite_twice_restores_value() {
        let uc = use_cases(None);
        let id = uc.insert(form("John", "Doe")).await.unwrap();
        assert_eq!(uc.toggle_favorite(id).await.unwrap(), Some(true));
        assert_eq!(uc.toggle_favorite(id).await.unwrap(), Some(false));
        assert!(!uc.store().fetch_by_id(id).await.unwrap().unwrap().is_favorite);
        assert_eq!(uc.toggle_favorite(id + 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_and_delete_all() {
        let uc = use_cases(None);
        let id = uc.insert(form("John", "Doe")).await.unwrap();
        uc.insert(form("Jane", "Roe")).await.unwrap();

        assert_eq!(uc.delete(id).await.unwrap(), 1);
        assert_eq!(uc.delete(id).await.unwrap(), 0);
        assert_eq!(uc.delete_all().await.unwrap(), 1);
        assert_eq!(uc.delete_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_all_lists_everything_sorted() {
        let uc = use_cases(None);
        uc.insert(form("Jane", "Roe")).await.unwrap();
        uc.insert(form("John", "Doe")).await.unwrap();

        let mut live = uc.get_all().unwrap();
        let all = timeout(Duration::from_secs(5), live.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let names: Vec<String> = all.iter().map(Candidate::full_name).collect();
        assert_eq!(names, vec!["John Doe", "Jane Roe"]);
    }

    #[tokio::test]
    async fn test_convert_salary_multiplies_and_formats() {
        let uc = use_cases(Some(0.85));
        let converted = uc.convert_salary(3000).await.unwrap();
        assert!((converted.amount - 2550.0).abs() < 1e-9);
        assert_eq!(converted.currency, "gbp");
        assert_eq!(converted.to_string(), "£ 2550.00");
        assert_eq!(uc.rates.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_convert_salary_fetches_every_time() {
        let uc = use_cases(Some(1.1));
        uc.convert_salary(1).await.unwrap();
        uc.convert_salary(1).await.unwrap();
        assert_eq!(uc.rates.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_convert_salary_unavailable_is_distinct() {
        let uc = use_cases(None);
        match uc.convert_salary(3000).await {
            Err(CandidateError::ConversionUnavailable { currency }) => assert_eq!(currency, "gbp"),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_seed_sample_inserts_john_doe() {
        let uc = use_cases(None);
        let id = uc.seed_sample().await.unwrap();
        let john = uc.store().fetch_by_id(id).await.unwrap().unwrap();
        assert_eq!(john.full_name(), "John Doe");
        assert_eq!(john.note, "ma note");
    }

    #[test]
    fn test_converted_salary_unknown_currency_uses_code() {
        let converted = ConvertedSalary {
            amount: 12.5,
            rate: 0.1,
            currency: "chf".to_string(),
        };
        assert_eq!(converted.to_string(), "CHF 12.50");
    }
}
