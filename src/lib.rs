//! Candidate tracking: a local SQLite store with live filtered queries, plus a
//! salary conversion lookup against a public exchange-rate API.

pub mod config;
pub mod currency;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod usecases;

pub use config::Config;
pub use currency::{CurrencyClient, RateProvider};
pub use error::{CandidateError, CurrencyError, StoreError};
pub use models::{Candidate, CandidateFilter, CandidateForm, MissingField};
pub use store::{CandidateStore, LiveQuery};
pub use usecases::{CandidateUseCases, ConvertedSalary};
