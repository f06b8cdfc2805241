use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A persisted job applicant. `id` is 0 until the store assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photo: Vec<u8>, // opaque bytes supplied by the caller
    pub phone_number: String,
    pub email: String,
    pub date_of_birth: DateTime<Utc>,
    pub expected_salary: u32, // home currency
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Candidate {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whole years between the birth date and `today`.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        let born = self.date_of_birth.date_naive();
        let mut years = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            years -= 1;
        }
        years.max(0) as u32
    }

    pub fn birth_date_display(&self) -> String {
        self.date_of_birth.format("%d/%m/%Y").to_string()
    }
}

/// Unvalidated candidate data as entered by the user. Turned into a
/// [`Candidate`] by the insert/update use cases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateForm {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub photo: Vec<u8>,
    pub phone_number: String,
    pub email: String,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub expected_salary: u32,
    pub note: Option<String>,
    pub is_favorite: bool,
}

impl From<Candidate> for CandidateForm {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: Some(candidate.id),
            first_name: candidate.first_name,
            last_name: candidate.last_name,
            photo: candidate.photo,
            phone_number: candidate.phone_number,
            email: candidate.email,
            date_of_birth: Some(candidate.date_of_birth),
            expected_salary: candidate.expected_salary,
            note: Some(candidate.note),
            is_favorite: candidate.is_favorite,
        }
    }
}

/// Required form fields, in form order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissingField {
    FirstName,
    LastName,
    PhoneNumber,
    Email,
    DateOfBirth,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingField::FirstName => "first name",
            MissingField::LastName => "last name",
            MissingField::PhoneNumber => "phone number",
            MissingField::Email => "email",
            MissingField::DateOfBirth => "date of birth",
        };
        f.write_str(name)
    }
}

/// Predicates for a candidate listing. `None` means "no constraint" for
/// either field; an empty name pattern is normalised to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub favorite: Option<bool>,
    pub name: Option<String>,
}

impl CandidateFilter {
    pub fn new(favorite: Option<bool>, name: Option<&str>) -> Self {
        Self::default().favorite(favorite).name(name)
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn favorite(mut self, favorite: Option<bool>) -> Self {
        self.favorite = favorite;
        self
    }

    pub fn name(mut self, name: Option<&str>) -> Self {
        self.name = name.filter(|n| !n.is_empty()).map(str::to_string);
        self
    }

    /// In-memory equivalent of the SQL predicate (ASCII case-insensitive).
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if let Some(favorite) = self.favorite {
            if candidate.is_favorite != favorite {
                return false;
            }
        }
        match &self.name {
            Some(pattern) => {
                let pattern = pattern.to_ascii_lowercase();
                candidate.first_name.to_ascii_lowercase().contains(&pattern)
                    || candidate.last_name.to_ascii_lowercase().contains(&pattern)
            }
            None => true,
        }
    }
}
