use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config;
use crate::error;

pub mod mem;
pub mod pg;

pub type AccountId = i64;

/// one staff account. the password hash is an opaque argon2 encoded string
/// and the totp secret is the raw shared secret bytes
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub password_hash: String,
    pub totp_secret: Option<Vec<u8>>,
    pub totp_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    pub patient_id: i64,
    pub gender: Option<String>,
    pub age: f64,
    pub hypertension: bool,
    pub heart_disease: bool,
    pub ever_married: Option<String>,
    pub work_type: Option<String>,
    pub residence_type: Option<String>,
    pub avg_glucose_level: f64,
    pub bmi: Option<f64>,
    pub smoking_status: String,
    pub stroke: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientFilter {
    Stroke,
    Hypertension,
    HeartDisease,
}

pub struct InvalidFilter;

impl FromStr for PatientFilter {
    type Err = InvalidFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stroke" => Ok(PatientFilter::Stroke),
            "hypertension" => Ok(PatientFilter::Hypertension),
            "heart_disease" => Ok(PatientFilter::HeartDisease),
            _ => Err(InvalidFilter),
        }
    }
}

impl PatientFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientFilter::Stroke => "stroke",
            PatientFilter::Hypertension => "hypertension",
            PatientFilter::HeartDisease => "heart_disease",
        }
    }

    pub fn matches(&self, patient: &Patient) -> bool {
        match self {
            PatientFilter::Stroke => patient.stroke,
            PatientFilter::Hypertension => patient.hypertension,
            PatientFilter::HeartDisease => patient.heart_disease,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenderCount {
    pub gender: String,
    pub count: i64,
}

/// dashboard aggregates over the patient table
#[derive(Debug, Default, Clone, Serialize)]
pub struct Summary {
    pub total: i64,
    pub stroke_cases: i64,
    pub hypertension_cases: i64,
    pub heart_disease_cases: i64,
    pub stroke_by_gender: Vec<GenderCount>,
}

impl Summary {
    pub fn heart_yes(&self) -> i64 {
        self.heart_disease_cases
    }

    pub fn heart_no(&self) -> i64 {
        std::cmp::max(self.total - self.heart_disease_cases, 0)
    }
}

/// computes the dashboard summary from patient rows
///
/// the memory store uses this directly. the postgres store produces the
/// same shape with aggregate queries
pub fn summarize<'a, I>(rows: I) -> Summary
where
    I: Iterator<Item = &'a Patient>
{
    use std::collections::BTreeMap;

    let mut summary = Summary::default();
    let mut genders: BTreeMap<String, i64> = BTreeMap::new();

    for patient in rows {
        summary.total += 1;

        if patient.hypertension {
            summary.hypertension_cases += 1;
        }

        if patient.heart_disease {
            summary.heart_disease_cases += 1;
        }

        if patient.stroke {
            summary.stroke_cases += 1;

            let gender = patient.gender
                .clone()
                .unwrap_or_else(|| String::from("Unknown"));

            *genders.entry(gender).or_default() += 1;
        }
    }

    summary.stroke_by_gender = genders.into_iter()
        .map(|(gender, count)| GenderCount { gender, count })
        .collect();

    summary
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an account with that email already exists")]
    DuplicateEmail,

    #[error("a patient with that id already exists")]
    DuplicatePatient,

    #[error("account was not found")]
    AccountNotFound,

    #[error("patient was not found")]
    PatientNotFound,

    #[error("account has no totp secret to enable")]
    TotpSecretMissing,

    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error(transparent)]
    Pg(#[from] tokio_postgres::Error),
}

impl From<StoreError> for crate::net::error::Error {
    fn from(err: StoreError) -> Self {
        use axum::http::StatusCode;
        use crate::net::error::Error as NetError;

        match err {
            StoreError::DuplicateEmail => NetError::new()
                .status(StatusCode::BAD_REQUEST)
                .kind("DuplicateEmail")
                .message("an account with that email already exists"),
            StoreError::DuplicatePatient => NetError::new()
                .status(StatusCode::BAD_REQUEST)
                .kind("DuplicatePatient")
                .message("a patient with that id already exists"),
            StoreError::PatientNotFound => NetError::new()
                .status(StatusCode::NOT_FOUND)
                .kind("PatientNotFound")
                .message("the requested patient was not found"),
            err => NetError::new().source(err),
        }
    }
}

/// identities are matched case-insensitively. lowercase at the store
/// boundary so every lookup and uniqueness check agrees
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// case-insensitive lookup. a miss is not an error
    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn retrieve_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// new accounts start with no totp secret and totp disabled
    async fn create_account(&self, email: &str, password_hash: &str) -> Result<Account, StoreError>;

    /// stores the secret only when none exists yet and returns whichever
    /// value is in the store afterwards. two racing enrollment attempts
    /// both observe the first writer's secret
    async fn assign_totp_secret(&self, id: AccountId, secret: Vec<u8>) -> Result<Vec<u8>, StoreError>;

    /// idempotent. fails when the account has no stored secret
    async fn enable_totp(&self, id: AccountId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn count_patients(&self) -> Result<i64, StoreError>;

    /// ordered by patient id
    async fn list_patients(
        &self,
        filter: Option<PatientFilter>,
        search: Option<i64>,
    ) -> Result<Vec<Patient>, StoreError>;

    async fn get_patient(&self, patient_id: i64) -> Result<Option<Patient>, StoreError>;

    async fn insert_patient(&self, patient: Patient) -> Result<(), StoreError>;

    async fn insert_patients(&self, patients: Vec<Patient>) -> Result<u64, StoreError>;

    async fn update_patient(&self, patient: Patient) -> Result<(), StoreError>;

    async fn delete_patient(&self, patient_id: i64) -> Result<bool, StoreError>;

    async fn patient_summary(&self) -> Result<Summary, StoreError>;
}

pub trait DataStore: CredentialStore + PatientStore {}

impl<T> DataStore for T
where
    T: CredentialStore + PatientStore
{}

pub type ArcStore = Arc<dyn DataStore>;

pub async fn from_config(config: &config::Config) -> error::Result<ArcStore> {
    match &config.settings.storage {
        config::Storage::Memory => {
            tracing::info!("using in-process memory store");

            Ok(Arc::new(mem::MemStore::new()))
        },
        config::Storage::Postgres { .. } => {
            tracing::info!("using postgres store");

            let store = pg::PgStore::from_config(config)?;
            store.prepare().await?;

            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn patient(id: i64, gender: &str, stroke: bool, hyper: bool, heart: bool) -> Patient {
        Patient {
            patient_id: id,
            gender: Some(String::from(gender)),
            age: 60.0,
            hypertension: hyper,
            heart_disease: heart,
            ever_married: Some(String::from("Yes")),
            work_type: Some(String::from("Private")),
            residence_type: Some(String::from("Urban")),
            avg_glucose_level: 100.0,
            bmi: Some(27.5),
            smoking_status: String::from("never smoked"),
            stroke,
        }
    }

    #[test]
    fn summarize_counts_and_gender_rows() {
        let rows = vec![
            patient(1, "Male", true, true, false),
            patient(2, "Female", true, false, true),
            patient(3, "Female", true, false, false),
            patient(4, "Male", false, true, true),
        ];

        let summary = summarize(rows.iter());

        assert_eq!(summary.total, 4);
        assert_eq!(summary.stroke_cases, 3);
        assert_eq!(summary.hypertension_cases, 2);
        assert_eq!(summary.heart_disease_cases, 2);
        assert_eq!(summary.heart_yes(), 2);
        assert_eq!(summary.heart_no(), 2);

        assert_eq!(summary.stroke_by_gender.len(), 2);
        assert_eq!(summary.stroke_by_gender[0].gender, "Female");
        assert_eq!(summary.stroke_by_gender[0].count, 2);
        assert_eq!(summary.stroke_by_gender[1].gender, "Male");
        assert_eq!(summary.stroke_by_gender[1].count, 1);
    }

    #[test]
    fn summarize_missing_gender_buckets_unknown() {
        let mut unknown = patient(1, "Male", true, false, false);
        unknown.gender = None;

        let rows = vec![unknown];
        let summary = summarize(rows.iter());

        assert_eq!(summary.stroke_by_gender.len(), 1);
        assert_eq!(summary.stroke_by_gender[0].gender, "Unknown");
    }

    #[test]
    fn filter_from_query_value(){
        assert_eq!(PatientFilter::from_str("stroke").ok(), Some(PatientFilter::Stroke));
        assert_eq!(PatientFilter::from_str("hypertension").ok(), Some(PatientFilter::Hypertension));
        assert_eq!(PatientFilter::from_str("heart_disease").ok(), Some(PatientFilter::HeartDisease));
        assert!(PatientFilter::from_str("everyone").is_err());
    }
}
