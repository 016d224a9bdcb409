use std::fmt::Write;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use tokio_postgres::Row;

use crate::config;
use crate::error;
use crate::sql;

use super::{
    Account,
    AccountId,
    CredentialStore,
    GenderCount,
    Patient,
    PatientFilter,
    PatientStore,
    StoreError,
    Summary,
    normalize_email,
};

pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn from_config(config: &config::Config) -> error::Result<Self> {
        let config::Storage::Postgres { user, password, host, port, dbname } = &config.settings.storage else {
            return Err(error::Error::new()
                .context("postgres store requested without postgres settings"));
        };

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.user(user);
        pg_config.host(host);
        pg_config.port(port.unwrap_or(5432));
        pg_config.dbname(dbname);

        if let Some(password) = password {
            pg_config.password(password);
        }

        let manager = Manager::from_config(pg_config, NoTls, ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = Pool::builder(manager)
            .max_size(16)
            .build()?;

        Ok(PgStore {
            pool,
        })
    }

    /// creates missing tables. safe to run on every startup
    pub async fn prepare(&self) -> error::Result<()> {
        let conn = self.pool.get().await?;

        conn.batch_execute(
            "\
            create table if not exists accounts (\
                id bigint primary key generated always as identity, \
                email varchar not null unique, \
                password_hash varchar not null, \
                totp_secret bytea, \
                totp_enabled bool not null default false\
            ); \
            create table if not exists patients (\
                patient_id bigint primary key, \
                gender varchar, \
                age double precision not null, \
                hypertension bool not null, \
                heart_disease bool not null, \
                ever_married varchar, \
                work_type varchar, \
                residence_type varchar, \
                avg_glucose_level double precision not null, \
                bmi double precision, \
                smoking_status varchar not null, \
                stroke bool not null\
            )"
        ).await?;

        Ok(())
    }
}

fn account_from_row(row: &Row) -> Account {
    Account {
        id: row.get(0),
        email: row.get(1),
        password_hash: row.get(2),
        totp_secret: row.get(3),
        totp_enabled: row.get(4),
    }
}

fn patient_from_row(row: &Row) -> Patient {
    Patient {
        patient_id: row.get(0),
        gender: row.get(1),
        age: row.get(2),
        hypertension: row.get(3),
        heart_disease: row.get(4),
        ever_married: row.get(5),
        work_type: row.get(6),
        residence_type: row.get(7),
        avg_glucose_level: row.get(8),
        bmi: row.get(9),
        smoking_status: row.get(10),
        stroke: row.get(11),
    }
}

const PATIENT_COLUMNS: &str = "\
    patients.patient_id, \
    patients.gender, \
    patients.age, \
    patients.hypertension, \
    patients.heart_disease, \
    patients.ever_married, \
    patients.work_type, \
    patients.residence_type, \
    patients.avg_glucose_level, \
    patients.bmi, \
    patients.smoking_status, \
    patients.stroke";

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let normalized = normalize_email(email);
        let conn = self.pool.get().await?;

        if let Some(row) = conn.query_opt(
            "\
            select accounts.id, \
                   accounts.email, \
                   accounts.password_hash, \
                   accounts.totp_secret, \
                   accounts.totp_enabled \
            from accounts \
            where accounts.email = $1",
            &[&normalized]
        ).await? {
            Ok(Some(account_from_row(&row)))
        } else {
            Ok(None)
        }
    }

    async fn retrieve_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let conn = self.pool.get().await?;

        if let Some(row) = conn.query_opt(
            "\
            select accounts.id, \
                   accounts.email, \
                   accounts.password_hash, \
                   accounts.totp_secret, \
                   accounts.totp_enabled \
            from accounts \
            where accounts.id = $1",
            &[&id]
        ).await? {
            Ok(Some(account_from_row(&row)))
        } else {
            Ok(None)
        }
    }

    async fn create_account(&self, email: &str, password_hash: &str) -> Result<Account, StoreError> {
        let normalized = normalize_email(email);
        let conn = self.pool.get().await?;

        let result = conn.query_one(
            "\
            insert into accounts (email, password_hash) values \
            ($1, $2) \
            returning id",
            &[&normalized, &password_hash]
        ).await;

        match result {
            Ok(row) => Ok(Account {
                id: row.get(0),
                email: normalized,
                password_hash: String::from(password_hash),
                totp_secret: None,
                totp_enabled: false,
            }),
            Err(err) => {
                if sql::unique_constraint_error(&err).is_some() {
                    Err(StoreError::DuplicateEmail)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn assign_totp_secret(&self, id: AccountId, secret: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        let conn = self.pool.get().await?;

        // first writer wins. the conditional update leaves an existing
        // secret untouched and the follow-up select returns the winner
        let _ = conn.execute(
            "\
            update accounts \
            set totp_secret = $2 \
            where id = $1 and \
                  totp_secret is null",
            &[&id, &secret]
        ).await?;

        let Some(row) = conn.query_opt(
            "select totp_secret from accounts where id = $1",
            &[&id]
        ).await? else {
            return Err(StoreError::AccountNotFound);
        };

        let stored: Option<Vec<u8>> = row.get(0);

        stored.ok_or(StoreError::TotpSecretMissing)
    }

    async fn enable_totp(&self, id: AccountId) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;

        let count = conn.execute(
            "\
            update accounts \
            set totp_enabled = true \
            where id = $1 and \
                  totp_secret is not null",
            &[&id]
        ).await?;

        if count == 1 {
            return Ok(());
        }

        let exists = conn.query_opt(
            "select id from accounts where id = $1",
            &[&id]
        ).await?;

        if exists.is_some() {
            Err(StoreError::TotpSecretMissing)
        } else {
            Err(StoreError::AccountNotFound)
        }
    }
}

#[async_trait]
impl PatientStore for PgStore {
    async fn count_patients(&self) -> Result<i64, StoreError> {
        let conn = self.pool.get().await?;

        let row = conn.query_one("select count(*) from patients", &[]).await?;

        Ok(row.get(0))
    }

    async fn list_patients(
        &self,
        filter: Option<PatientFilter>,
        search: Option<i64>,
    ) -> Result<Vec<Patient>, StoreError> {
        let conn = self.pool.get().await?;

        let mut query = format!("select {PATIENT_COLUMNS} from patients");
        let mut params: sql::ParamsVec = Vec::new();

        if let Some(filter) = filter.as_ref() {
            let column = match filter {
                PatientFilter::Stroke => "stroke",
                PatientFilter::Hypertension => "hypertension",
                PatientFilter::HeartDisease => "heart_disease",
            };

            write!(&mut query, " where patients.{column}").unwrap();
        }

        if let Some(id) = search.as_ref() {
            let lead = if filter.is_none() {
                "where"
            } else {
                "and"
            };

            write!(
                &mut query,
                " {lead} patients.patient_id = ${}",
                sql::push_param(&mut params, id)
            ).unwrap();
        }

        query.push_str(" order by patients.patient_id");

        let found = conn.query(query.as_str(), params.as_slice())
            .await?
            .iter()
            .map(patient_from_row)
            .collect();

        Ok(found)
    }

    async fn get_patient(&self, patient_id: i64) -> Result<Option<Patient>, StoreError> {
        let conn = self.pool.get().await?;

        if let Some(row) = conn.query_opt(
            format!("select {PATIENT_COLUMNS} from patients where patients.patient_id = $1").as_str(),
            &[&patient_id]
        ).await? {
            Ok(Some(patient_from_row(&row)))
        } else {
            Ok(None)
        }
    }

    async fn insert_patient(&self, patient: Patient) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;

        let result = conn.execute(
            "\
            insert into patients (\
                patient_id, \
                gender, \
                age, \
                hypertension, \
                heart_disease, \
                ever_married, \
                work_type, \
                residence_type, \
                avg_glucose_level, \
                bmi, \
                smoking_status, \
                stroke\
            ) values \
            ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            &[
                &patient.patient_id,
                &patient.gender,
                &patient.age,
                &patient.hypertension,
                &patient.heart_disease,
                &patient.ever_married,
                &patient.work_type,
                &patient.residence_type,
                &patient.avg_glucose_level,
                &patient.bmi,
                &patient.smoking_status,
                &patient.stroke,
            ]
        ).await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                if sql::unique_constraint_error(&err).is_some() {
                    Err(StoreError::DuplicatePatient)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn insert_patients(&self, patients: Vec<Patient>) -> Result<u64, StoreError> {
        let mut conn = self.pool.get().await?;
        let transaction = conn.transaction().await?;

        let mut inserted = 0;

        for patient in &patients {
            inserted += transaction.execute(
                "\
                insert into patients (\
                    patient_id, \
                    gender, \
                    age, \
                    hypertension, \
                    heart_disease, \
                    ever_married, \
                    work_type, \
                    residence_type, \
                    avg_glucose_level, \
                    bmi, \
                    smoking_status, \
                    stroke\
                ) values \
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                &[
                    &patient.patient_id,
                    &patient.gender,
                    &patient.age,
                    &patient.hypertension,
                    &patient.heart_disease,
                    &patient.ever_married,
                    &patient.work_type,
                    &patient.residence_type,
                    &patient.avg_glucose_level,
                    &patient.bmi,
                    &patient.smoking_status,
                    &patient.stroke,
                ]
            ).await?;
        }

        transaction.commit().await?;

        Ok(inserted)
    }

    async fn update_patient(&self, patient: Patient) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;

        let count = conn.execute(
            "\
            update patients \
            set gender = $2, \
                age = $3, \
                hypertension = $4, \
                heart_disease = $5, \
                ever_married = $6, \
                work_type = $7, \
                residence_type = $8, \
                avg_glucose_level = $9, \
                bmi = $10, \
                smoking_status = $11, \
                stroke = $12 \
            where patient_id = $1",
            &[
                &patient.patient_id,
                &patient.gender,
                &patient.age,
                &patient.hypertension,
                &patient.heart_disease,
                &patient.ever_married,
                &patient.work_type,
                &patient.residence_type,
                &patient.avg_glucose_level,
                &patient.bmi,
                &patient.smoking_status,
                &patient.stroke,
            ]
        ).await?;

        if count == 0 {
            Err(StoreError::PatientNotFound)
        } else {
            Ok(())
        }
    }

    async fn delete_patient(&self, patient_id: i64) -> Result<bool, StoreError> {
        let conn = self.pool.get().await?;

        let count = conn.execute(
            "delete from patients where patient_id = $1",
            &[&patient_id]
        ).await?;

        Ok(count > 0)
    }

    async fn patient_summary(&self) -> Result<Summary, StoreError> {
        let conn = self.pool.get().await?;

        let counts = conn.query_one(
            "\
            select count(*), \
                   count(*) filter (where stroke), \
                   count(*) filter (where hypertension), \
                   count(*) filter (where heart_disease) \
            from patients",
            &[]
        ).await?;

        let stroke_by_gender = conn.query(
            "\
            select coalesce(patients.gender, 'Unknown'), \
                   count(*) \
            from patients \
            where patients.stroke \
            group by 1 \
            order by 1",
            &[]
        )
            .await?
            .into_iter()
            .map(|row| GenderCount {
                gender: row.get(0),
                count: row.get(1),
            })
            .collect();

        Ok(Summary {
            total: counts.get(0),
            stroke_cases: counts.get(1),
            hypertension_cases: counts.get(2),
            heart_disease_cases: counts.get(3),
            stroke_by_gender,
        })
    }
}
