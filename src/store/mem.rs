use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{
    Account,
    AccountId,
    CredentialStore,
    Patient,
    PatientFilter,
    PatientStore,
    StoreError,
    Summary,
    normalize_email,
    summarize,
};

/// in-process store backed by concurrent maps
///
/// the default backend for development and the one deterministic tests
/// run against. all data is lost on shutdown
pub struct MemStore {
    accounts: DashMap<AccountId, Account>,
    emails: DashMap<String, AccountId>,
    patients: DashMap<i64, Patient>,
    next_account_id: AtomicI64,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore {
            accounts: DashMap::new(),
            emails: DashMap::new(),
            patients: DashMap::new(),
            next_account_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl CredentialStore for MemStore {
    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let normalized = normalize_email(email);

        let Some(id) = self.emails.get(&normalized).map(|found| *found) else {
            return Ok(None);
        };

        Ok(self.accounts.get(&id).map(|found| found.clone()))
    }

    async fn retrieve_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|found| found.clone()))
    }

    async fn create_account(&self, email: &str, password_hash: &str) -> Result<Account, StoreError> {
        let normalized = normalize_email(email);

        // the entry guards against two registrations racing on one email
        match self.emails.entry(normalized.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            Entry::Vacant(vacant) => {
                let id = self.next_account_id.fetch_add(1, Ordering::SeqCst);

                let account = Account {
                    id,
                    email: normalized,
                    password_hash: String::from(password_hash),
                    totp_secret: None,
                    totp_enabled: false,
                };

                self.accounts.insert(id, account.clone());
                vacant.insert(id);

                Ok(account)
            }
        }
    }

    async fn assign_totp_secret(&self, id: AccountId, secret: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        let Some(mut account) = self.accounts.get_mut(&id) else {
            return Err(StoreError::AccountNotFound);
        };

        if let Some(existing) = account.totp_secret.as_ref() {
            return Ok(existing.clone());
        }

        account.totp_secret = Some(secret.clone());

        Ok(secret)
    }

    async fn enable_totp(&self, id: AccountId) -> Result<(), StoreError> {
        let Some(mut account) = self.accounts.get_mut(&id) else {
            return Err(StoreError::AccountNotFound);
        };

        if account.totp_secret.is_none() {
            return Err(StoreError::TotpSecretMissing);
        }

        account.totp_enabled = true;

        Ok(())
    }
}

#[async_trait]
impl PatientStore for MemStore {
    async fn count_patients(&self) -> Result<i64, StoreError> {
        Ok(self.patients.len() as i64)
    }

    async fn list_patients(
        &self,
        filter: Option<PatientFilter>,
        search: Option<i64>,
    ) -> Result<Vec<Patient>, StoreError> {
        let mut found: Vec<Patient> = self.patients.iter()
            .filter(|entry| match filter.as_ref() {
                Some(filter) => filter.matches(entry.value()),
                None => true,
            })
            .filter(|entry| match search.as_ref() {
                Some(id) => entry.value().patient_id == *id,
                None => true,
            })
            .map(|entry| entry.value().clone())
            .collect();

        found.sort_by_key(|patient| patient.patient_id);

        Ok(found)
    }

    async fn get_patient(&self, patient_id: i64) -> Result<Option<Patient>, StoreError> {
        Ok(self.patients.get(&patient_id).map(|found| found.clone()))
    }

    async fn insert_patient(&self, patient: Patient) -> Result<(), StoreError> {
        match self.patients.entry(patient.patient_id) {
            Entry::Occupied(_) => Err(StoreError::DuplicatePatient),
            Entry::Vacant(vacant) => {
                vacant.insert(patient);

                Ok(())
            }
        }
    }

    async fn insert_patients(&self, patients: Vec<Patient>) -> Result<u64, StoreError> {
        let mut inserted = 0;

        for patient in patients {
            self.insert_patient(patient).await?;

            inserted += 1;
        }

        Ok(inserted)
    }

    async fn update_patient(&self, patient: Patient) -> Result<(), StoreError> {
        let Some(mut existing) = self.patients.get_mut(&patient.patient_id) else {
            return Err(StoreError::PatientNotFound);
        };

        *existing = patient;

        Ok(())
    }

    async fn delete_patient(&self, patient_id: i64) -> Result<bool, StoreError> {
        Ok(self.patients.remove(&patient_id).is_some())
    }

    async fn patient_summary(&self) -> Result<Summary, StoreError> {
        let rows: Vec<Patient> = self.patients.iter()
            .map(|entry| entry.value().clone())
            .collect();

        Ok(summarize(rows.iter()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn duplicate_email_is_case_insensitive() {
        let store = MemStore::new();

        store.create_account("alice@example.com", "hash-a")
            .await
            .expect("first registration failed");

        let err = store.create_account("Alice@Example.COM", "hash-b")
            .await
            .expect_err("second registration should have failed");

        assert!(matches!(err, StoreError::DuplicateEmail));

        let found = store.find_account("ALICE@example.com")
            .await
            .expect("lookup failed")
            .expect("account missing");

        assert_eq!(found.password_hash, "hash-a");
        assert!(!found.totp_enabled);
        assert!(found.totp_secret.is_none());
    }

    #[tokio::test]
    async fn first_totp_secret_wins() {
        let store = MemStore::new();

        let account = store.create_account("bob@example.com", "hash")
            .await
            .expect("registration failed");

        let first = store.assign_totp_secret(account.id, vec![1; 20])
            .await
            .expect("first assign failed");
        let second = store.assign_totp_secret(account.id, vec![2; 20])
            .await
            .expect("second assign failed");

        assert_eq!(first, vec![1; 20]);
        assert_eq!(second, vec![1; 20]);
    }

    #[tokio::test]
    async fn enable_totp_requires_secret() {
        let store = MemStore::new();

        let account = store.create_account("carol@example.com", "hash")
            .await
            .expect("registration failed");

        let err = store.enable_totp(account.id)
            .await
            .expect_err("enable without secret should fail");

        assert!(matches!(err, StoreError::TotpSecretMissing));

        store.assign_totp_secret(account.id, vec![7; 20])
            .await
            .expect("assign failed");
        store.enable_totp(account.id)
            .await
            .expect("enable failed");
        // a second enable is a no-op
        store.enable_totp(account.id)
            .await
            .expect("repeat enable failed");

        let found = store.retrieve_account(account.id)
            .await
            .expect("retrieve failed")
            .expect("account missing");

        assert!(found.totp_enabled);
        assert_eq!(found.totp_secret, Some(vec![7; 20]));
    }
}
