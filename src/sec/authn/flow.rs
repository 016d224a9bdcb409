use std::str::FromStr;

use axum::http::StatusCode;
use data_encoding::BASE32_NOPAD;
use email_address::EmailAddress;

use crate::net::error::Error as NetError;
use crate::sec::authn::password;
use crate::sec::authn::session::{Session, SessionManager, SessionToken};
use crate::sec::authn::totp::{self, TotpSettings, VerifyResult};
use crate::sec::state;
use crate::store::{Account, AccountId, CredentialStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("an account with that email already exists")]
    DuplicateEmail,

    #[error("that does not look like a valid email address")]
    InvalidEmail,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("that authenticator code is not valid")]
    InvalidTotpCode,

    #[error("the session has expired")]
    SessionExpired,

    #[error("the account has no authenticator configured")]
    TotpNotConfigured,

    #[error("the account already has an authenticator enabled")]
    AlreadyEnrolled,

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Password(#[from] password::PasswordError),

    #[error(transparent)]
    Argon2(#[from] argon2::Error),

    #[error(transparent)]
    Rand(#[from] rand::Error),

    #[error(transparent)]
    Time(#[from] totp::UnixTimeError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            err => AuthError::Store(err),
        }
    }
}

impl From<AuthError> for NetError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DuplicateEmail |
            AuthError::InvalidEmail |
            AuthError::InvalidCredentials |
            AuthError::InvalidTotpCode |
            AuthError::TotpNotConfigured |
            AuthError::AlreadyEnrolled => NetError::new()
                .status(StatusCode::BAD_REQUEST)
                .message(err.to_string()),
            AuthError::SessionExpired => NetError::new()
                .status(StatusCode::UNAUTHORIZED)
                .message(err.to_string()),
            err => NetError::new().source(err),
        }
    }
}

/// outcome of a successful password check. when totp is enabled the
/// returned session is only a pending marker and must not grant access
pub enum LoginOutcome {
    Complete {
        session: Session,
        needs_enrollment: bool,
    },
    TotpRequired {
        session: Session,
    },
}

/// what the enrollment page needs to show the secret to the user
pub struct Enrollment {
    pub secret_base32: String,
    pub provisioning_uri: String,
}

/// the account and session operations behind the auth handlers. works
/// against the credential store and session table it is given so tests
/// can run it fully in memory.
pub struct AuthFlow<'a> {
    store: &'a dyn CredentialStore,
    sessions: &'a SessionManager,
    sec: &'a state::Sec,
}

impl<'a> AuthFlow<'a> {
    pub fn new(
        store: &'a dyn CredentialStore,
        sessions: &'a SessionManager,
        sec: &'a state::Sec,
    ) -> Self {
        AuthFlow {
            store,
            sessions,
            sec,
        }
    }

    fn totp_settings(&self, account: &Account) -> Result<TotpSettings, AuthError> {
        let Some(secret) = &account.totp_secret else {
            return Err(AuthError::TotpNotConfigured);
        };

        let mut settings = TotpSettings::new(secret.clone());
        settings.now = Some(self.sec.clock().unix());

        Ok(settings)
    }

    fn issue_session(&self, account_id: AccountId, verified: bool) -> Result<Session, AuthError> {
        let issued_on = self.sec.clock().now();

        Ok(self.sessions.create(
            account_id,
            verified,
            issued_on,
            self.sec.session_lifetime(),
        )?)
    }

    /// creates the account and signs it straight in. the fresh session
    /// is verified but the account still has no authenticator so it
    /// only reaches the enrollment page
    pub async fn register(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let trimmed = email.trim();

        if EmailAddress::from_str(trimmed).is_err() {
            return Err(AuthError::InvalidEmail);
        }

        let hash = password::create(password)?;

        let account = self.store.create_account(trimmed, &hash).await?;

        tracing::info!("registered account {} \"{}\"", account.id, account.email);

        self.issue_session(account.id, true)
    }

    /// fails the same way for an unknown email and a wrong password
    pub async fn submit_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let Some(account) = self.store.find_account(email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify(&account.password_hash, password)? {
            return Err(AuthError::InvalidCredentials);
        }

        if account.totp_enabled {
            let session = self.issue_session(account.id, false)?;

            Ok(LoginOutcome::TotpRequired { session })
        } else {
            let session = self.issue_session(account.id, true)?;

            Ok(LoginOutcome::Complete {
                session,
                needs_enrollment: true,
            })
        }
    }

    /// hands out the secret for the enrollment page, generating one if
    /// the account has none yet. when two requests race the store keeps
    /// whichever secret landed first and both callers see that one
    pub async fn begin_enrollment(&self, account_id: AccountId) -> Result<Enrollment, AuthError> {
        let account = self.retrieve(account_id).await?;

        if account.totp_enabled {
            return Err(AuthError::AlreadyEnrolled);
        }

        let secret = match account.totp_secret {
            Some(existing) => existing,
            None => {
                let fresh = self.sec.secrets().totp_secret()?;

                self.store.assign_totp_secret(account.id, fresh).await?
            }
        };

        let settings = TotpSettings::new(secret);
        let provisioning_uri = totp::provisioning_uri(
            &settings,
            self.sec.totp_issuer(),
            &account.email,
        );

        Ok(Enrollment {
            secret_base32: BASE32_NOPAD.encode(&settings.secret),
            provisioning_uri,
        })
    }

    /// flips totp on once the user proves they scanned the secret.
    /// confirming an already enabled account is a no-op
    pub async fn confirm_enrollment(
        &self,
        account_id: AccountId,
        code: &str,
    ) -> Result<(), AuthError> {
        let account = self.retrieve(account_id).await?;

        if account.totp_enabled {
            return Ok(());
        }

        let settings = self.totp_settings(&account)?;

        if totp::verify_totp_code(&settings, code)? == VerifyResult::Invalid {
            return Err(AuthError::InvalidTotpCode);
        }

        self.store.enable_totp(account.id).await?;

        tracing::info!("account {} enabled totp", account.id);

        Ok(())
    }

    /// second login step. a wrong code keeps the pending session so the
    /// user can retry, anything unrecoverable drops it. success swaps
    /// the pending marker for a brand new verified session
    pub async fn verify_pending(
        &self,
        pending: &Session,
        code: &str,
    ) -> Result<Session, AuthError> {
        let account = match self.retrieve(pending.account_id).await {
            Ok(account) => account,
            Err(err) => {
                self.sessions.drop_token(&pending.token);

                return Err(err);
            }
        };

        if !account.totp_enabled || account.totp_secret.is_none() {
            self.sessions.drop_token(&pending.token);

            return Err(AuthError::TotpNotConfigured);
        }

        let settings = self.totp_settings(&account)?;

        if totp::verify_totp_code(&settings, code)? == VerifyResult::Invalid {
            return Err(AuthError::InvalidTotpCode);
        }

        self.sessions.drop_token(&pending.token);

        self.issue_session(account.id, true)
    }

    pub fn logout(&self, token: &SessionToken) -> bool {
        self.sessions.drop_token(token)
    }

    async fn retrieve(&self, account_id: AccountId) -> Result<Account, AuthError> {
        match self.store.retrieve_account(account_id).await? {
            Some(account) => Ok(account),
            None => Err(AuthError::Store(StoreError::AccountNotFound)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::config;
    use crate::sec::authn::{Clock, SecretSource};
    use crate::sec::state::Sec;
    use crate::store::mem::MemStore;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct FixedSecrets(Vec<u8>);

    impl SecretSource for FixedSecrets {
        fn totp_secret(&self) -> Result<Vec<u8>, rand::Error> {
            Ok(self.0.clone())
        }
    }

    const TEST_SECRET: &[u8] = b"12345678901234567890";

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn test_sec() -> Sec {
        Sec::from_config(&config::Config::default_for_tests())
            .expect("failed to create security state")
            .with_clock(Arc::new(FixedClock(test_now())))
            .with_secrets(Arc::new(FixedSecrets(TEST_SECRET.to_vec())))
    }

    fn current_code() -> String {
        let mut settings = TotpSettings::new(TEST_SECRET.to_vec());
        settings.now = Some(test_now().timestamp() as u64);

        totp::generate_totp_code(&settings).unwrap()
    }

    fn wrong_code() -> String {
        let right = current_code();

        if right == "000000" {
            String::from("000001")
        } else {
            String::from("000000")
        }
    }

    #[tokio::test]
    async fn register_signs_in_without_totp() {
        let store = MemStore::new();
        let sessions = SessionManager::new();
        let sec = test_sec();
        let flow = AuthFlow::new(&store, &sessions, &sec);

        let session = flow.register("alice@example.com", "hunter42hunter42").await
            .expect("register failed");

        assert!(session.verified);
        assert!(sessions.get(&session.token).is_some());

        match flow.submit_password("alice@example.com", "hunter42hunter42").await.unwrap() {
            LoginOutcome::Complete { session, needs_enrollment } => {
                assert!(session.verified);
                assert!(needs_enrollment);
            }
            LoginOutcome::TotpRequired { .. } => panic!("totp should not be enabled yet"),
        }
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let store = MemStore::new();
        let sessions = SessionManager::new();
        let sec = test_sec();
        let flow = AuthFlow::new(&store, &sessions, &sec);

        assert!(matches!(
            flow.register("not-an-email", "password123").await,
            Err(AuthError::InvalidEmail)
        ));

        flow.register("bob@example.com", "password123").await.unwrap();

        assert!(matches!(
            flow.register("BOB@example.com", "other-password").await,
            Err(AuthError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let store = MemStore::new();
        let sessions = SessionManager::new();
        let sec = test_sec();
        let flow = AuthFlow::new(&store, &sessions, &sec);

        flow.register("carol@example.com", "correct-horse").await.unwrap();

        assert!(matches!(
            flow.submit_password("nobody@example.com", "correct-horse").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            flow.submit_password("carol@example.com", "wrong-horse").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn enrollment_round_trip() {
        let store = MemStore::new();
        let sessions = SessionManager::new();
        let sec = test_sec();
        let flow = AuthFlow::new(&store, &sessions, &sec);

        let session = flow.register("dave@example.com", "password123").await.unwrap();

        let first = flow.begin_enrollment(session.account_id).await.unwrap();
        let second = flow.begin_enrollment(session.account_id).await.unwrap();

        // revisiting the page must show the same secret
        assert_eq!(first.secret_base32, second.secret_base32);
        assert_eq!(first.provisioning_uri, second.provisioning_uri);
        assert!(first.provisioning_uri.starts_with("otpauth://totp/"));

        assert!(matches!(
            flow.confirm_enrollment(session.account_id, &wrong_code()).await,
            Err(AuthError::InvalidTotpCode)
        ));

        flow.confirm_enrollment(session.account_id, &current_code()).await
            .expect("confirm failed");

        // a repeat confirmation is harmless
        flow.confirm_enrollment(session.account_id, &wrong_code()).await
            .expect("repeat confirm should be a no-op");

        assert!(matches!(
            flow.begin_enrollment(session.account_id).await,
            Err(AuthError::AlreadyEnrolled)
        ));
    }

    #[tokio::test]
    async fn login_with_totp_requires_the_second_step() {
        let store = MemStore::new();
        let sessions = SessionManager::new();
        let sec = test_sec();
        let flow = AuthFlow::new(&store, &sessions, &sec);

        let session = flow.register("erin@example.com", "password123").await.unwrap();
        flow.begin_enrollment(session.account_id).await.unwrap();
        flow.confirm_enrollment(session.account_id, &current_code()).await.unwrap();

        let pending = match flow.submit_password("erin@example.com", "password123").await.unwrap() {
            LoginOutcome::TotpRequired { session } => session,
            LoginOutcome::Complete { .. } => panic!("expected the totp step"),
        };

        assert!(!pending.verified);

        // a wrong code keeps the pending marker around for a retry
        assert!(matches!(
            flow.verify_pending(&pending, &wrong_code()).await,
            Err(AuthError::InvalidTotpCode)
        ));
        assert!(sessions.get(&pending.token).is_some());

        let verified = flow.verify_pending(&pending, &current_code()).await
            .expect("verify failed");

        assert!(verified.verified);
        assert_ne!(verified.token, pending.token);
        assert!(sessions.get(&pending.token).is_none());
        assert!(sessions.get(&verified.token).is_some());
    }

    #[tokio::test]
    async fn verify_without_totp_drops_the_marker() {
        let store = MemStore::new();
        let sessions = SessionManager::new();
        let sec = test_sec();
        let flow = AuthFlow::new(&store, &sessions, &sec);

        let session = flow.register("frank@example.com", "password123").await.unwrap();

        let pending = sessions.create(
            session.account_id,
            false,
            test_now(),
            sec.session_lifetime(),
        ).unwrap();

        assert!(matches!(
            flow.verify_pending(&pending, "123456").await,
            Err(AuthError::TotpNotConfigured)
        ));
        assert!(sessions.get(&pending.token).is_none());
    }

    #[tokio::test]
    async fn logout_drops_the_session() {
        let store = MemStore::new();
        let sessions = SessionManager::new();
        let sec = test_sec();
        let flow = AuthFlow::new(&store, &sessions, &sec);

        let session = flow.register("grace@example.com", "password123").await.unwrap();

        assert!(flow.logout(&session.token));
        assert!(!flow.logout(&session.token));
        assert!(sessions.get(&session.token).is_none());
    }
}
