use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};

use crate::net::cookie;
use crate::net::error;
use crate::sec::state;
use crate::store::{Account, ArcStore, CredentialStore, StoreError};

use super::session;

/// a fully signed in requester. extracting this is what protects a
/// handler, anything less than a live verified session gets redirected
/// back into the login flow
#[derive(Debug)]
pub struct Initiator {
    account: Account,
    session: session::Session,
}

impl Initiator {
    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn session(&self) -> &session::Session {
        &self.session
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("session was not found")]
    SessionNotFound,

    #[error("session has expired")]
    SessionExpired(session::Session),

    #[error("session is unverified")]
    SessionUnverified(session::Session),

    #[error("account was not found")]
    AccountNotFound(session::Session),

    #[error("no authentication mechanism was found")]
    MechanismNotFound,

    #[error("session id failed validation")]
    SessionDecode(session::DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<session::DecodeError> for LookupError {
    fn from(err: session::DecodeError) -> Self {
        LookupError::SessionDecode(err)
    }
}

impl From<LookupError> for error::Error {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Store(err) => err.into(),
            err => error::Error::new()
                .status(axum::http::StatusCode::UNAUTHORIZED)
                .message(err.to_string()),
        }
    }
}

pub async fn lookup_session_id<S>(
    auth: &state::Sec,
    sessions: &session::SessionManager,
    store: &dyn CredentialStore,
    session_id: S,
) -> Result<Initiator, LookupError>
where
    S: AsRef<[u8]>
{
    let token = session::decode_base64(auth, session_id)?;

    let Some(found) = sessions.get(&token) else {
        return Err(LookupError::SessionNotFound);
    };

    let now = auth.clock().now();

    if found.expired(&now) {
        sessions.drop_token(&found.token);

        return Err(LookupError::SessionExpired(found));
    }

    if !found.verified {
        return Err(LookupError::SessionUnverified(found));
    }

    if let Some(account) = store.retrieve_account(found.account_id).await? {
        Ok(Initiator {
            account,
            session: found,
        })
    } else {
        sessions.drop_token(&found.token);

        Err(LookupError::AccountNotFound(found))
    }
}

pub async fn lookup_header_map(
    auth: &state::Sec,
    sessions: &session::SessionManager,
    store: &dyn CredentialStore,
    headers: &HeaderMap,
) -> Result<Initiator, LookupError> {
    if let Some(found) = cookie::find_cookie_value(headers, session::SESSION_COOKIE) {
        return lookup_session_id(auth, sessions, store, found.as_bytes()).await;
    }

    Err(LookupError::MechanismNotFound)
}

/// where a request without a usable session should be sent instead of
/// the page it asked for
pub fn rejection_response(err: LookupError) -> Response {
    match err {
        LookupError::SessionUnverified(_) => Redirect::to("/auth/verify").into_response(),
        LookupError::Store(err) => error::Error::from(err).into_response(),
        _ => Redirect::to("/auth/login").into_response(),
    }
}

impl<A, S> FromRequestParts<A> for Initiator
where
    A: Deref<Target = S> + Sync,
    S: AsRef<state::Sec> + AsRef<session::SessionManager> + AsRef<ArcStore> + Sync,
{
    type Rejection = Response;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 A,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait
    {
        Box::pin(async move {
            let state_deref = state.deref();

            let auth: &state::Sec = state_deref.as_ref();
            let sessions: &session::SessionManager = state_deref.as_ref();
            let store: &ArcStore = state_deref.as_ref();

            lookup_header_map(auth, sessions, store.as_ref(), &parts.headers)
                .await
                .map_err(rejection_response)
        })
    }
}

/// an [`Initiator`] whose account has finished totp enrollment. the
/// patient pages require this, a weak session only reaches the
/// enrollment and logout routes
pub struct Protected(pub Initiator);

impl<A, S> FromRequestParts<A> for Protected
where
    A: Deref<Target = S> + Sync,
    S: AsRef<state::Sec> + AsRef<session::SessionManager> + AsRef<ArcStore> + Sync,
{
    type Rejection = Response;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 A,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait
    {
        Box::pin(async move {
            let initiator = Initiator::from_request_parts(parts, state).await?;

            if !initiator.account().totp_enabled {
                return Err(Redirect::to("/auth/totp").into_response());
            }

            Ok(Protected(initiator))
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::config;
    use crate::sec::authn::Clock;
    use crate::store::mem::MemStore;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn test_sec() -> state::Sec {
        state::Sec::from_config(&config::Config::default_for_tests())
            .expect("failed to create security state")
            .with_clock(Arc::new(FixedClock(test_now())))
    }

    fn encode(auth: &state::Sec, found: &session::Session) -> String {
        let hash = session::create_hash(auth, &found.token);

        session::encode_base64(&found.token, hash)
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped_on_lookup() {
        let auth = test_sec();
        let sessions = session::SessionManager::new();
        let store = MemStore::new();

        let account = store.create_account("alice@example.com", "hash")
            .await
            .expect("registration failed");

        let stale = sessions.create(
            account.id,
            true,
            test_now() - chrono::Duration::hours(2),
            auth.session_lifetime()
        ).expect("failed to create session");

        let encoded = encode(&auth, &stale);

        let err = lookup_session_id(&auth, &sessions, &store, &encoded)
            .await
            .expect_err("expired session should not resolve");

        assert!(matches!(err, LookupError::SessionExpired(_)));
        assert!(sessions.get(&stale.token).is_none());
    }

    #[tokio::test]
    async fn unverified_sessions_are_flagged_but_kept() {
        let auth = test_sec();
        let sessions = session::SessionManager::new();
        let store = MemStore::new();

        let account = store.create_account("bob@example.com", "hash")
            .await
            .expect("registration failed");

        let pending = sessions.create(
            account.id,
            false,
            test_now(),
            auth.session_lifetime()
        ).expect("failed to create session");

        let encoded = encode(&auth, &pending);

        let err = lookup_session_id(&auth, &sessions, &store, &encoded)
            .await
            .expect_err("unverified session should not resolve");

        let LookupError::SessionUnverified(found) = err else {
            panic!("expected an unverified rejection");
        };

        assert_eq!(found.account_id, account.id);
        // the marker survives so the second factor can still be tried
        assert!(sessions.get(&pending.token).is_some());
    }

    #[tokio::test]
    async fn missing_account_invalidates_the_session() {
        let auth = test_sec();
        let sessions = session::SessionManager::new();
        let store = MemStore::new();

        let orphan = sessions.create(
            4242,
            true,
            test_now(),
            auth.session_lifetime()
        ).expect("failed to create session");

        let encoded = encode(&auth, &orphan);

        let err = lookup_session_id(&auth, &sessions, &store, &encoded)
            .await
            .expect_err("orphaned session should not resolve");

        assert!(matches!(err, LookupError::AccountNotFound(_)));
        assert!(sessions.get(&orphan.token).is_none());
    }

    #[tokio::test]
    async fn verified_sessions_resolve_to_their_account() {
        let auth = test_sec();
        let sessions = session::SessionManager::new();
        let store = MemStore::new();

        let account = store.create_account("carol@example.com", "hash")
            .await
            .expect("registration failed");

        let live = sessions.create(
            account.id,
            true,
            test_now(),
            auth.session_lifetime()
        ).expect("failed to create session");

        let encoded = encode(&auth, &live);

        let initiator = lookup_session_id(&auth, &sessions, &store, &encoded)
            .await
            .expect("verified session should resolve");

        assert_eq!(initiator.account().id, account.id);
        assert_eq!(initiator.session().token, live.token);
    }
}
