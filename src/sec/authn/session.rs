use base64::{Engine, engine::general_purpose::URL_SAFE};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::net::cookie::{SameSite, SetCookie};
use crate::sec::state;
use crate::store::AccountId;

pub mod token;

pub use token::SessionToken;

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub account_id: AccountId,
    pub issued_on: DateTime<Utc>,
    pub expires: DateTime<Utc>,

    /// false while the session is still waiting on the second factor
    pub verified: bool,
}

impl Session {
    pub fn expired(&self, now: &DateTime<Utc>) -> bool {
        self.expires <= *now
    }
}

/// process local session table. tokens are only ever handed out inside
/// a signed cookie so the map key is the raw token.
pub struct SessionManager {
    sessions: DashMap<SessionToken, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            sessions: DashMap::new(),
        }
    }

    pub fn create(
        &self,
        account_id: AccountId,
        verified: bool,
        issued_on: DateTime<Utc>,
        lifetime: &chrono::Duration,
    ) -> Result<Session, rand::Error> {
        let token = SessionToken::new()?;

        let session = Session {
            token: token.clone(),
            account_id,
            issued_on,
            expires: issued_on + *lifetime,
            verified,
        };

        self.sessions.insert(token, session.clone());

        Ok(session)
    }

    pub fn get(&self, token: &SessionToken) -> Option<Session> {
        self.sessions.get(token).map(|found| found.clone())
    }

    pub fn drop_token(&self, token: &SessionToken) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn prune(&self, now: &DateTime<Utc>) -> usize {
        let before = self.sessions.len();

        self.sessions.retain(|_, session| !session.expired(now));

        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

pub type Hash = blake3::Hash;

pub fn create_hash<T>(auth: &state::Sec, token: T) -> Hash
where
    T: AsRef<[u8]>
{
    blake3::keyed_hash(auth.session_key(), token.as_ref())
}

pub fn encode_base64<T>(token: T, hash: Hash) -> String
where
    T: AsRef<[u8]>
{
    let token_ref = token.as_ref();

    let slice = hash.as_bytes();

    let mut joined = Vec::with_capacity(token_ref.len() + slice.len());
    joined.extend_from_slice(token_ref);
    joined.extend_from_slice(slice);

    URL_SAFE.encode(joined)
}

#[derive(Debug)]
pub enum DecodeError {
    InvalidString,
    InvalidLength,
    InvalidHash,
}

pub fn decode_base64<S>(
    auth: &state::Sec,
    session_id: S
) -> Result<SessionToken, DecodeError>
where
    S: AsRef<[u8]>
{
    let Ok(mut bytes) = URL_SAFE.decode(session_id) else {
        return Err(DecodeError::InvalidString);
    };

    if bytes.len() != token::SESSION_ID_BYTES + blake3::OUT_LEN {
        return Err(DecodeError::InvalidLength);
    };

    let token = SessionToken::drain_vec(&mut bytes);
    let hash: [u8; blake3::OUT_LEN] = bytes.try_into()
        .expect("remaining bytes does not match expected length");
    let given = blake3::Hash::from(hash);

    let expected = blake3::keyed_hash(auth.session_key(), token.as_slice());

    if given != expected {
        Err(DecodeError::InvalidHash)
    } else {
        Ok(token)
    }
}

pub fn create_session_cookie(auth: &state::Sec, session: &Session) -> SetCookie {
    let hash = create_hash(auth, &session.token);
    let encoded_token = encode_base64(&session.token, hash);

    SetCookie::new(SESSION_COOKIE, encoded_token)
        .with_expires(session.expires.clone())
        .with_path("/")
        .with_http_only(true)
        .with_secure(auth.session_secure())
        .with_same_site(SameSite::Strict)
}

pub fn expire_session_cookie(auth: &state::Sec) -> SetCookie {
    SetCookie::new(SESSION_COOKIE, "")
        .with_max_age(std::time::Duration::new(0, 0))
        .with_path("/")
        .with_http_only(true)
        .with_secure(auth.session_secure())
        .with_same_site(SameSite::Strict)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    use crate::config;
    use crate::sec::state::Sec;

    fn test_sec() -> Sec {
        let config = config::Config::default_for_tests();

        Sec::from_config(&config).expect("failed to create security state")
    }

    #[test]
    fn encode_decode_round_trip() {
        let auth = test_sec();

        let token = SessionToken::from([7; token::SESSION_ID_BYTES]);
        let hash = create_hash(&auth, &token);

        let encoded = encode_base64(&token, hash);

        let decoded = decode_base64(&auth, &encoded)
            .expect("failed to decode session id");

        assert_eq!(token, decoded);
    }

    #[test]
    fn decode_rejects_tampered_values() {
        let auth = test_sec();

        let token = SessionToken::from([7; token::SESSION_ID_BYTES]);
        let hash = create_hash(&auth, &token);

        let mut encoded = encode_base64(&token, hash);

        assert!(matches!(
            decode_base64(&auth, "not base64 at all!"),
            Err(DecodeError::InvalidString)
        ));
        assert!(matches!(
            decode_base64(&auth, &encoded[..encoded.len() - 8]),
            Err(DecodeError::InvalidLength)
        ));

        // flip the first character of the token portion
        let replacement = if encoded.starts_with('A') { "B" } else { "A" };
        encoded.replace_range(0..1, replacement);

        assert!(matches!(
            decode_base64(&auth, &encoded),
            Err(DecodeError::InvalidHash)
        ));
    }

    #[test]
    fn manager_prunes_expired_sessions() {
        let manager = SessionManager::new();
        let issued = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let lifetime = chrono::Duration::minutes(30);

        let keep = manager.create(1, true, issued, &lifetime)
            .expect("failed to create session");
        let stale = manager.create(2, true, issued - chrono::Duration::hours(2), &lifetime)
            .expect("failed to create session");

        let removed = manager.prune(&issued);

        assert_eq!(removed, 1);
        assert!(manager.get(&keep.token).is_some());
        assert!(manager.get(&stale.token).is_none());
    }
}
