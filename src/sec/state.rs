use std::sync::Arc;

use crate::config;
use crate::error;
use crate::sec::authn::{Clock, RandSecrets, SecretSource, SystemClock};

pub type SessionKey = [u8; 32];

/// runtime security context built from the config. holds the derived
/// session signing key and the shared clock / secret sources so tests
/// can swap in deterministic versions.
pub struct Sec {
    session_key: SessionKey,
    session_lifetime: chrono::Duration,
    session_secure: bool,
    totp_issuer: String,
    clock: Arc<dyn Clock>,
    secrets: Arc<dyn SecretSource>,
}

impl Sec {
    pub fn from_config(config: &config::Config) -> error::Result<Self> {
        let mut session_key = [0u8; 32];

        config.kdf.expand(b"session-cookie", &mut session_key)?;

        Ok(Self {
            session_key,
            session_lifetime: chrono::Duration::seconds(
                config.settings.sec.session.lifetime as i64,
            ),
            session_secure: config.settings.sec.session.secure,
            totp_issuer: config.settings.sec.totp.issuer.clone(),
            clock: Arc::new(SystemClock),
            secrets: Arc::new(RandSecrets),
        })
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub fn session_lifetime(&self) -> &chrono::Duration {
        &self.session_lifetime
    }

    pub fn session_secure(&self) -> bool {
        self.session_secure
    }

    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    pub fn secrets(&self) -> &dyn SecretSource {
        &*self.secrets
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }
}
