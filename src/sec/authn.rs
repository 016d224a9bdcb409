use chrono::{DateTime, Utc};

pub mod flow;
pub mod initiator;
pub mod password;
pub mod session;
pub mod totp;

/// source of "now" for everything session and totp related. the
/// production impl reads the system clock, tests pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn unix(&self) -> u64 {
        let ts = self.now().timestamp();

        if ts < 0 {
            0
        } else {
            ts as u64
        }
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// source of randomly generated totp secrets
pub trait SecretSource: Send + Sync {
    fn totp_secret(&self) -> Result<Vec<u8>, rand::Error>;
}

pub struct RandSecrets;

impl SecretSource for RandSecrets {
    fn totp_secret(&self) -> Result<Vec<u8>, rand::Error> {
        totp::create_secret()
    }
}
