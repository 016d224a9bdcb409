use argon2::Variant;
use rand::RngCore;

use crate::net::error::Error as NetError;

pub const SALT_LEN: usize = 32;

pub type Salt = [u8; SALT_LEN];

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error(transparent)]
    Rand(#[from] rand::Error),

    #[error(transparent)]
    Argon2(#[from] argon2::Error),
}

impl From<PasswordError> for NetError {
    fn from(err: PasswordError) -> Self {
        NetError::new().source(err)
    }
}

pub fn gen_salt() -> Result<Salt, rand::Error> {
    let mut salt = [0u8; SALT_LEN];

    rand::thread_rng().try_fill_bytes(&mut salt)?;

    Ok(salt)
}

pub fn gen_hash(password: &str, salt: &[u8]) -> Result<String, argon2::Error> {
    let mut config = argon2::Config::default();
    config.mem_cost = 19456;
    config.variant = Variant::Argon2id;

    Ok(argon2::hash_encoded(
        password.as_bytes(),
        salt,
        &config
    )?)
}

/// salts and hashes a plain text password into the encoded argon2id
/// string stored with the account
pub fn create(password: &str) -> Result<String, PasswordError> {
    let salt = gen_salt()?;

    Ok(gen_hash(password, &salt)?)
}

pub fn verify<C>(encoded: &str, check: C) -> Result<bool, argon2::Error>
where
    C: AsRef<[u8]>
{
    argon2::verify_encoded(encoded, check.as_ref())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let encoded = create("a fine password").expect("failed to hash password");

        assert!(verify(&encoded, "a fine password").expect("failed to verify"));
        assert!(!verify(&encoded, "a wrong password").expect("failed to verify"));
    }

    #[test]
    fn salts_make_hashes_unique() {
        let first = create("repeat").expect("failed to hash password");
        let second = create("repeat").expect("failed to hash password");

        assert_ne!(first, second);
    }
}
