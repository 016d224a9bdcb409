use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

pub mod algo;

pub use algo::Algo;

pub const SECRET_LEN: usize = 20;

pub const DEFAULT_DIGITS: u32 = 6;
pub const DEFAULT_STEP: u64 = 30;
pub const DEFAULT_WINDOW: u64 = 2;

pub fn create_secret() -> Result<Vec<u8>, rand::Error> {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().try_fill_bytes(&mut bytes)?;

    Ok(bytes.to_vec())
}

#[derive(Debug, thiserror::Error)]
#[error("system time is before the unix epoch")]
pub struct UnixTimeError;

#[derive(Debug, Clone)]
pub struct TotpSettings {
    pub algo: Algo,
    pub secret: Vec<u8>,
    pub digits: u32,
    pub step: u64,
    pub window_before: u64,
    pub window_after: u64,
    pub now: Option<u64>,
}

impl TotpSettings {
    pub fn new(secret: Vec<u8>) -> Self {
        TotpSettings {
            algo: Algo::SHA1,
            secret,
            digits: DEFAULT_DIGITS,
            step: DEFAULT_STEP,
            window_before: DEFAULT_WINDOW,
            window_after: DEFAULT_WINDOW,
            now: None,
        }
    }

    fn unix_now(&self) -> Result<u64, UnixTimeError> {
        if let Some(now) = self.now {
            return Ok(now);
        }

        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| UnixTimeError)?;

        Ok(elapsed.as_secs())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifyResult {
    Valid,
    Invalid,
}

fn mac_bytes(algo: &Algo, secret: &[u8], counter: u64) -> Vec<u8> {
    let msg = counter.to_be_bytes();

    // hmac accepts keys of any length
    match algo {
        Algo::SHA1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(secret).unwrap();
            mac.update(&msg);
            mac.finalize().into_bytes().to_vec()
        }
        Algo::SHA256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
            mac.update(&msg);
            mac.finalize().into_bytes().to_vec()
        }
        Algo::SHA512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret).unwrap();
            mac.update(&msg);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// rfc 4226 dynamic truncation of an hmac digest into a zero padded
/// code string
fn truncate(digest: &[u8], digits: u32) -> String {
    let offset = (digest[digest.len() - 1] & 0xf) as usize;

    let bin = ((digest[offset] & 0x7f) as u64) << 24
        | (digest[offset + 1] as u64) << 16
        | (digest[offset + 2] as u64) << 8
        | digest[offset + 3] as u64;

    let code = bin % 10u64.pow(digits);

    format!("{:0width$}", code, width = digits as usize)
}

pub fn generate_hotp_code(settings: &TotpSettings, counter: u64) -> String {
    let digest = mac_bytes(&settings.algo, &settings.secret, counter);

    truncate(&digest, settings.digits)
}

pub fn generate_totp_code(settings: &TotpSettings) -> Result<String, UnixTimeError> {
    let counter = settings.unix_now()? / settings.step;

    Ok(generate_hotp_code(settings, counter))
}

/// checks the given code against every counter in the accepted window
/// around the current time step
pub fn verify_totp_code<C>(settings: &TotpSettings, code: C) -> Result<VerifyResult, UnixTimeError>
where
    C: AsRef<str>
{
    let given = code.as_ref();
    let counter = settings.unix_now()? / settings.step;

    let start = counter.saturating_sub(settings.window_before);
    let end = counter.saturating_add(settings.window_after);

    for check in start..=end {
        if generate_hotp_code(settings, check) == given {
            return Ok(VerifyResult::Valid);
        }
    }

    Ok(VerifyResult::Invalid)
}

fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// builds the otpauth uri an authenticator app expects when enrolling
/// a secret. same inputs always produce the same uri.
pub fn provisioning_uri(settings: &TotpSettings, issuer: &str, account: &str) -> String {
    let encoded_secret = BASE32_NOPAD.encode(&settings.secret);
    let label = encode_component(&format!("{}:{}", issuer, account));
    let encoded_issuer = encode_component(issuer);

    format!(
        "otpauth://totp/{}?secret={}&issuer={}&algorithm={}&digits={}&period={}",
        label,
        encoded_secret,
        encoded_issuer,
        settings.algo.as_str(),
        settings.digits,
        settings.step,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    // rfc 6238 appendix b test secrets
    const SHA1_SECRET: &[u8] = b"12345678901234567890";
    const SHA256_SECRET: &[u8] = b"12345678901234567890123456789012";
    const SHA512_SECRET: &[u8] = b"1234567890123456789012345678901234567890123456789012345678901234";

    fn vector_settings(algo: Algo, secret: &[u8], now: u64) -> TotpSettings {
        let mut settings = TotpSettings::new(secret.to_vec());
        settings.algo = algo;
        settings.digits = 8;
        settings.now = Some(now);
        settings
    }

    #[test]
    fn rfc_6238_sha1_vectors() {
        let vectors = [
            (59u64, "94287082"),
            (1111111109, "07081804"),
            (1111111111, "14050471"),
            (1234567890, "89005924"),
            (2000000000, "69279037"),
            (20000000000, "65353130"),
        ];

        for (now, expected) in vectors {
            let settings = vector_settings(Algo::SHA1, SHA1_SECRET, now);

            assert_eq!(
                generate_totp_code(&settings).unwrap(),
                expected,
                "mismatch at {}",
                now
            );
        }
    }

    #[test]
    fn rfc_6238_sha256_vectors() {
        let vectors = [
            (59u64, "46119246"),
            (1111111109, "68084774"),
            (1234567890, "91819424"),
        ];

        for (now, expected) in vectors {
            let settings = vector_settings(Algo::SHA256, SHA256_SECRET, now);

            assert_eq!(generate_totp_code(&settings).unwrap(), expected);
        }
    }

    #[test]
    fn rfc_6238_sha512_vectors() {
        let vectors = [
            (59u64, "90693936"),
            (1111111109, "25091201"),
            (1234567890, "93441116"),
        ];

        for (now, expected) in vectors {
            let settings = vector_settings(Algo::SHA512, SHA512_SECRET, now);

            assert_eq!(generate_totp_code(&settings).unwrap(), expected);
        }
    }

    #[test]
    fn six_digit_codes_keep_leading_zeros() {
        let settings = vector_settings(Algo::SHA1, SHA1_SECRET, 1111111109);
        let mut six = settings.clone();
        six.digits = 6;

        // 8 digit code is 07081804, the 6 digit code is its tail
        assert_eq!(generate_totp_code(&six).unwrap(), "081804");
    }

    #[test]
    fn verify_accepts_codes_inside_the_window() {
        let base = 1000 * DEFAULT_STEP;

        let mut issued = TotpSettings::new(SHA1_SECRET.to_vec());
        issued.now = Some(base);

        let code = generate_totp_code(&issued).unwrap();

        for drift in [0i64, 1, 2, -1, -2] {
            let mut check = issued.clone();
            check.now = Some((base as i64 + drift * DEFAULT_STEP as i64) as u64);

            assert_eq!(
                verify_totp_code(&check, &code).unwrap(),
                VerifyResult::Valid,
                "drift {} steps should be accepted",
                drift
            );
        }
    }

    #[test]
    fn verify_rejects_codes_outside_the_window() {
        let base = 1000 * DEFAULT_STEP;

        let mut issued = TotpSettings::new(SHA1_SECRET.to_vec());
        issued.now = Some(base);

        let code = generate_totp_code(&issued).unwrap();

        for drift in [3i64, -3, 10] {
            let mut check = issued.clone();
            check.now = Some((base as i64 + drift * DEFAULT_STEP as i64) as u64);

            assert_eq!(verify_totp_code(&check, &code).unwrap(), VerifyResult::Invalid);
        }
    }

    #[test]
    fn verify_rejects_garbage_codes() {
        let mut settings = TotpSettings::new(SHA1_SECRET.to_vec());
        settings.now = Some(59);

        assert_eq!(
            verify_totp_code(&settings, "not a code").unwrap(),
            VerifyResult::Invalid
        );
        assert_eq!(verify_totp_code(&settings, "").unwrap(), VerifyResult::Invalid);
    }

    #[test]
    fn provisioning_uri_is_deterministic() {
        let settings = TotpSettings::new(SHA1_SECRET.to_vec());

        let uri = provisioning_uri(&settings, "StrokePortal", "alice@example.com");

        assert_eq!(
            uri,
            "otpauth://totp/StrokePortal%3Aalice%40example.com\
             ?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ\
             &issuer=StrokePortal&algorithm=SHA1&digits=6&period=30"
        );
        assert_eq!(uri, provisioning_uri(&settings, "StrokePortal", "alice@example.com"));
    }

    #[test]
    fn created_secrets_have_expected_length() {
        let secret = create_secret().unwrap();

        assert_eq!(secret.len(), SECRET_LEN);
    }
}
