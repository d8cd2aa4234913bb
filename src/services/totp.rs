use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};
use totp_lite::{totp_custom, Sha1, DEFAULT_STEP};

const SECRET_LEN: usize = 20;
const CODE_DIGITS: u32 = 6;
/// Accept the previous and next 30s window to absorb clock skew.
const SKEW_STEPS: i64 = 1;

pub const BACKUP_CODE_COUNT: usize = 8;
pub const BACKUP_CODE_LEN: usize = 8;
// No 0/O or 1/I/l, codes get read off paper.
const BACKUP_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// TOTP secret generation and code verification for two-factor auth.
#[derive(Clone)]
pub struct TotpGenerator {
    issuer: String,
}

impl TotpGenerator {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generates a fresh shared secret plus the otpauth provisioning URI the
    /// client renders as a QR code.
    pub fn generate_secret(&self, email: &str) -> (String, String) {
        let mut secret_bytes = [0u8; SECRET_LEN];
        rand::rng().fill(&mut secret_bytes[..]);

        let secret = base64_engine.encode(secret_bytes);
        let uri = format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}",
            issuer = urlencoding::encode(&self.issuer),
            account = urlencoding::encode(email),
            secret = urlencoding::encode(&secret),
        );

        (secret, uri)
    }

    /// Checks a 6-digit code against the secret within the skew window.
    /// Malformed input or an undecodable secret is simply "no match".
    pub fn verify_code(&self, secret: &str, code: &str) -> bool {
        if code.len() != CODE_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        let Ok(secret_bytes) = base64_engine.decode(secret) else {
            return false;
        };

        let now = chrono::Utc::now().timestamp();
        (-SKEW_STEPS..=SKEW_STEPS).any(|step| {
            let time = now + step * DEFAULT_STEP as i64;
            if time < 0 {
                return false;
            }
            totp_custom::<Sha1>(DEFAULT_STEP, CODE_DIGITS, &secret_bytes, time as u64) == code
        })
    }

    /// The code a TOTP app would show right now. Used by enrollment tests and
    /// the manual-entry path.
    pub fn current_code(&self, secret: &str) -> Option<String> {
        let secret_bytes = base64_engine.decode(secret).ok()?;
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Some(totp_custom::<Sha1>(DEFAULT_STEP, CODE_DIGITS, &secret_bytes, now))
    }
}

/// One-time recovery codes, returned to the user in plaintext exactly once
/// and stored only as digests.
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            (0..BACKUP_CODE_LEN)
                .map(|_| {
                    let idx = rng.random_range(0..BACKUP_CODE_ALPHABET.len());
                    BACKUP_CODE_ALPHABET[idx] as char
                })
                .collect()
        })
        .collect()
}

/// SHA-256 hex digest; used for backup codes and stored refresh tokens.
pub fn digest_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
