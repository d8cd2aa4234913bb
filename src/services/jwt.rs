use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";
/// Short-lived token handed out after password verification when the account
/// still owes a TOTP code.
pub const TOKEN_TYPE_TWO_FACTOR: &str = "2fa";

const DEFAULT_EXPIRY_SECS: i64 = 900;
const TWO_FACTOR_TOKEN_SECS: i64 = 300;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,         // user id
    pub email: String,
    pub typ: String,         // access | refresh | 2fa
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,         // unique token id
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Access and refresh tokens are signed with distinct secrets, so a leaked
/// access token can never stand in for a refresh token.
#[derive(Clone)]
pub struct JwtService {
    access_secret: String,
    refresh_secret: String,
    issuer: String,
    audience: String,
    access_token_duration: Duration,
    refresh_token_duration: Duration,
}

/// Parses `<integer><unit>` with unit in {s, m, h, d} into seconds.
/// Anything unparseable falls back to 900 seconds.
pub fn parse_expiry_secs(value: &str) -> i64 {
    let value = value.trim();
    let Some(unit) = value.chars().last() else {
        return DEFAULT_EXPIRY_SECS;
    };
    let Ok(amount) = value[..value.len() - 1].parse::<i64>() else {
        return DEFAULT_EXPIRY_SECS;
    };
    if amount <= 0 {
        return DEFAULT_EXPIRY_SECS;
    }
    match unit {
        's' => amount,
        'm' => amount * 60,
        'h' => amount * 3600,
        'd' => amount * 86400,
        _ => DEFAULT_EXPIRY_SECS,
    }
}

impl JwtService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_secret: config.access_token_secret.clone(),
            refresh_secret: config.refresh_token_secret.clone(),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            access_token_duration: Duration::seconds(parse_expiry_secs(
                &config.access_token_expiry,
            )),
            refresh_token_duration: Duration::seconds(parse_expiry_secs(
                &config.refresh_token_expiry,
            )),
        }
    }

    fn sign(
        &self,
        user_id: &str,
        email: &str,
        typ: &str,
        device: Option<&str>,
        secret: &str,
        lifetime: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            typ: typ.to_string(),
            device: device.map(str::to_string),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation
    }

    fn verify(
        &self,
        token: &str,
        expected_typ: &str,
        secret: &str,
    ) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &self.validation(),
        )?;

        if data.claims.typ != expected_typ {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
        }

        Ok(data.claims)
    }

    pub fn create_access_token(
        &self,
        user_id: &str,
        email: &str,
        device: Option<&str>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.sign(
            user_id,
            email,
            TOKEN_TYPE_ACCESS,
            device,
            &self.access_secret,
            self.access_token_duration,
        )
    }

    pub fn create_refresh_token(
        &self,
        user_id: &str,
        email: &str,
        device: Option<&str>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.sign(
            user_id,
            email,
            TOKEN_TYPE_REFRESH,
            device,
            &self.refresh_secret,
            self.refresh_token_duration,
        )
    }

    pub fn create_token_pair(
        &self,
        user_id: &str,
        email: &str,
        device: Option<&str>,
    ) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        Ok(TokenPair {
            access_token: self.create_access_token(user_id, email, device)?,
            refresh_token: self.create_refresh_token(user_id, email, device)?,
            expires_in: self.access_token_duration.num_seconds(),
        })
    }

    /// Issued after the password step when 2FA is enabled; only good for
    /// completing the login second step.
    pub fn create_two_factor_token(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.sign(
            user_id,
            email,
            TOKEN_TYPE_TWO_FACTOR,
            None,
            &self.access_secret,
            Duration::seconds(TWO_FACTOR_TOKEN_SECS),
        )
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        self.verify(token, TOKEN_TYPE_ACCESS, &self.access_secret)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        self.verify(token, TOKEN_TYPE_REFRESH, &self.refresh_secret)
    }

    pub fn verify_two_factor_token(
        &self,
        token: &str,
    ) -> Result<Claims, jsonwebtoken::errors::Error> {
        self.verify(token, TOKEN_TYPE_TWO_FACTOR, &self.access_secret)
    }

    pub fn access_token_duration_secs(&self) -> i64 {
        self.access_token_duration.num_seconds()
    }

    pub fn refresh_token_duration_secs(&self) -> i64 {
        self.refresh_token_duration.num_seconds()
    }
}
