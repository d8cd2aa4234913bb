use std::env;

/// Environment configuration
/// Loads and validates environment variables once at startup; the resulting
/// structs are passed into each component's constructor.
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub auth: AuthConfig,
}

/// Settings consumed by the auth core. Secrets and policy knobs all come
/// from the environment; nothing in the core reads env vars directly.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    /// Duration strings of the form `<integer><unit>`, unit in {s, m, h, d}.
    pub access_token_expiry: String,
    pub refresh_token_expiry: String,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub lockout_threshold: i32,
    pub lockout_duration_secs: i64,
    /// Burst capacity for the global rate limiter.
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            auth: AuthConfig::from_env()?,
        })
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, String> {
        let access_token_secret = env::var("JWT_ACCESS_SECRET")
            .map_err(|_| "JWT_ACCESS_SECRET must be set".to_string())?;

        let refresh_token_secret = env::var("JWT_REFRESH_SECRET")
            .map_err(|_| "JWT_REFRESH_SECRET must be set".to_string())?;

        if access_token_secret == refresh_token_secret {
            return Err("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ".to_string());
        }

        Ok(Self {
            access_token_secret,
            refresh_token_secret,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "lunglife".to_string()),
            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "lunglife-app".to_string()),
            access_token_expiry: env::var("ACCESS_TOKEN_EXPIRY")
                .unwrap_or_else(|_| "15m".to_string()),
            refresh_token_expiry: env::var("REFRESH_TOKEN_EXPIRY")
                .unwrap_or_else(|_| "7d".to_string()),
            argon2_memory_kib: parse_or("ARGON2_MEMORY_KIB", 8192),
            argon2_iterations: parse_or("ARGON2_ITERATIONS", 2),
            lockout_threshold: parse_or("LOCKOUT_THRESHOLD", 5),
            lockout_duration_secs: parse_or("LOCKOUT_DURATION_SECS", 15 * 60),
            rate_limit_burst: parse_or("RATE_LIMIT_BURST", 50),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
