use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::modules::auth::schema::UserResponse;

/// Whole-session snapshot broadcast to subscribers on every change. A single
/// struct per update, so observers never see a partially applied transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub requires_two_factor: bool,
    pub current_user: Option<UserResponse>,
}

/// Transport-level failure talking to the backend.
#[derive(Debug, thiserror::Error)]
#[error("auth request failed: {0}")]
pub struct ApiError(pub String);

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(UserResponse),
    TwoFactorRequired,
}

/// Enrollment material from a 2FA setup call: the manual-entry secret, the
/// provisioning URI and the one-time backup codes. Shown once, never stored
/// in session state.
#[derive(Debug, Clone)]
pub struct TwoFactorEnrollment {
    pub secret: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

/// Backend surface the facade drives. Implemented over HTTP in the client;
/// stubbed in tests.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ApiError>;
    async fn register(&self, email: &str, password: &str) -> Result<UserResponse, ApiError>;
    async fn setup_two_factor(&self) -> Result<TwoFactorEnrollment, ApiError>;
    async fn verify_two_factor(&self, code: &str) -> Result<UserResponse, ApiError>;
    async fn forgot_password(&self, email: &str) -> Result<(), ApiError>;
    async fn disable_two_factor(&self, password: &str) -> Result<(), ApiError>;
}

const GENERIC_ERROR: &str = "Something went wrong. Please try again.";

/// Client-side reactive session state. Updates are last-write-wins;
/// overlapping calls are not fenced against each other.
pub struct SessionFacade {
    api: Arc<dyn AuthApi>,
    tx: watch::Sender<SessionState>,
}

impl SessionFacade {
    pub fn new(api: Arc<dyn AuthApi>) -> Self {
        let (tx, _) = watch::channel(SessionState::default());
        Self { api, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        let mut next = self.tx.borrow().clone();
        f(&mut next);
        // send only fails with no receivers; state is still readable via borrow
        let _ = self.tx.send(next);
    }

    fn begin(&self) {
        self.update(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    fn fail(&self) {
        self.update(|s| {
            s.loading = false;
            s.error = Some(GENERIC_ERROR.to_string());
        });
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        self.begin();
        match self.api.login(email, password).await {
            Ok(LoginOutcome::Authenticated(user)) => {
                self.update(|s| {
                    s.loading = false;
                    s.is_authenticated = true;
                    s.requires_two_factor = false;
                    s.current_user = Some(user.clone());
                });
                Ok(())
            }
            Ok(LoginOutcome::TwoFactorRequired) => {
                self.update(|s| {
                    s.loading = false;
                    s.requires_two_factor = true;
                });
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<(), ApiError> {
        self.begin();
        match self.api.register(email, password).await {
            Ok(user) => {
                self.update(|s| {
                    s.loading = false;
                    s.current_user = Some(user.clone());
                });
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Begins 2FA enrollment. The enrollment payload goes straight back to
    /// the caller for display; the session does not become two-factor until
    /// `verify_two_factor` confirms it.
    pub async fn setup_two_factor(&self) -> Result<TwoFactorEnrollment, ApiError> {
        self.begin();
        match self.api.setup_two_factor().await {
            Ok(enrollment) => {
                self.update(|s| s.loading = false);
                Ok(enrollment)
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    pub async fn verify_two_factor(&self, code: &str) -> Result<(), ApiError> {
        self.begin();
        match self.api.verify_two_factor(code).await {
            Ok(user) => {
                self.update(|s| {
                    s.loading = false;
                    s.is_authenticated = true;
                    s.requires_two_factor = false;
                    s.current_user = Some(user.clone());
                });
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        self.begin();
        match self.api.forgot_password(email).await {
            Ok(()) => {
                self.update(|s| s.loading = false);
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    pub async fn disable_two_factor(&self, password: &str) -> Result<(), ApiError> {
        self.begin();
        match self.api.disable_two_factor(password).await {
            Ok(()) => {
                self.update(|s| {
                    s.loading = false;
                    if let Some(user) = &mut s.current_user {
                        user.two_factor_enabled = false;
                    }
                });
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Local-only: clears session state without a network round trip. Server
    /// side revocation is a separate, explicit call.
    pub fn logout(&self) {
        self.update(|s| {
            s.is_authenticated = false;
            s.requires_two_factor = false;
            s.current_user = None;
            s.error = None;
        });
    }
}
