//! Shared session token with single-flight refresh.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ExecError;
use crate::traits::Authenticator;

/// Login credentials for the device.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A token together with the generation it was issued in.
///
/// The generation lets a caller that saw a rejection ask for a refresh of
/// exactly that token, so concurrent rejections collapse into one login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub token: String,
    pub generation: u64,
}

/// Holds the current session token for one device.
pub struct TokenHolder {
    auth: Arc<dyn Authenticator>,
    credentials: Credentials,
    current: RwLock<Option<Lease>>,
    refresh: Mutex<()>,
    logins: AtomicU64,
}

impl TokenHolder {
    pub fn new(auth: Arc<dyn Authenticator>, credentials: Credentials) -> Self {
        Self {
            auth,
            credentials,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            logins: AtomicU64::new(0),
        }
    }

    /// Current lease, logging in first if there is none.
    pub async fn lease(&self) -> Result<Lease, ExecError> {
        let cached = self.current.read().clone();
        match cached {
            Some(lease) => Ok(lease),
            None => self.refresh(None).await,
        }
    }

    /// Replace the token.
    ///
    /// With `stale = Some(generation)` a new login happens only if that
    /// generation is still current; otherwise the newer lease is returned.
    pub async fn refresh(&self, stale: Option<u64>) -> Result<Lease, ExecError> {
        let _guard = self.refresh.lock().await;

        let cached = self.current.read().clone();
        if let Some(lease) = cached {
            match stale {
                None => return Ok(lease),
                Some(generation) if generation != lease.generation => return Ok(lease),
                Some(_) => {}
            }
        }

        let previous = self.current.read().as_ref().map_or(0, |l| l.generation);
        let token = match self
            .auth
            .get_token(&self.credentials.username, &self.credentials.password)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!(username = %self.credentials.username, error = %e, "login failed");
                return Err(e);
            }
        };
        self.logins.fetch_add(1, Ordering::Relaxed);

        let lease = Lease {
            token,
            generation: previous + 1,
        };
        *self.current.write() = Some(lease.clone());
        debug!(generation = lease.generation, "session token refreshed");
        Ok(lease)
    }

    /// Drop the cached token so the next call logs in again.
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    /// Number of successful logins performed so far.
    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for TokenHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenHolder")
            .field("credentials", &self.credentials)
            .field("logins", &self.logins())
            .finish_non_exhaustive()
    }
}
