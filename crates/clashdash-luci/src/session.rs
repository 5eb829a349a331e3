//! Authenticated, time-bounded command execution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::ExecError;
use crate::token::TokenHolder;
use crate::traits::{CommandRunner, RemoteExec};

/// Runs commands on one device through a shared [`TokenHolder`].
///
/// Every call is bounded by `timeout`. A rejected token triggers one
/// refresh and one retry; a second rejection is returned to the caller.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn RemoteExec>,
    tokens: Arc<TokenHolder>,
    timeout: Duration,
}

impl Session {
    pub fn new(transport: Arc<dyn RemoteExec>, tokens: Arc<TokenHolder>, timeout: Duration) -> Self {
        Self {
            transport,
            tokens,
            timeout,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenHolder> {
        &self.tokens
    }

    async fn bounded(&self, command: &str, token: &str) -> Result<String, ExecError> {
        match tokio::time::timeout(self.timeout, self.transport.execute(command, token)).await {
            Ok(result) => result,
            Err(_) => Err(ExecError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl CommandRunner for Session {
    async fn run(&self, command: &str) -> Result<String, ExecError> {
        let lease = self.tokens.lease().await?;
        debug!(bytes = command.len(), generation = lease.generation, "exec");
        match self.bounded(command, &lease.token).await {
            Err(e) if e.is_auth() => {
                info!(generation = lease.generation, "session token rejected, re-authenticating");
                let fresh = self.tokens.refresh(Some(lease.generation)).await?;
                self.bounded(command, &fresh.token).await
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tokens", &self.tokens)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
