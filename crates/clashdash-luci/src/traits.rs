//! Transport and login traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ExecError;

/// Runs one shell command on the device with an explicit token.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Execute `command` and return its stdout.
    ///
    /// A rejected token must surface as [`ExecError::Auth`].
    async fn execute(&self, command: &str, token: &str) -> Result<String, ExecError>;
}

/// Exchanges credentials for an opaque session token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn get_token(&self, username: &str, password: &str) -> Result<String, ExecError>;
}

/// Runs commands with token handling already taken care of.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<String, ExecError>;
}

#[async_trait]
impl<E: RemoteExec + ?Sized> RemoteExec for Arc<E> {
    #[inline]
    async fn execute(&self, command: &str, token: &str) -> Result<String, ExecError> {
        (**self).execute(command, token).await
    }
}

#[async_trait]
impl<A: Authenticator + ?Sized> Authenticator for Arc<A> {
    #[inline]
    async fn get_token(&self, username: &str, password: &str) -> Result<String, ExecError> {
        (**self).get_token(username, password).await
    }
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    #[inline]
    async fn run(&self, command: &str) -> Result<String, ExecError> {
        (**self).run(command).await
    }
}
