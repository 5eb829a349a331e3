//! LuCI remote execution for clashdash.
//!
//! The router exposes no structured rules API, only LuCI's JSON-RPC `exec`
//! call that runs a shell command and returns its stdout. This crate provides:
//!
//! - [`RemoteExec`] / [`Authenticator`]: the transport and login seams.
//! - [`LuciClient`]: the reqwest implementation of both.
//! - [`TokenHolder`]: a shared session token with single-flight refresh.
//! - [`Session`]: a [`CommandRunner`] that bounds every call with a timeout
//!   and re-authenticates once when the token is rejected.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use clashdash_luci::{CommandRunner, Credentials, LuciClient, Session, TokenHolder};
//!
//! # async fn example() -> Result<(), clashdash_luci::ExecError> {
//! let client = Arc::new(LuciClient::new("http://192.168.1.1"));
//! let tokens = Arc::new(TokenHolder::new(client.clone(), Credentials::new("root", "secret")));
//! let session = Session::new(client, tokens, Duration::from_secs(10));
//! let version = session.run("cat /etc/openwrt_version").await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod http;
mod session;
mod token;
mod traits;

pub use error::ExecError;
pub use http::LuciClient;
pub use session::Session;
pub use token::{Credentials, Lease, TokenHolder};
pub use traits::{Authenticator, CommandRunner, RemoteExec};
