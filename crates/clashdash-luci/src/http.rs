//! LuCI JSON-RPC client.
//!
//! Login goes to `/cgi-bin/luci/rpc/auth`, command execution to
//! `/cgi-bin/luci/rpc/sys?auth=<token>`. Both speak a minimal JSON-RPC:
//!
//! ```text
//! -> {"id":1,"method":"exec","params":["uci get openclash.config.enable"]}
//! <- {"id":1,"result":"1\n","error":null}
//! ```

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};

use crate::error::ExecError;
use crate::traits::{Authenticator, RemoteExec};

/// HTTP client for a LuCI device.
#[derive(Debug, Clone)]
pub struct LuciClient {
    client: Client,
    auth_url: String,
    sys_url: String,
}

impl LuciClient {
    /// Create a client for `base_url` (e.g. `http://192.168.1.1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create with a custom reqwest [`Client`] (for timeouts, TLS settings, etc.).
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        let base = base.trim_end_matches('/');
        Self {
            client,
            auth_url: format!("{base}/cgi-bin/luci/rpc/auth"),
            sys_url: format!("{base}/cgi-bin/luci/rpc/sys"),
        }
    }

    async fn call(
        &self,
        url: &str,
        token: Option<&str>,
        method: &str,
        params: &[&str],
    ) -> Result<wire::Reply, ExecError> {
        let mut req = self.client.post(url).json(&wire::Call {
            id: 1,
            method,
            params,
        });
        if let Some(token) = token {
            req = req
                .query(&[("auth", token)])
                .header(COOKIE, format!("sysauth={token}; sysauth_http={token}"));
        }

        let resp = req.send().await.map_err(ExecError::transport)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ExecError::Auth(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(ExecError::Transport(format!("HTTP {}", status.as_u16())));
        }

        resp.json()
            .await
            .map_err(|e| ExecError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl RemoteExec for LuciClient {
    async fn execute(&self, command: &str, token: &str) -> Result<String, ExecError> {
        let reply = self
            .call(&self.sys_url, Some(token), "exec", &[command])
            .await?;
        reply.into_output()
    }
}

#[async_trait]
impl Authenticator for LuciClient {
    async fn get_token(&self, username: &str, password: &str) -> Result<String, ExecError> {
        let reply = self
            .call(&self.auth_url, None, "login", &[username, password])
            .await?;
        match reply.into_output()? {
            token if token.is_empty() => Err(ExecError::Auth("login rejected".into())),
            token => Ok(token),
        }
    }
}

// ── Wire types ────────────────────────────────────────────────────

mod wire {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use crate::error::ExecError;

    #[derive(Debug, Serialize)]
    pub struct Call<'a> {
        pub id: u32,
        pub method: &'a str,
        pub params: &'a [&'a str],
    }

    #[derive(Debug, Deserialize)]
    pub struct Reply {
        #[serde(default)]
        pub result: Value,
        #[serde(default)]
        pub error: Value,
    }

    impl Reply {
        /// Textual result; `null` reads as empty output.
        pub fn into_output(self) -> Result<String, ExecError> {
            match self.error {
                Value::Null => {}
                Value::String(msg) => return Err(ExecError::Remote(msg)),
                other => return Err(ExecError::Remote(other.to_string())),
            }
            match self.result {
                Value::Null => Ok(String::new()),
                Value::String(out) => Ok(out),
                other => Ok(other.to_string()),
            }
        }
    }
}
