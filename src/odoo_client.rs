use crate::{
    http_client::{handle_http_response, rpc_client},
    xmlrpc::{decode_response, encode_call},
};
use anyhow::{Context, Result};
use log::{debug, info};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::{blocking::Client, header::CONTENT_TYPE};
use serde_json::{Value, json};
use std::{error::Error as StdError, fmt, time::Duration};
use thiserror::Error;

/// Failure of a single remote procedure call
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RpcError {
    /// The server could not be reached at all
    #[error("connection refused by {url}: {reason}")]
    ConnectionRefused { url: String, reason: String },

    /// Application error raised by the server
    #[error("<Fault {code}: {}>", python_repr(.message))]
    Fault { code: String, message: String },

    /// Timeout, unexpected HTTP status, broken body
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with something that is not XML-RPC
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RpcError {
    const ACCESS_DENIED: &str = "Access denied";
    const SERVER_BUSY: &str = "The server is busy right now";
    const NULL_MARSHALLING: &str = "cannot marshal None unless allow_none is enabled";

    pub fn is_fault(&self) -> bool {
        matches!(self, RpcError::Fault { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        self.is_fault() && self.to_string().contains(Self::ACCESS_DENIED)
    }

    pub fn is_server_busy(&self) -> bool {
        self.is_fault() && self.to_string().contains(Self::SERVER_BUSY)
    }

    /// The server finished the call but could not encode its empty result
    pub fn is_null_marshalling(&self) -> bool {
        self.to_string().contains(Self::NULL_MARSHALLING)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Refused(RpcError),

    #[error("login refused for user '{user}' on database '{db}'")]
    InvalidCredentials { user: String, db: String },

    #[error("failed to authenticate: {0}")]
    Rpc(RpcError),
}

impl From<RpcError> for AuthError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::ConnectionRefused { .. } => AuthError::Refused(e),
            other => AuthError::Rpc(other),
        }
    }
}

/// Version reported by the remote server
#[derive(Clone, Debug, PartialEq)]
pub enum ServerVersion {
    /// Major version, e.g. `14` for `"14.0"`
    Numeric(u32),
    /// Raw version text whose leading segment is not a number
    Unknown(String),
}

impl ServerVersion {
    /// First release that needs the server side translation extension
    pub const PATCHED_TRANSLATION_MAJOR: u32 = 11;

    pub fn parse(raw: &str) -> Self {
        let head = raw.split('.').next().unwrap_or_default();

        if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(major) = head.parse::<u32>() {
                return ServerVersion::Numeric(major);
            }
        }

        ServerVersion::Unknown(raw.to_string())
    }

    pub fn major(&self) -> Option<u32> {
        match self {
            ServerVersion::Numeric(major) => Some(*major),
            ServerVersion::Unknown(_) => None,
        }
    }

    /// `None` when the version could not be determined
    pub fn requires_patched_translation(&self) -> Option<bool> {
        self.major()
            .map(|major| major >= Self::PATCHED_TRANSLATION_MAJOR)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerVersion::Numeric(major) => write!(f, "{major}"),
            ServerVersion::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

/// Transport to the `common` and `object` XML-RPC endpoints of a server
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait RemoteClient {
    /// Call `method` on the `common` endpoint (`version`, `authenticate`)
    fn common(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;

    /// Call `method` on the `object` endpoint (`execute_kw`)
    fn object(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;
}

/// Authenticated user on one database; lives for exactly one run
#[derive(Clone, Debug)]
pub struct Session {
    pub db: String,
    pub uid: i64,
    password: String,
    pub version: ServerVersion,
}

impl Session {
    /// Query the server version and log in
    pub fn authenticate<C: RemoteClient + ?Sized>(
        client: &C,
        db: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, AuthError> {
        let version = client.common("version", vec![])?;
        let Some(raw_version) = version.get("server_version").and_then(Value::as_str) else {
            return Err(AuthError::Rpc(RpcError::Protocol(format!(
                "version response without server_version: {version}"
            ))));
        };
        let version = ServerVersion::parse(raw_version);
        debug!("remote server version: {raw_version} ({version:?})");

        let uid = client.common(
            "authenticate",
            vec![json!(db), json!(username), json!(password), json!({})],
        )?;

        let uid = match uid {
            Value::Number(n) if n.is_i64() => n.as_i64().unwrap_or_default(),
            Value::Bool(false) => {
                return Err(AuthError::InvalidCredentials {
                    user: username.to_string(),
                    db: db.to_string(),
                });
            }
            other => {
                return Err(AuthError::Rpc(RpcError::Protocol(format!(
                    "unexpected authenticate response: {other}"
                ))));
            }
        };

        info!("authenticated as uid {uid} on database {db}");

        Ok(Session {
            db: db.to_string(),
            uid,
            password: password.to_string(),
            version,
        })
    }

    /// Invoke `model.method` through `execute_kw`
    pub fn call<C: RemoteClient + ?Sized>(
        &self,
        client: &C,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Option<Value>,
    ) -> Result<Value, RpcError> {
        debug!("execute_kw {model}.{method}");

        let mut params = vec![
            json!(self.db),
            json!(self.uid),
            json!(self.password),
            json!(model),
            json!(method),
            args,
        ];
        if let Some(kwargs) = kwargs {
            params.push(kwargs);
        }

        client.object("execute_kw", params)
    }
}

/// XML-RPC client for an Odoo server
#[derive(Clone)]
pub struct OdooClient {
    client: Client,
    common_url: String,
    object_url: String,
}

impl OdooClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

    const COMMON_ENDPOINT: &str = "/xmlrpc/2/common";
    const OBJECT_ENDPOINT: &str = "/xmlrpc/2/object";

    /// Prepare the transport to `server_url`; nothing is sent yet
    pub fn connect(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = rpc_client(timeout)?;

        Ok(OdooClient {
            client,
            common_url: Self::build_url(server_url, Self::COMMON_ENDPOINT),
            object_url: Self::build_url(server_url, Self::OBJECT_ENDPOINT),
        })
    }

    fn build_url(server_url: &str, path: &str) -> String {
        format!("{}{path}", server_url.trim_end_matches('/'))
    }

    fn post(&self, url: &str, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let body = encode_call(method, params)
            .context("failed to build request")
            .map_err(|e| RpcError::Protocol(format!("{e:#}")))?;

        info!("POST {url} {method}");

        let res = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .map_err(|e| transport_error(url, e))?;

        let body = handle_http_response(res, &format!("POST {url}"))
            .map_err(|e| RpcError::Transport(format!("{e:#}")))?;

        decode_response(&body)
    }
}

impl RemoteClient for OdooClient {
    fn common(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        self.post(&self.common_url, method, &params)
    }

    fn object(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        self.post(&self.object_url, method, &params)
    }
}

/// Quote `text` the way the server side prints string literals
fn python_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut repr = String::with_capacity(text.len() + 2);
    repr.push(quote);
    for c in text.chars() {
        match c {
            '\\' => repr.push_str("\\\\"),
            '\n' => repr.push_str("\\n"),
            '\r' => repr.push_str("\\r"),
            '\t' => repr.push_str("\\t"),
            c if c == quote => {
                repr.push('\\');
                repr.push(c);
            }
            c if c.is_ascii_control() => repr.push_str(&format!("\\x{:02x}", c as u32)),
            c => repr.push(c),
        }
    }
    repr.push(quote);
    repr
}

fn transport_error(url: &str, e: reqwest::Error) -> RpcError {
    let reason = std::iter::successors(Some(&e as &dyn StdError), |e| (*e).source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");

    if e.is_connect() {
        RpcError::ConnectionRefused {
            url: url.to_string(),
            reason,
        }
    } else {
        RpcError::Transport(reason)
    }
}
