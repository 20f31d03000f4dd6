//! Connection options
//!
//! Resolves the user-supplied connection settings into a concrete [`Address`]
//! and a `mysql://` connection URL. Defaults are applied here, once, before
//! any worker starts; nothing is read from process-wide mutable state later.

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;

use crate::error::{Error, Result};

/// Host used when only a port is given
pub const DEFAULT_HOST: &str = "localhost";

/// Port used when only a host is given
pub const DEFAULT_PORT: u16 = 3306;

/// Socket used when neither socket, host nor port is given
pub const DEFAULT_SOCKET: &str = "/tmp/mysql.sock";

/// Where the database server is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Unix domain socket
    Socket(PathBuf),
    /// TCP host and port
    Tcp {
        /// Host name or IP
        host: String,
        /// Port
        port: u16,
    },
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Socket(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Connection settings as supplied by flags or the configuration file
#[derive(Clone, Default)]
pub struct ConnectionOptions {
    /// Host name
    pub host: Option<String>,
    /// TCP port
    pub port: Option<u16>,
    /// Unix socket path
    pub socket: Option<String>,
    /// Database name (required)
    pub database: Option<String>,
    /// Login user, defaults to the invoking OS user
    pub user: Option<String>,
    /// Login password
    pub password: Option<SecretString>,
    /// Extra driver parameters appended to the URL
    pub params: BTreeMap<String, String>,
}

impl std::fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("socket", &self.socket)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("params", &self.params)
            .finish()
    }
}

impl ConnectionOptions {
    /// Options for `database` with everything else defaulted
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Default::default()
        }
    }

    /// Set host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set socket path
    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Set user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Add a driver parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Fill every field still unset here from `fallback`
    pub fn or(self, fallback: ConnectionOptions) -> Self {
        let mut params = fallback.params;
        params.extend(self.params);
        Self {
            host: self.host.or(fallback.host),
            port: self.port.or(fallback.port),
            socket: self.socket.or(fallback.socket),
            database: self.database.or(fallback.database),
            user: self.user.or(fallback.user),
            password: self.password.or(fallback.password),
            params,
        }
    }

    /// Resolve the server address.
    ///
    /// A socket wins. Otherwise a host or port selects TCP, with the missing
    /// half defaulted. With neither, the default socket is used.
    pub fn address(&self) -> Address {
        if let Some(socket) = non_empty(&self.socket) {
            return Address::Socket(PathBuf::from(socket));
        }
        let host = non_empty(&self.host);
        if host.is_some() || self.port.is_some() {
            return Address::Tcp {
                host: host.unwrap_or(DEFAULT_HOST).to_string(),
                port: self.port.unwrap_or(DEFAULT_PORT),
            };
        }
        Address::Socket(PathBuf::from(DEFAULT_SOCKET))
    }

    /// Configured user, or the invoking OS user from `USER` / `LOGNAME`
    pub fn resolved_user(&self) -> Result<String> {
        if let Some(user) = non_empty(&self.user) {
            return Ok(user.to_string());
        }
        ["USER", "LOGNAME"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.is_empty())
            .ok_or_else(|| Error::invalid_options("no user given and none found in USER or LOGNAME"))
    }

    /// Build the `mysql://` connection URL.
    ///
    /// Fails with [`Error::InvalidOptions`] before any connection attempt when
    /// the database name or user is missing.
    pub fn connection_url(&self) -> Result<String> {
        let database = non_empty(&self.database)
            .ok_or_else(|| Error::invalid_options("database name is required"))?;
        let user = self.resolved_user()?;

        let (host, port, socket) = match self.address() {
            Address::Tcp { host, port } => (host, port, None),
            Address::Socket(path) => (DEFAULT_HOST.to_string(), DEFAULT_PORT, Some(path)),
        };

        let mut url = Url::parse(&format!("mysql://{}:{}/", host, port))
            .map_err(|e| Error::invalid_options(format!("invalid host '{}': {}", host, e)))?;

        url.set_username(&user)
            .map_err(|_| Error::invalid_options("user cannot be encoded in a URL"))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password.expose_secret()))
                .map_err(|_| Error::invalid_options("password cannot be encoded in a URL"))?;
        }
        url.path_segments_mut()
            .map_err(|_| Error::invalid_options("database cannot be encoded in a URL"))?
            .clear()
            .push(database);

        let has_query = socket.is_some() || !self.params.is_empty();
        if has_query {
            let mut pairs = url.query_pairs_mut();
            if let Some(path) = &socket {
                pairs.append_pair("socket", &path.to_string_lossy());
            }
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Redact the password component of a connection URL for logging
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
