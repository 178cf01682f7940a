//! Validated server coordinates

use std::fmt;

use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Where and as whom to publish
#[derive(Clone, PartialEq, Eq)]
pub struct ServerTarget {
    /// Server host name or address
    pub host: String,
    /// Server TCP port
    pub port: u16,
    /// Mount point without the leading `/`
    pub mount: String,
    /// Source password
    pub password: String,
}

impl ServerTarget {
    /// Validate and build a target
    pub fn new(
        host: impl Into<String>,
        port: u16,
        mount: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let host = host.into().trim().to_string();
        let mount = mount.into().trim().trim_start_matches('/').to_string();
        let password = password.into();

        if host.is_empty() {
            return Err(Error::InvalidTarget("server host is empty".into()));
        }
        if port == 0 {
            return Err(Error::InvalidTarget("server port must be 1-65535".into()));
        }
        if mount.is_empty() {
            return Err(Error::InvalidTarget("mount path is empty".into()));
        }
        // Both end up in the request line
        if mount.chars().any(char::is_whitespace) {
            return Err(Error::InvalidTarget(format!(
                "mount path contains whitespace: {:?}",
                mount
            )));
        }
        if password.is_empty() {
            return Err(Error::InvalidTarget("password is empty".into()));
        }

        Ok(Self {
            host,
            port,
            mount,
            password,
        })
    }

    /// Validated target from the `[server]` config section
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(
            config.host.clone(),
            config.port,
            config.mount.clone(),
            config.password.clone(),
        )
    }
}

impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("mount", &self.mount)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.mount)
    }
}
