//! Icecast/Shoutcast source handshake
//!
//! The client announces itself with an HTTP/1.0 `PUT` carrying Basic auth
//! for the `source` user. Audio bytes follow immediately after the blank
//! line; no chunked encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::{Read, Write};

use crate::error::ConnectionError;

/// Upper bound on the response head read when verification is enabled
const MAX_RESPONSE_HEAD: usize = 4096;

/// Username Icecast expects for source clients
const SOURCE_USER: &str = "source";

/// Builds and sends the source request
#[derive(Debug, Clone)]
pub struct IcecastHandshake {
    /// Value of the `Ice-Name` header
    pub ice_name: String,
    /// Read the server's reply and require a 2xx status
    pub verify_response: bool,
}

impl IcecastHandshake {
    /// Handshake announcing the stream as `ice_name`
    pub fn new(ice_name: impl Into<String>) -> Self {
        Self {
            ice_name: ice_name.into(),
            verify_response: false,
        }
    }

    /// Require a 2xx reply before streaming
    pub fn verify_response(mut self, verify: bool) -> Self {
        self.verify_response = verify;
        self
    }

    /// The request head, ready to be written as-is
    pub fn request(&self, mount: &str, password: &str) -> String {
        let credentials = STANDARD.encode(format!("{}:{}", SOURCE_USER, password));
        format!(
            "PUT /{} HTTP/1.0\r\n\
             Authorization: Basic {}\r\n\
             Content-Type: audio/aac\r\n\
             Ice-Name: {}\r\n\
             Ice-Public: 0\r\n\r\n",
            mount.trim_start_matches('/'),
            credentials,
            self.ice_name
        )
    }

    /// Write the request once, before any audio
    pub fn send<C: Read + Write>(
        &self,
        conn: &mut C,
        mount: &str,
        password: &str,
    ) -> Result<(), ConnectionError> {
        conn.write_all(self.request(mount, password).as_bytes())
            .and_then(|_| conn.flush())
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

        if self.verify_response {
            let status = read_response(conn)?;
            tracing::debug!("Server accepted source: {}", status);
        }
        Ok(())
    }
}

/// Read the response head and return its status line if it is a 2xx
pub fn read_response<R: Read>(conn: &mut R) -> Result<String, ConnectionError> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(ConnectionError::Handshake("response head too large".into()));
        }
        match conn.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => head.push(byte[0]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ConnectionError::Handshake(e.to_string())),
        }
    }

    let text = String::from_utf8_lossy(&head);
    let status_line = text.lines().next().unwrap_or("").trim().to_string();
    if status_line.is_empty() {
        return Err(ConnectionError::Handshake(
            "connection closed before response".into(),
        ));
    }

    // "HTTP/1.0 200 OK" or the Shoutcast-style "ICY 200 OK"
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|c| c.parse::<u16>().ok());

    match code {
        Some(code) if (200..300).contains(&code) => Ok(status_line),
        _ => Err(ConnectionError::Rejected(status_line)),
    }
}
