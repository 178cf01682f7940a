//! Outbound TCP connection to the streaming server

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::error::ConnectionError;

/// An open byte stream to the server
pub trait Connection: Read + Write + Send {
    /// Close the stream. Called exactly once by the session.
    fn close(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            // Peer already gone; the socket is closed either way
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Opens connections for a session
pub trait Connector {
    type Conn: Connection;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Conn, ConnectionError>;
}

/// Plain TCP connector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Upper bound on establishing the TCP connection
    pub connect_timeout: Duration,
    /// Bounds how long a stalled server can block the pump
    pub write_timeout: Option<Duration>,
    /// Only used when the server response is verified
    pub read_timeout: Option<Duration>,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            write_timeout: Some(Duration::from_secs(10)),
            read_timeout: Some(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS)),
        }
    }
}

impl TcpConnector {
    /// Connector with default read and write timeouts
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout: Some(connect_timeout),
            ..Self::default()
        }
    }

    fn configure(&self, socket: &Socket) -> io::Result<()> {
        // Access units are small; don't let Nagle hold them back
        socket.set_nodelay(true)?;
        socket.set_write_timeout(self.write_timeout)?;
        socket.set_read_timeout(self.read_timeout)?;
        socket.set_keepalive(true)?;
        Ok(())
    }
}

impl Connector for TcpConnector {
    type Conn = TcpStream;

    fn connect(&self, host: &str, port: u16) -> Result<TcpStream, ConnectionError> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| ConnectionError::Resolve(format!("{}:{} ({})", host, port, e)))?;

        let mut last_error = None;
        for addr in addrs {
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
                .map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;

            match socket.connect_timeout(&addr.into(), self.connect_timeout) {
                Ok(()) => {
                    self.configure(&socket)
                        .map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;
                    tracing::info!("Connected to {}", addr);
                    return Ok(socket.into());
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(format!("{}: {}", addr, e));
                }
            }
        }

        Err(ConnectionError::ConnectFailed(
            last_error.unwrap_or_else(|| format!("{}:{} resolved to no addresses", host, port)),
        ))
    }
}
