//! Network subsystem: TCP connection, Icecast handshake and ADTS delivery

pub mod connection;
pub mod icecast;
pub mod sender;

pub use connection::{Connection, Connector, TcpConnector};
pub use icecast::IcecastHandshake;
pub use sender::AdtsSender;
