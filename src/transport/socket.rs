//! TCP socket setup.
//!
//! - Host resolution: IP literals are parsed directly; names go through
//!   DNS and the last returned address wins.
//! - Connection: async connect with `TCP_NODELAY` applied on request.
//!
//! # Example
//!
//! ```ignore
//! use shardwire::transport::{resolve_host, SocketStream};
//!
//! let addr = resolve_host("login.example.net", 2593).await?;
//! let stream = SocketStream::connect(addr, true).await?;
//! let (reader, writer) = stream.into_split();
//! ```

use std::net::{IpAddr, SocketAddr};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{Result, TransportError};

/// Resolve `host` to a single socket address.
pub async fn resolve_host(host: &str, port: u16) -> Result<SocketAddr> {
    let host = host.trim();
    if host.is_empty() {
        return Err(TransportError::InvalidArgument("empty host".into()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::AddressResolution(format!("{}: {}", host, e)))?;

    let addr = addrs
        .last()
        .ok_or_else(|| TransportError::AddressResolution(format!("{}: no addresses", host)))?;

    tracing::debug!(host, %addr, "Resolved host");
    Ok(addr)
}

/// A connected TCP stream.
#[derive(Debug)]
pub struct SocketStream {
    stream: TcpStream,
}

impl SocketStream {
    /// Connect to `addr`.
    pub async fn connect(addr: SocketAddr, nodelay: bool) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        if nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(Self { stream })
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    /// Remote address of the socket.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Split into owned read and write halves.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let addr = resolve_host("127.0.0.1", 2593).await.unwrap();
        assert_eq!(addr, "127.0.0.1:2593".parse().unwrap());

        let addr = resolve_host("::1", 7775).await.unwrap();
        assert_eq!(addr.port(), 7775);
        assert!(addr.is_ipv6());
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = resolve_host("localhost", 80).await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 80);
    }

    #[tokio::test]
    async fn test_resolve_empty_host() {
        assert!(matches!(
            resolve_host("  ", 80).await,
            Err(TransportError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stream, accepted) = tokio::join!(SocketStream::connect(addr, true), listener.accept());
        let stream = stream.unwrap();
        let (_, client_addr) = accepted.unwrap();

        assert_eq!(stream.peer_addr().unwrap(), addr);
        assert_eq!(stream.local_addr().unwrap(), client_addr);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with no listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(matches!(
            SocketStream::connect(addr, false).await,
            Err(TransportError::Io(_))
        ));
    }
}
