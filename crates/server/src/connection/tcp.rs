use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::connection::{Close, ConnectionInfo, Listener};
use crate::error::CloseError;

/// Where a plain or TLS listener should bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOptions {
    addr: SocketAddr,
}

impl BindOptions {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Resolves `address` and keeps the first socket address it yields.
    pub fn resolve<A: ToSocketAddrs>(address: A) -> io::Result<Self> {
        address
            .to_socket_addrs()?
            .next()
            .map(Self::new)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing"))
    }

    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl From<SocketAddr> for BindOptions {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

/// A tokio TCP listener whose `close` wakes any pending `accept`.
///
/// The socket itself is released when the last handle is dropped, which the
/// server does right after the accept loop ends.
#[derive(Debug)]
pub struct TcpListener {
    inner: tokio::net::TcpListener,
    local_addr: SocketAddr,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl TcpListener {
    pub async fn bind(options: &BindOptions) -> io::Result<Self> {
        let inner = tokio::net::TcpListener::bind(options.addr()).await?;
        Self::from_tokio(inner)
    }

    pub fn from_tokio(inner: tokio::net::TcpListener) -> io::Result<Self> {
        let local_addr = inner.local_addr()?;
        Ok(Self { inner, local_addr, closed: AtomicBool::new(false), shutdown: CancellationToken::new() })
    }
}

impl Close for TcpListener {
    fn close(&self) -> Result<(), CloseError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(CloseError::AlreadyClosed);
        }
        self.shutdown.cancel();
        Ok(())
    }
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpStream;

    async fn accept(&self) -> io::Result<Option<(Self::Conn, ConnectionInfo)>> {
        select! {
            biased;
            () = self.shutdown.cancelled() => Ok(None),
            result = self.inner.accept() => {
                let (stream, remote_addr) = result?;
                let local_addr = stream.local_addr().unwrap_or(self.local_addr);
                Ok(Some((stream, ConnectionInfo::new(local_addr, remote_addr))))
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}
