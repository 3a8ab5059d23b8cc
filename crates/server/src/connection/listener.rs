use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::ConnectionInfo;
use crate::error::CloseError;

/// A resource that can be torn down from any task.
///
/// Closing twice must report [`CloseError::AlreadyClosed`] instead of
/// succeeding silently.
pub trait Close: Send + Sync {
    fn close(&self) -> Result<(), CloseError>;
}

/// A bound socket that yields raw connections.
///
/// `accept` returns `Ok(None)` once the listener has been closed, which ends
/// the accept loop without surfacing an error.
#[async_trait]
pub trait Listener: Close + 'static {
    type Conn: Send + 'static;

    async fn accept(&self) -> io::Result<Option<(Self::Conn, ConnectionInfo)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl<T: Close + ?Sized> Close for Arc<T> {
    fn close(&self) -> Result<(), CloseError> {
        (**self).close()
    }
}

/// Serving an `Arc` of a listener keeps a handle to close just that listener.
#[async_trait]
impl<L: Listener> Listener for Arc<L> {
    type Conn = L::Conn;

    async fn accept(&self) -> io::Result<Option<(Self::Conn, ConnectionInfo)>> {
        (**self).accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}
