use std::future::Future;

use async_trait::async_trait;

use crate::connection::{ConnectionInfo, MultiplexedConnection};
use crate::error::BoxError;

/// Turns a raw connection into a request stream.
///
/// Protocol framing, ALPN negotiation and TLS handshakes all live behind this
/// trait. Any async closure of the shape `Fn(C, ConnectionInfo) -> Future<Output
/// = Result<M, E>>` is an upgrade.
#[async_trait]
pub trait Upgrade<C: Send + 'static>: Send + Sync + 'static {
    type Output: MultiplexedConnection;

    async fn upgrade(&self, conn: C, info: ConnectionInfo) -> Result<Self::Output, BoxError>;
}

#[async_trait]
impl<C, F, Fut, M, E> Upgrade<C> for F
where
    C: Send + 'static,
    F: Fn(C, ConnectionInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<M, E>> + Send + 'static,
    M: MultiplexedConnection,
    E: Into<BoxError> + 'static,
{
    type Output = M;

    async fn upgrade(&self, conn: C, info: ConnectionInfo) -> Result<Self::Output, BoxError> {
        (self)(conn, info).await.map_err(Into::into)
    }
}
