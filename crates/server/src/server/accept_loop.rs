use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::connection::{Close, ConnectionInfo, Listener, MultiplexedConnection, Upgrade};
use crate::error::{ServerError, ignore_already_closed};
use crate::handler::Handler;
use crate::registry::{ConnectionRegistry, ListenerId};
use crate::server::Shared;
use crate::server::multiplexer::multiplex;

/// Tells whether an accept failure is worth retrying after a backoff.
///
/// Peer resets, broken handshakes and resource exhaustion (out of file
/// descriptors or buffers) are transient; everything else is fatal for the
/// listener.
pub fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::InvalidData
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::OutOfMemory
    ) || is_resource_exhaustion(e)
}

#[cfg(unix)]
fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM))
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_e: &io::Error) -> bool {
    false
}

/// Untracks and closes the listener when the accept loop ends, including when
/// the serving future is dropped half way.
struct ListenerGuard<'a> {
    registry: &'a ConnectionRegistry,
    id: ListenerId,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        if let Some(listener) = self.registry.untrack_listener(self.id) {
            ignore_already_closed(listener.close());
        }
    }
}

pub(crate) async fn accept_loop<H, U, L>(shared: &Arc<Shared<H, U>>, listener: L) -> Result<(), ServerError>
where
    H: Handler,
    U: Upgrade<L::Conn>,
    L: Listener,
    <U as Upgrade<L::Conn>>::Output: MultiplexedConnection<ReqBody = H::ReqBody, RespBody = H::RespBody>,
{
    let listener = Arc::new(listener);
    let addr = listener.local_addr().ok();

    let Some(id) = shared.registry.track_listener(Arc::clone(&listener) as Arc<dyn Close>, addr) else {
        ignore_already_closed(listener.close());
        return Err(ServerError::Closed);
    };
    let _guard = ListenerGuard { registry: &shared.registry, id };

    info!(?addr, "start accepting connections");
    let result = run(shared, &*listener).await;
    info!(?addr, "stop accepting connections");
    result
}

async fn run<H, U, L>(shared: &Arc<Shared<H, U>>, listener: &L) -> Result<(), ServerError>
where
    H: Handler,
    U: Upgrade<L::Conn>,
    L: Listener,
    <U as Upgrade<L::Conn>>::Output: MultiplexedConnection<ReqBody = H::ReqBody, RespBody = H::RespBody>,
{
    let mut delay: Option<Duration> = None;

    while !shared.is_closed() {
        match listener.accept().await {
            Ok(Some((conn, info))) => {
                delay = None;
                spawn_connection(shared, conn, info);
            }
            Ok(None) => break,
            Err(e) if is_transient_accept_error(&e) => {
                let next = shared.backoff.next(delay);
                delay = Some(next);
                warn!(cause = %e, delay = ?next, "failed to accept, retry later");

                if shared.backoff.sleep(next, &shared.shutdown).await.is_err() {
                    debug!("server closed while backing off");
                    break;
                }
            }
            // the listener got closed under us by the server shutting down
            Err(_) if shared.is_closed() => break,
            Err(e) => {
                error!(cause = %e, "failed to accept, stop listening");
                return Err(ServerError::accept(e));
            }
        }
    }

    Ok(())
}

fn spawn_connection<H, U, C>(shared: &Arc<Shared<H, U>>, conn: C, info: ConnectionInfo)
where
    H: Handler,
    C: Send + 'static,
    U: Upgrade<C>,
    <U as Upgrade<C>>::Output: MultiplexedConnection<ReqBody = H::ReqBody, RespBody = H::RespBody>,
{
    let task_shared = Arc::clone(shared);
    shared.tasks.spawn(async move {
        let shared = task_shared;
        let connection = match shared.upgrade.upgrade(conn, info).await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                debug!(cause = %e, remote = %info.remote_addr(), "failed to upgrade connection, discard it");
                return;
            }
        };

        let Some(id) = shared.registry.track_connection(Arc::clone(&connection) as Arc<dyn Close>) else {
            // the server closed while the connection was being upgraded
            ignore_already_closed(connection.close());
            return;
        };

        multiplex(&shared, &*connection, info).await;

        if let Some(connection) = shared.registry.untrack_connection(id) {
            ignore_already_closed(connection.close());
        }
    });
}
