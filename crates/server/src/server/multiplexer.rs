use std::sync::Arc;

use tracing::debug;

use crate::connection::{ConnectionInfo, MultiplexedConnection};
use crate::handler::Handler;
use crate::server::Shared;
use crate::server::responder::respond;

/// Reads requests off one connection until it ends, spawning a responder per
/// request without waiting for it.
///
/// Requests are read in arrival order, responses may complete in any order.
/// With a concurrency limit configured, a permit is taken after a request
/// arrived and before its responder is spawned. A connection waiting for its
/// next request holds no permit, while a saturated server stops pulling
/// further requests off the connection that is waiting for one.
pub(crate) async fn multiplex<H, U, M>(shared: &Arc<Shared<H, U>>, connection: &M, info: ConnectionInfo)
where
    H: Handler,
    U: Send + Sync + 'static,
    M: MultiplexedConnection<ReqBody = H::ReqBody, RespBody = H::RespBody>,
{
    while !shared.is_closed() {
        let event = match connection.next_request().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(remote = %info.remote_addr(), "peer sent no more requests, close connection");
                break;
            }
            Err(e) => {
                debug!(cause = %e, remote = %info.remote_addr(), "failed to read next request, close connection");
                break;
            }
        };

        let permit = match &shared.limit {
            Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_closed) => break,
            },
            None => None,
        };

        let task_shared = Arc::clone(shared);
        shared.tasks.spawn(async move {
            respond(&task_shared.handler, &*task_shared.on_error, event, info).await;
            drop(permit);
        });
    }
}
