use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::debug;

use crate::connection::{ConnectionInfo, RequestEvent};
use crate::error::BoxError;
use crate::handler::{ErrorHandler, Handler};

/// Answers exactly one request and never fails.
///
/// Handler errors and panics are turned into the error handler's response; a
/// failed write is dropped, the connection notices the broken transport on
/// its next read.
pub(crate) async fn respond<H: Handler>(
    handler: &H,
    on_error: &dyn ErrorHandler<H::RespBody>,
    event: RequestEvent<H::ReqBody, H::RespBody>,
    info: ConnectionInfo,
) {
    let (request, sink) = event.into_parts();

    let response = match AssertUnwindSafe(handler.call(request, info)).catch_unwind().await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => on_error.on_error(e),
        Err(panic) => on_error.on_error(panic_to_error(&*panic)),
    };

    if let Err(e) = sink.respond_with(response).await {
        debug!(cause = %e, remote = %info.remote_addr(), "failed to write response, drop it");
    }
}

fn panic_to_error(panic: &(dyn Any + Send)) -> BoxError {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}").into()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}").into()
    } else {
        "handler panicked".into()
    }
}
