//! Request handler traits and utilities.
//!
//! A [`Handler`] answers one request at a time; the server runs many of them
//! concurrently. When a handler fails (or panics) the server asks its
//! [`ErrorHandler`] for a fallback response instead, so every request still
//! gets exactly one answer.

use std::error::Error;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use tracing::error;

use crate::connection::ConnectionInfo;
use crate::error::BoxError;

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type ReqBody: Send + 'static;
    type RespBody: Send + 'static;

    async fn call(&self, req: Request<Self::ReqBody>, info: ConnectionInfo) -> Result<Response<Self::RespBody>, BoxError>;
}

/// A [`Handler`] backed by an async function or closure, see [`make_handler`].
pub struct HandlerFn<F, ReqB, RespB> {
    f: F,
    _phantom: PhantomData<fn(ReqB) -> RespB>,
}

impl<F, ReqB, RespB> Debug for HandlerFn<F, ReqB, RespB> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, ReqB, RespB, Err> Handler for HandlerFn<F, ReqB, RespB>
where
    F: Fn(Request<ReqB>, ConnectionInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<RespB>, Err>> + Send + 'static,
    Err: Into<Box<dyn Error + Send + Sync>> + 'static,
    ReqB: Send + 'static,
    RespB: Send + 'static,
{
    type ReqBody = ReqB;
    type RespBody = RespB;

    async fn call(&self, req: Request<ReqB>, info: ConnectionInfo) -> Result<Response<RespB>, BoxError> {
        (self.f)(req, info).await.map_err(Into::into)
    }
}

pub fn make_handler<F, Fut, ReqB, RespB, Err>(f: F) -> HandlerFn<F, ReqB, RespB>
where
    F: Fn(Request<ReqB>, ConnectionInfo) -> Fut,
    Fut: Future<Output = Result<Response<RespB>, Err>>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f, _phantom: PhantomData }
}

/// Produces the fallback response for a failed request.
///
/// Any `Fn(BoxError) -> Response<B>` closure is an error handler.
pub trait ErrorHandler<B>: Send + Sync + 'static {
    fn on_error(&self, error: BoxError) -> Response<B>;
}

impl<B, F> ErrorHandler<B> for F
where
    F: Fn(BoxError) -> Response<B> + Send + Sync + 'static,
{
    fn on_error(&self, error: BoxError) -> Response<B> {
        (self)(error)
    }
}

/// Logs the failure and answers with an empty `500 Internal Server Error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl<B: Default> ErrorHandler<B> for DefaultErrorHandler {
    fn on_error(&self, error: BoxError) -> Response<B> {
        error!(cause = %error, "handle request error");
        let mut response = Response::new(B::default());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}
