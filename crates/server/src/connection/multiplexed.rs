use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use http::{Request, Response};
use tokio::sync::oneshot;

use crate::connection::Close;
use crate::error::BoxError;

/// An upgraded connection that yields independent request/response exchanges.
///
/// `next_request` is only ever called from the connection's own task, while
/// `close` may be called concurrently from a server shutdown. After `close`,
/// a pending or later `next_request` should resolve to `Ok(None)` or an error.
#[async_trait]
pub trait MultiplexedConnection: Close + 'static {
    type ReqBody: Send + 'static;
    type RespBody: Send + 'static;

    /// Returns the next request, or `None` once the peer has no more requests.
    async fn next_request(&self) -> Result<Option<RequestEvent<Self::ReqBody, Self::RespBody>>, BoxError>;
}

/// The one-shot write half of a single exchange.
///
/// Consuming `self` makes a second response for the same request impossible.
#[async_trait]
pub trait ResponseSink<B: Send + 'static>: Send + 'static {
    async fn respond_with(self: Box<Self>, response: Response<B>) -> Result<(), BoxError>;
}

#[async_trait]
impl<B: Send + 'static> ResponseSink<B> for oneshot::Sender<Response<B>> {
    async fn respond_with(self: Box<Self>, response: Response<B>) -> Result<(), BoxError> {
        (*self).send(response).map_err(|_unsent| BoxError::from("response receiver dropped"))
    }
}

/// One inbound request paired with its response sink.
pub struct RequestEvent<ReqB, RespB: Send + 'static> {
    request: Request<ReqB>,
    sink: Box<dyn ResponseSink<RespB>>,
}

impl<ReqB, RespB: Send + 'static> RequestEvent<ReqB, RespB> {
    pub fn new<S: ResponseSink<RespB>>(request: Request<ReqB>, sink: S) -> Self {
        Self { request, sink: Box::new(sink) }
    }

    pub fn request(&self) -> &Request<ReqB> {
        &self.request
    }

    pub fn into_parts(self) -> (Request<ReqB>, Box<dyn ResponseSink<RespB>>) {
        (self.request, self.sink)
    }

    /// Answers the request without consulting a handler.
    pub async fn respond_with(self, response: Response<RespB>) -> Result<(), BoxError> {
        self.sink.respond_with(response).await
    }
}

impl<ReqB, RespB: Send + 'static> Debug for RequestEvent<ReqB, RespB> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEvent")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .finish_non_exhaustive()
    }
}
