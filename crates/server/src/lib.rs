//! The accept loop and request multiplexing core of the micro http server
//!
//! This crate keeps listeners productive for the whole life of a server and
//! turns every accepted connection into concurrently answered requests. It
//! does not parse HTTP itself: framing, TLS and the transport are plugged in
//! through small traits, while requests and responses are plain
//! [`http::Request`] and [`http::Response`] values.
//!
//! # Features
//!
//! - Accept loops that survive transient failures with a capped, cancellable
//!   exponential backoff
//! - One task per connection and one task per request, so neither slow
//!   handshakes nor slow handlers block accepting or reading
//! - Handler failures and panics answered through a fallback error handler
//! - Idempotent shutdown: every listener and connection is closed exactly once
//! - Optional limit on in-flight requests, and a drain to wait for stragglers
//!
//! # Example
//!
//! ```no_run
//! use http::{Request, Response};
//! use micro_server::connection::{BindOptions, ConnectionInfo, MultiplexedConnection, RequestEvent};
//! use micro_server::error::BoxError;
//! use micro_server::handler::make_handler;
//! use micro_server::server::Server;
//! use tokio::net::TcpStream;
//!
//! async fn hello(req: Request<String>, info: ConnectionInfo) -> Result<Response<String>, BoxError> {
//!     Ok(Response::new(format!("hello {}, you sent {}", info.remote_addr(), req.body())))
//! }
//!
//! async fn upgrade(stream: TcpStream, _info: ConnectionInfo) -> Result<MyProtocol, BoxError> {
//!     // negotiate the protocol spoken on `stream`
//! #   let _ = stream;
//! #   unimplemented!()
//! }
//! # struct MyProtocol;
//! # impl micro_server::connection::Close for MyProtocol {
//! #     fn close(&self) -> Result<(), micro_server::error::CloseError> { Ok(()) }
//! # }
//! # #[async_trait::async_trait]
//! # impl MultiplexedConnection for MyProtocol {
//! #     type ReqBody = String;
//! #     type RespBody = String;
//! #     async fn next_request(&self) -> Result<Option<RequestEvent<String, String>>, BoxError> { Ok(None) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(make_handler(hello), upgrade);
//!     server.listen_and_serve(BindOptions::resolve("127.0.0.1:8080")?).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`server`]: the [`server::Server`] facade, its accept loops, connection
//!   multiplexers and request responders
//! - [`connection`]: the capabilities the server consumes (listeners,
//!   upgrades, multiplexed connections, response sinks)
//! - [`handler`]: request handlers and fallback error handlers
//! - [`registry`]: bookkeeping that makes shutdown close everything once
//! - [`backoff`]: the retry delay after transient accept failures
//! - [`error`]: the errors that cross the crate boundary
//!
//! # Error Handling
//!
//! Only two failures ever reach the caller of [`server::Server::serve`]:
//! [`error::ServerError::Closed`] when the server was already closed, and
//! [`error::ServerError::Accept`] when a listener fails in a way that is not
//! recognized as transient. Failed upgrades, failed handlers and failed
//! response writes only affect the connection or request they belong to.

pub mod backoff;
pub mod connection;
pub mod error;
pub mod handler;
pub mod registry;
pub mod server;

#[cfg(test)]
mod testing;

mod utils;
pub(crate) use utils::ensure;
